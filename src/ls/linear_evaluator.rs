//! Linear constraint evaluator (§4.B.1, `constraint_violation.h` `LinearIncrementalEvaluator`).

use crate::variables::VarId;

/// A feasible-activity domain as a sorted list of disjoint closed intervals,
/// mirroring the source's `Domain` (sorted interval list; §6.7 notes no
/// external wire format for it, it is purely an in-memory helper here).
#[derive(Clone, Debug, PartialEq)]
pub struct IntDomain {
    intervals: Vec<(i64, i64)>,
}

impl IntDomain {
    /// A single closed interval `[min, max]`.
    pub fn new(min: i64, max: i64) -> Self {
        assert!(min <= max, "empty domain");
        IntDomain { intervals: vec![(min, max)] }
    }

    /// A domain made of explicit, possibly-disjoint closed intervals; sorted
    /// and merged on construction.
    pub fn from_intervals(mut intervals: Vec<(i64, i64)>) -> Self {
        assert!(!intervals.is_empty(), "empty domain");
        intervals.sort_unstable();
        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
        for (lo, hi) in intervals {
            match merged.last_mut() {
                Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
                _ => merged.push((lo, hi)),
            }
        }
        IntDomain { intervals: merged }
    }

    /// A domain containing exactly `value`.
    pub fn fixed(value: i64) -> Self {
        IntDomain::new(value, value)
    }

    /// Lowest value in the domain.
    pub fn min(&self) -> i64 {
        self.intervals[0].0
    }

    /// Highest value in the domain.
    pub fn max(&self) -> i64 {
        self.intervals[self.intervals.len() - 1].1
    }

    /// Whether the domain is a single value.
    pub fn is_fixed(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].0 == self.intervals[0].1
    }

    /// Whether the domain has exactly two distinct values (the common
    /// Boolean/two-valued fast path, §4.B.1 `ComputeLinearJump`).
    pub fn has_two_values(&self) -> bool {
        match self.intervals.as_slice() {
            [(lo, hi)] => hi - lo == 1,
            [(a, a2), (b, b2)] => a == a2 && b == b2,
            _ => false,
        }
    }

    /// Whether `v` lies in one of the domain's intervals.
    pub fn contains(&self, v: i64) -> bool {
        self.intervals.iter().any(|&(lo, hi)| lo <= v && v <= hi)
    }

    /// Number of disjoint intervals.
    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }

    /// The `i`-th interval.
    pub fn interval(&self, i: usize) -> (i64, i64) {
        self.intervals[i]
    }

    /// Distance from `v` to the nearest point in the domain (0 if contained).
    pub fn distance(&self, v: i64) -> i64 {
        if v <= self.min() {
            return self.min() - v;
        }
        if v >= self.max() {
            return v - self.max();
        }
        self.intervals
            .iter()
            .map(|&(lo, hi)| {
                if v < lo {
                    lo - v
                } else if v > hi {
                    v - hi
                } else {
                    0
                }
            })
            .min()
            .unwrap_or(0)
    }

    /// Largest in-domain value `<= v`, or `v` itself if none exists below the minimum.
    pub fn value_at_or_before(&self, v: i64) -> i64 {
        for &(lo, hi) in self.intervals.iter().rev() {
            if v >= lo {
                return v.min(hi);
            }
        }
        v
    }

    /// Smallest in-domain value `>= v`, or `v` itself if none exists above the maximum.
    pub fn value_at_or_after(&self, v: i64) -> i64 {
        for &(lo, hi) in &self.intervals {
            if v <= hi {
                return v.max(lo);
            }
        }
        v
    }
}

/// An enforcement literal: `var`'s Boolean value must equal `positive` for
/// the literal to hold (§4.B.1).
#[derive(Copy, Clone, Debug)]
pub struct EnforcementLiteral {
    /// The Boolean variable gating the constraint.
    pub var: VarId,
    /// Whether the literal is the variable itself (`true`) or its negation.
    pub positive: bool,
}

struct Row {
    domain: IntDomain,
    offset: i64,
    enforcement: Vec<EnforcementLiteral>,
    terms: Vec<(VarId, i64)>,
    /// §4.A.5-style bound: `max_v max_variation(v) * |coeff(c,v)|` (§4.B.1).
    max_variation: i64,
}

/// Column-oriented and row-oriented view of every linear constraint, built
/// incrementally then finalized by [`LinearIncrementalEvaluator::finalize`]
/// (§4.B.1 "compact column/row-oriented representation").
pub struct LinearIncrementalEvaluator {
    rows: Vec<Row>,
    var_to_rows: Vec<Vec<usize>>,
    activities: Vec<i64>,
    distances: Vec<i64>,
    num_false_enforcement: Vec<i32>,
    finalized: bool,
}

impl std::fmt::Debug for LinearIncrementalEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearIncrementalEvaluator")
            .field("num_constraints", &self.rows.len())
            .finish()
    }
}

impl LinearIncrementalEvaluator {
    /// An evaluator with no constraints yet.
    pub fn new() -> Self {
        LinearIncrementalEvaluator {
            rows: Vec::new(),
            var_to_rows: Vec::new(),
            activities: Vec::new(),
            distances: Vec::new(),
            num_false_enforcement: Vec::new(),
            finalized: false,
        }
    }

    /// Register a new linear constraint with feasible-activity domain `domain`,
    /// returning its index.
    pub fn new_constraint(&mut self, domain: IntDomain) -> usize {
        assert!(!self.finalized, "cannot add constraints after finalize()");
        self.rows.push(Row {
            domain,
            offset: 0,
            enforcement: Vec::new(),
            terms: Vec::new(),
            max_variation: 0,
        });
        self.rows.len() - 1
    }

    /// Add an enforcement literal to constraint `c` (§4.B.1).
    pub fn add_enforcement_literal(&mut self, c: usize, var: VarId, positive: bool) {
        self.rows[c].enforcement.push(EnforcementLiteral { var, positive });
    }

    /// Add `coeff * var` to constraint `c`'s linear expression.
    pub fn add_term(&mut self, c: usize, var: VarId, coeff: i64) {
        self.rows[c].terms.push((var, coeff));
    }

    /// Add a constant offset to constraint `c`'s activity.
    pub fn add_offset(&mut self, c: usize, offset: i64) {
        self.rows[c].offset += offset;
    }

    /// Build the column view and per-row `max_variation` bound. Must be
    /// called once, after every constraint has been added.
    pub fn finalize(&mut self, var_max_variation: &[i64]) {
        assert!(!self.finalized, "finalize() called twice");
        let num_vars = var_max_variation.len();
        self.var_to_rows = vec![Vec::new(); num_vars];
        for (c, row) in self.rows.iter_mut().enumerate() {
            let mut max_variation = 0i64;
            for lit in &row.enforcement {
                self.var_to_rows[lit.var.index()].push(c);
            }
            for &(var, coeff) in &row.terms {
                self.var_to_rows[var.index()].push(c);
                max_variation = max_variation.max(var_max_variation[var.index()] * coeff.abs());
            }
            row.max_variation = max_variation;
        }
        for rows in &mut self.var_to_rows {
            rows.sort_unstable();
            rows.dedup();
        }
        self.activities = vec![0; self.rows.len()];
        self.distances = vec![0; self.rows.len()];
        self.num_false_enforcement = vec![0; self.rows.len()];
        self.finalized = true;
    }

    /// Number of registered constraints.
    pub fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    /// Variables touching constraint `c` (enforcement literals and linear terms).
    pub fn constraint_to_vars(&self, c: usize) -> Vec<VarId> {
        let row = &self.rows[c];
        let mut vars: Vec<VarId> = row.enforcement.iter().map(|l| l.var).collect();
        vars.extend(row.terms.iter().map(|&(v, _)| v));
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    fn row_activity(&self, row: &Row, solution: &[i64]) -> i64 {
        row.terms
            .iter()
            .fold(row.offset, |acc, &(v, coeff)| acc + coeff * solution[v.index()])
    }

    fn row_false_enforcement(&self, row: &Row, solution: &[i64]) -> i32 {
        row.enforcement
            .iter()
            .filter(|lit| (solution[lit.var.index()] != 0) != lit.positive)
            .count() as i32
    }

    /// `activities[c] = offset + sum coeff*solution[v]`;
    /// `num_false_enforcement[c]` from scratch (§4.B.1 "Initial activity").
    pub fn compute_initial_activities(&mut self, solution: &[i64]) {
        for c in 0..self.rows.len() {
            let row = &self.rows[c];
            self.activities[c] = self.row_activity(row, solution);
            self.num_false_enforcement[c] = self.row_false_enforcement(row, solution);
            self.distances[c] = row.domain.distance(self.activities[c]);
        }
    }

    /// `offset + sum coeff*solution[v]` as last computed.
    pub fn activity(&self, c: usize) -> i64 {
        self.activities[c]
    }

    /// `dom(c).distance(activity)` if enforced, else 0 (§3.3 invariant `Violation(c)`).
    pub fn violation(&self, c: usize) -> i64 {
        if self.num_false_enforcement[c] > 0 {
            0
        } else {
            self.distances[c]
        }
    }

    /// Whether `violation(c) > 0`.
    pub fn is_violated(&self, c: usize) -> bool {
        self.violation(c) > 0
    }

    /// Intersect constraint `c`'s feasible-activity domain with `[lb, ub]`;
    /// returns whether this actually tightened the domain.
    pub fn reduce_bounds(&mut self, c: usize, lb: i64, ub: i64) -> bool {
        let row = &mut self.rows[c];
        let old = row.domain.clone();
        let clipped: Vec<(i64, i64)> = (0..row.domain.num_intervals())
            .filter_map(|i| {
                let (lo, hi) = row.domain.interval(i);
                let (nlo, nhi) = (lo.max(lb), hi.min(ub));
                (nlo <= nhi).then_some((nlo, nhi))
            })
            .collect();
        if clipped.is_empty() {
            return false;
        }
        row.domain = IntDomain::from_intervals(clipped);
        row.domain != old
    }

    /// `Sum_c weights[c] * violation(c)` (§4.B.1 "Scoring").
    pub fn weighted_violation(&self, weights: &[f64]) -> f64 {
        (0..self.rows.len()).map(|c| weights[c] * self.violation(c) as f64).sum()
    }

    /// The delta(s) on `var` that drive row `c`'s activity onto the domain
    /// boundary nearest its current (infeasible) value -- the breakpoint
    /// where this row's contribution to `weighted_violation` stops falling
    /// and starts rising (§4.B.1 "the minimum ... sits where activity enters
    /// the feasible domain"). Both neighboring integers of the exact
    /// real-valued breakpoint are returned, since `coeff` may not evenly
    /// divide the distance to the boundary. Empty if `var` has no term in
    /// `c`, `c` isn't currently enforced, or its activity is already feasible
    /// (no breakpoint to chase).
    fn row_breakpoint_deltas(&self, c: usize, var: VarId) -> Vec<i64> {
        let row = &self.rows[c];
        if self.num_false_enforcement[c] > 0 {
            return Vec::new();
        }
        let coeff: i64 = row.terms.iter().filter(|&&(v, _)| v == var).map(|&(_, co)| co).sum();
        if coeff == 0 {
            return Vec::new();
        }
        let activity = self.activities[c];
        if row.domain.contains(activity) {
            return Vec::new();
        }
        let boundary = if activity < row.domain.min() {
            row.domain.min()
        } else if activity > row.domain.max() {
            row.domain.max()
        } else {
            let before = row.domain.value_at_or_before(activity);
            let after = row.domain.value_at_or_after(activity);
            if activity - before <= after - activity { before } else { after }
        };
        let delta_activity = boundary - activity;
        let quotient = delta_activity as f64 / coeff as f64;
        let mut deltas = vec![quotient.floor() as i64, quotient.ceil() as i64];
        deltas.sort_unstable();
        deltas.dedup();
        deltas
    }

    /// Every breakpoint delta (§[`Self::row_breakpoint_deltas`]) over every
    /// row touching `var`, used to seed jump candidates beyond a plain
    /// domain-endpoint scan.
    pub fn breakpoint_deltas_for_var(&self, var: VarId) -> Vec<i64> {
        let mut deltas = Vec::new();
        for &c in &self.var_to_rows[var.index()] {
            deltas.extend(self.row_breakpoint_deltas(c, var));
        }
        deltas.sort_unstable();
        deltas.dedup();
        deltas
    }

    /// Change in `weighted_violation` if `solution[var] += delta`, recomputed
    /// directly from the rows touching `var` (§4.B.2's "default: recompute"
    /// convention, applied here rather than replicating the source's
    /// affected-variable cache bookkeeping -- see `DESIGN.md`).
    pub fn weighted_violation_delta(
        &self,
        weights: &[f64],
        var: VarId,
        delta: i64,
        solution: &[i64],
    ) -> f64 {
        if delta == 0 {
            return 0.0;
        }
        let mut total = 0.0;
        for &c in &self.var_to_rows[var.index()] {
            let row = &self.rows[c];
            let old_violation = self.violation(c);
            let new_false_enforcement = {
                let was_false = row
                    .enforcement
                    .iter()
                    .any(|lit| lit.var == var && (solution[var.index()] != 0) != lit.positive);
                let becomes_false = row
                    .enforcement
                    .iter()
                    .any(|lit| lit.var == var && ((solution[var.index()] + delta) != 0) != lit.positive);
                self.num_false_enforcement[c] - i32::from(was_false) + i32::from(becomes_false)
            };
            let new_activity = self.activities[c]
                + row.terms.iter().filter(|&&(v, _)| v == var).map(|&(_, co)| co * delta).sum::<i64>();
            let new_violation = if new_false_enforcement > 0 { 0 } else { row.domain.distance(new_activity) };
            total += weights[c] * (new_violation - old_violation) as f64;
        }
        total
    }

    /// Apply `solution[var] = new_value` (was `old_value`) to every row
    /// touching `var`: update activities, distances, num_false_enforcement,
    /// and update `jump_scores` for every co-touched variable to account for
    /// this row's contribution change (§4.B.1 "Incremental updates").
    ///
    /// Returns the indices of constraints whose violation actually changed.
    pub fn update_variable_and_scores(
        &mut self,
        var: VarId,
        old_value: i64,
        new_value: i64,
        weights: &[f64],
        jump_deltas: &[i64],
        jump_scores: &mut [f64],
        solution: &[i64],
    ) -> Vec<usize> {
        let delta = new_value - old_value;
        if delta == 0 {
            return Vec::new();
        }
        let mut changed = Vec::new();
        for &c in &self.var_to_rows[var.index()].clone() {
            let old_violation = self.violation(c);
            let old_false_enforcement = self.num_false_enforcement[c];
            let activity_before = self.activities[c];

            {
                let row = &self.rows[c];
                for lit in &row.enforcement {
                    if lit.var == var {
                        let was_false = (old_value != 0) != lit.positive;
                        let becomes_false = (new_value != 0) != lit.positive;
                        if was_false && !becomes_false {
                            self.num_false_enforcement[c] -= 1;
                        } else if !was_false && becomes_false {
                            self.num_false_enforcement[c] += 1;
                        }
                    }
                }
                let coeff_sum: i64 = row.terms.iter().filter(|&&(v, _)| v == var).map(|&(_, co)| co).sum();
                self.activities[c] += coeff_sum * delta;
                self.distances[c] = row.domain.distance(self.activities[c]);
            }
            let new_violation = self.violation(c);
            if new_violation != old_violation {
                changed.push(c);
            }

            // Narrow-band skip: bound the activity swing any single future
            // move on this row could cause; if it can't leave the feasible
            // domain, no other variable's score needs touching (§4.B.1).
            let row = &self.rows[c];
            let band_lo = self.activities[c] - row.max_variation;
            let band_hi = self.activities[c] + row.max_variation;
            if self.num_false_enforcement[c] == 0
                && row.domain.distance(band_lo) == 0
                && row.domain.distance(band_hi) == 0
            {
                continue;
            }

            // For every other variable `u` touching this row, update its cached
            // jump score by this row's before/after contribution to the
            // hypothetical move `solution[u] += jump_deltas[u]`.
            for &(u, coeff) in &row.terms {
                if u == var {
                    continue;
                }
                let u_delta = jump_deltas[u.index()];
                let before = if old_false_enforcement > 0 {
                    0
                } else {
                    row.domain.distance(activity_before + coeff * u_delta)
                };
                let after = if self.num_false_enforcement[c] > 0 {
                    0
                } else {
                    row.domain.distance(self.activities[c] + coeff * u_delta)
                };
                jump_scores[u.index()] += weights[c] * (after - before) as f64;
            }
            // An enforcement literal's own jump flips its Boolean value, which
            // transitions num_false_enforcement by exactly one in the opposite
            // direction of `var`'s effect on it; its score is updated the same
            // way the source's `UpdateScoreOfEnforcementIncrease` does.
            if old_false_enforcement != self.num_false_enforcement[c] {
                let distance_now = row.domain.distance(self.activities[c]);
                let score_change = if self.num_false_enforcement[c] == 0 && old_false_enforcement == 1 {
                    -weights[c] * distance_now as f64
                } else if old_false_enforcement == 0 && self.num_false_enforcement[c] == 1 {
                    weights[c] * distance_now as f64
                } else {
                    0.0
                };
                if score_change != 0.0 {
                    for lit in &row.enforcement {
                        if lit.var == var {
                            continue;
                        }
                        let would_flip_on = (jump_deltas[lit.var.index()] != 0)
                            && ((solution[lit.var.index()] + jump_deltas[lit.var.index()] != 0) == lit.positive);
                        if would_flip_on {
                            jump_scores[lit.var.index()] += score_change;
                        }
                    }
                }
            }
        }
        changed
    }
}

impl Default for LinearIncrementalEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: usize) -> VarId {
        VarId::from_index(i)
    }

    #[test]
    fn domain_distance_and_two_values() {
        let d = IntDomain::new(0, 2);
        assert_eq!(d.distance(0), 0);
        assert_eq!(d.distance(5), 3);
        assert_eq!(d.distance(-1), 1);
        assert!(!d.has_two_values());
        assert!(IntDomain::from_intervals(vec![(0, 0), (1, 1)]).has_two_values());
    }

    #[test]
    fn e3_linear_evaluator_scores_match_spec() {
        // 2x + 3y in [4,4], x,y in {0,1,2}.
        let mut ev = LinearIncrementalEvaluator::new();
        let c = ev.new_constraint(IntDomain::fixed(4));
        ev.add_term(c, v(0), 2);
        ev.add_term(c, v(1), 3);
        ev.finalize(&[2, 2]);

        let solution = [0i64, 0];
        ev.compute_initial_activities(&solution);
        assert_eq!(ev.activity(c), 0);
        assert_eq!(ev.violation(c), 4);

        let weights = [1.0];
        let score_x_plus1 = ev.weighted_violation_delta(&weights, v(0), 1, &solution);
        assert_eq!(score_x_plus1, -2.0);
        let score_y_plus1 = ev.weighted_violation_delta(&weights, v(1), 1, &solution);
        assert_eq!(score_y_plus1, -3.0);

        // Move y: 0 -> 1.
        let mut jump_deltas = vec![0i64; 2];
        let mut jump_scores = vec![0.0f64; 2];
        let solution_after_y = [0i64, 1];
        ev.update_variable_and_scores(v(1), 0, 1, &weights, &jump_deltas, &mut jump_scores, &solution_after_y);
        assert_eq!(ev.activity(c), 3);
        assert_eq!(ev.violation(c), 1);

        // Move y back: 1 -> 0, then x: 0 -> 2 reaches feasibility at (2,0).
        let solution_after_y_back = [0i64, 0];
        ev.update_variable_and_scores(v(1), 1, 0, &weights, &jump_deltas, &mut jump_scores, &solution_after_y_back);
        assert_eq!(ev.activity(c), 0);

        jump_deltas[0] = 2;
        let solution_final = [2i64, 0];
        ev.update_variable_and_scores(v(0), 0, 2, &weights, &jump_deltas, &mut jump_scores, &solution_final);
        assert_eq!(ev.activity(c), 4);
        assert_eq!(ev.violation(c), 0);
    }

    #[test]
    fn enforcement_literal_gates_violation_to_zero() {
        let mut ev = LinearIncrementalEvaluator::new();
        let c = ev.new_constraint(IntDomain::fixed(0));
        ev.add_enforcement_literal(c, v(0), true);
        ev.add_term(c, v(1), 1);
        ev.finalize(&[1, 5]);
        let solution = [0i64, 5];
        ev.compute_initial_activities(&solution);
        // enforcement literal false (var0=0 but positive literal needs 1) => violation 0.
        assert_eq!(ev.violation(c), 0);
        assert_eq!(ev.num_false_enforcement[c], 1);
    }

    #[test]
    fn breakpoint_delta_lands_on_interior_feasible_value_not_an_endpoint() {
        // x in [4,4], x in [0,10], starting at x=0 (violation 4): both domain
        // endpoints (0, 10) make it worse; the breakpoint is the interior
        // value x=4.
        let mut ev = LinearIncrementalEvaluator::new();
        let c = ev.new_constraint(IntDomain::fixed(4));
        ev.add_term(c, v(0), 1);
        ev.finalize(&[10]);
        let solution = [0i64];
        ev.compute_initial_activities(&solution);
        assert_eq!(ev.violation(c), 4);

        let deltas = ev.breakpoint_deltas_for_var(v(0));
        assert_eq!(deltas, vec![4]);
    }
}
