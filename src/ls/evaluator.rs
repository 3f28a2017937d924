//! Combined linear + non-linear violation evaluator (§4.B `LsEvaluator`,
//! `constraint_violation.h` `LsEvaluator`).

use crate::ls::compiled_constraint::{CompiledConstraint, ViolationOps};
use crate::ls::linear_evaluator::LinearIncrementalEvaluator;
use crate::variables::VarId;
use std::collections::HashSet;

/// Global weight vector is indexed `[0, num_linear)` for linear rows and
/// `[num_linear, num_linear + num_non_linear)` for compiled constraints, so
/// one weight array and one violated-set cover both families (§4.B.3).
pub struct LsEvaluator {
    linear: LinearIncrementalEvaluator,
    non_linear: Vec<CompiledConstraint>,
    var_to_non_linear: Vec<Vec<usize>>,
    weights: Vec<f64>,
    violated_constraints: HashSet<usize>,
}

impl std::fmt::Debug for LsEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LsEvaluator")
            .field("num_linear", &self.linear.num_constraints())
            .field("num_non_linear", &self.non_linear.len())
            .field("num_violated", &self.violated_constraints.len())
            .finish()
    }
}

impl LsEvaluator {
    /// Build from an already-finalized linear evaluator and the list of
    /// compiled non-linear constraints, given the total variable count.
    pub fn new(linear: LinearIncrementalEvaluator, non_linear: Vec<CompiledConstraint>, num_vars: usize) -> Self {
        let mut var_to_non_linear = vec![Vec::new(); num_vars];
        for (i, constraint) in non_linear.iter().enumerate() {
            for var in constraint.used_variables() {
                var_to_non_linear[var.index()].push(i);
            }
        }
        let num_linear = linear.num_constraints();
        LsEvaluator {
            linear,
            non_linear,
            var_to_non_linear,
            weights: vec![1.0; num_linear + non_linear.len()],
            violated_constraints: HashSet::new(),
        }
    }

    fn num_linear(&self) -> usize {
        self.linear.num_constraints()
    }

    fn global_non_linear_index(&self, i: usize) -> usize {
        self.num_linear() + i
    }

    /// Initialize both evaluators from `solution`, and seed the violated set.
    pub fn compute_all_violations(&mut self, solution: &[i64]) {
        self.linear.compute_initial_activities(solution);
        self.violated_constraints.clear();
        for c in 0..self.num_linear() {
            if self.linear.is_violated(c) {
                self.violated_constraints.insert(c);
            }
        }
        for (i, constraint) in self.non_linear.iter_mut().enumerate() {
            let v = constraint.initialize(solution);
            if v > 0 {
                self.violated_constraints.insert(self.num_linear() + i);
            }
        }
    }

    /// Current weight of global constraint index `g`.
    pub fn weight(&self, g: usize) -> f64 {
        self.weights[g]
    }

    /// Mutable access to the whole weight vector, for bump/decay/rescale (§4.B.3).
    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Total number of constraints (linear rows plus compiled constraints).
    pub fn num_constraints(&self) -> usize {
        self.weights.len()
    }

    /// `sum_g weight(g) * violation(g)` (§4.B.3 "weighted violation").
    pub fn weighted_violation(&self) -> f64 {
        let linear_weights = &self.weights[..self.num_linear()];
        let mut total = self.linear.weighted_violation(linear_weights);
        for (i, constraint) in self.non_linear.iter().enumerate() {
            total += self.weights[self.global_non_linear_index(i)] * constraint.violation() as f64;
        }
        total
    }

    /// `sum_g violation(g)`, unweighted (§4.B.3 "infeasibility").
    pub fn sum_of_violations(&self) -> i64 {
        let mut total: i64 = (0..self.num_linear()).map(|c| self.linear.violation(c)).sum();
        total += self.non_linear.iter().map(|c| c.violation()).sum::<i64>();
        total
    }

    /// Number of constraints with positive violation.
    pub fn num_infeasible_constraints(&self) -> usize {
        self.violated_constraints.len()
    }

    /// Read-only view of the currently-violated global constraint indices.
    pub fn violated_constraints(&self) -> &HashSet<usize> {
        &self.violated_constraints
    }

    /// Breakpoint deltas for `var` over every linear row touching it
    /// (`LinearIncrementalEvaluator::breakpoint_deltas_for_var`), used to seed
    /// jump candidates at the interior point where a row's violation reaches
    /// zero rather than only at `var`'s domain endpoints.
    pub fn linear_breakpoint_deltas(&self, var: VarId) -> Vec<i64> {
        self.linear.breakpoint_deltas_for_var(var)
    }

    /// Estimate `weighted_violation` delta if `solution[var] += delta`,
    /// without committing, summing both families' contributions (§4.B.4
    /// `ComputeScore`'s per-candidate probe).
    pub fn weighted_violation_delta(&self, var: VarId, delta: i64, solution: &[i64]) -> f64 {
        let linear_weights = &self.weights[..self.num_linear()];
        let mut total = self.linear.weighted_violation_delta(linear_weights, var, delta, solution);
        if delta != 0 {
            let old_value = solution[var.index()];
            let mut perturbed = solution.to_vec();
            perturbed[var.index()] = old_value + delta;
            for &i in &self.var_to_non_linear[var.index()] {
                let g = self.global_non_linear_index(i);
                let before = self.non_linear[i].violation();
                let after = self.non_linear[i].compute_violation(&perturbed);
                total += self.weights[g] * (after - before) as f64;
            }
        }
        total
    }

    /// Commit `solution[var]: old_value -> new_value`: update linear rows'
    /// activities/distances/jump-score deltas in place, and recompute each
    /// touched non-linear constraint's cached violation. Returns every
    /// variable whose cached jump needs invalidating (its own jump, plus any
    /// co-touched variable of an affected constraint).
    pub fn commit_move(
        &mut self,
        var: VarId,
        old_value: i64,
        new_value: i64,
        jump_deltas: &[i64],
        jump_scores: &mut [f64],
        solution: &[i64],
    ) -> Vec<VarId> {
        let linear_weights = self.weights[..self.num_linear()].to_vec();
        let changed_linear =
            self.linear
                .update_variable_and_scores(var, old_value, new_value, &linear_weights, jump_deltas, jump_scores, solution);
        for c in changed_linear {
            if self.linear.is_violated(c) {
                self.violated_constraints.insert(c);
            } else {
                self.violated_constraints.remove(&c);
            }
        }

        let mut touched = vec![var];
        for &i in &self.var_to_non_linear[var.index()].clone() {
            let g = self.global_non_linear_index(i);
            self.non_linear[i].perform_move(var, old_value, solution);
            if self.non_linear[i].violation() > 0 {
                self.violated_constraints.insert(g);
            } else {
                self.violated_constraints.remove(&g);
            }
            for u in self.non_linear[i].used_variables() {
                if u != var {
                    touched.push(u);
                }
            }
        }
        touched.sort_unstable();
        touched.dedup();
        touched
    }

    /// Variables touching global constraint `g` (linear row or compiled
    /// constraint), for initial jump-table population.
    pub fn constraint_to_vars(&self, g: usize) -> Vec<VarId> {
        if g < self.num_linear() {
            self.linear.constraint_to_vars(g)
        } else {
            self.non_linear[g - self.num_linear()].used_variables()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ls::compiled_constraint::{AllDifferent, CompiledConstraint};
    use crate::ls::linear_evaluator::IntDomain;

    fn v(i: usize) -> VarId {
        VarId::from_index(i)
    }

    #[test]
    fn combines_linear_and_non_linear_violations() {
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 2);
        linear.add_term(c, v(1), 3);
        linear.finalize(&[2, 2, 2]);

        let all_diff = CompiledConstraint::AllDifferent(AllDifferent::new(vec![v(0), v(2)]));
        let mut ev = LsEvaluator::new(linear, vec![all_diff], 3);

        let solution = [0i64, 0, 0];
        ev.compute_all_violations(&solution);
        // linear violation 4 (activity 0 vs target 4), plus x==z ties once.
        assert_eq!(ev.sum_of_violations(), 5);
        assert_eq!(ev.num_infeasible_constraints(), 2);
    }

    #[test]
    fn commit_move_updates_violated_set_and_returns_touched_vars() {
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 2);
        linear.add_term(c, v(1), 3);
        linear.finalize(&[2, 2]);
        let mut ev = LsEvaluator::new(linear, vec![], 2);

        let mut solution = vec![0i64, 0];
        ev.compute_all_violations(&solution);
        assert!(ev.num_infeasible_constraints() > 0);

        let jump_deltas = vec![0i64; 2];
        let mut jump_scores = vec![0.0f64; 2];
        solution[1] = 1;
        let touched = ev.commit_move(v(1), 0, 1, &jump_deltas, &mut jump_scores, &solution);
        assert!(touched.contains(&v(1)));
    }
}
