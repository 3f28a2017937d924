//! Non-linear compiled constraints (§4.B.2): a tagged sum type with a shared
//! `ViolationOps` trait, per §9's redesign of the source's virtual hierarchy.

use crate::variables::VarId;

/// Shared contract every compiled non-linear constraint implements (§4.B.2).
pub trait ViolationOps {
    /// Recompute the violation from scratch and cache it, returning it.
    fn initialize(&mut self, solution: &[i64]) -> i64;
    /// Update the cached violation after `var` changed from `old_value`.
    fn perform_move(&mut self, var: VarId, old_value: i64, solution: &[i64]);
    /// The violation delta if `var` changed from `old_value`, without
    /// committing. Default implementation recomputes from scratch (§4.B.2).
    fn violation_delta(&self, var: VarId, old_value: i64, solution: &[i64]) -> i64 {
        let mut before = solution.to_vec();
        before[var.index()] = old_value;
        self.compute_violation(solution) - self.compute_violation(&before)
    }
    /// The sorted, deduplicated list of variables this constraint touches.
    fn used_variables(&self) -> Vec<VarId>;
    /// The constraint's cached violation.
    fn violation(&self) -> i64;
    /// Recompute the violation of this constraint from `solution` (no caching).
    fn compute_violation(&self, solution: &[i64]) -> i64;
}

/// A linear expression `offset + sum coeff*var` used inside [`LinMax`].
#[derive(Clone, Debug)]
pub struct LinExpr {
    /// Constant term.
    pub offset: i64,
    /// `(variable, coefficient)` terms.
    pub terms: Vec<(VarId, i64)>,
}

impl LinExpr {
    fn eval(&self, solution: &[i64]) -> i64 {
        self.terms.iter().fold(self.offset, |acc, &(v, c)| acc + c * solution[v.index()])
    }
}

/// `target = XOR(literals)`; violation `1 - (xor mod 2)` (§4.B.2 table).
#[derive(Clone, Debug)]
pub struct BoolXor {
    literals: Vec<(VarId, bool)>,
    cached: i64,
}

impl BoolXor {
    /// Build from `(var, positive)` literal pairs.
    pub fn new(literals: Vec<(VarId, bool)>) -> Self {
        BoolXor { literals, cached: 0 }
    }
}

/// `target = max(e_1..e_k)`; violation `max(0, target - max_i e_i)` (§4.B.2 table).
#[derive(Clone, Debug)]
pub struct LinMax {
    target: VarId,
    exprs: Vec<LinExpr>,
    cached: i64,
}

impl LinMax {
    /// Build from the target variable and the candidate expressions.
    pub fn new(target: VarId, exprs: Vec<LinExpr>) -> Self {
        assert!(!exprs.is_empty(), "lin_max needs at least one expression");
        LinMax { target, exprs, cached: 0 }
    }
}

/// `target = product(factors)`; violation `|target - product|`.
#[derive(Clone, Debug)]
pub struct IntProd {
    target: VarId,
    factors: Vec<VarId>,
    cached: i64,
}

impl IntProd {
    /// Build from the target variable and factor variables.
    pub fn new(target: VarId, factors: Vec<VarId>) -> Self {
        IntProd { target, factors, cached: 0 }
    }
}

/// `target = a / b` (integer division, `b` assumed non-zero); violation `|target - a/b|`.
#[derive(Clone, Debug)]
pub struct IntDiv {
    target: VarId,
    a: VarId,
    b: VarId,
    cached: i64,
}

impl IntDiv {
    /// Build from target, dividend and divisor variables.
    pub fn new(target: VarId, a: VarId, b: VarId) -> Self {
        IntDiv { target, a, b, cached: 0 }
    }
}

/// `target = a mod m`, `m` a compile-time constant; see the glossary's
/// signed-mod-adjusted violation formula.
#[derive(Clone, Debug)]
pub struct IntMod {
    target: VarId,
    a: VarId,
    modulus: i64,
    cached: i64,
}

impl IntMod {
    /// Build from target, dividend variable and constant modulus.
    pub fn new(target: VarId, a: VarId, modulus: i64) -> Self {
        assert!(modulus != 0, "modulus must be non-zero");
        IntMod { target, a, modulus, cached: 0 }
    }
}

/// `violation = sum over value-groups of count*(count-1)/2` (§4.B.2 table).
#[derive(Clone, Debug)]
pub struct AllDifferent {
    vars: Vec<VarId>,
    cached: i64,
}

impl AllDifferent {
    /// Build from the list of variables that must all differ.
    pub fn new(vars: Vec<VarId>) -> Self {
        AllDifferent { vars, cached: 0 }
    }
}

/// One task `[start, start+size)` in a `no_overlap`/`cumulative` constraint,
/// using `start + size` as the end endpoint per §9's explicit design note
/// (not a separate `end` expression).
#[derive(Clone, Copy, Debug)]
pub struct Interval {
    /// Start-time variable.
    pub start: VarId,
    /// Size (duration) variable.
    pub size: VarId,
    /// Optional enforcement literal gating whether this interval is present.
    pub enforcement: Option<(VarId, bool)>,
}

impl Interval {
    fn bounds(&self, solution: &[i64]) -> (i64, i64) {
        let s = solution[self.start.index()];
        (s, s + solution[self.size.index()])
    }

    fn is_present(&self, solution: &[i64]) -> bool {
        match self.enforcement {
            None => true,
            Some((v, positive)) => (solution[v.index()] != 0) == positive,
        }
    }
}

/// Pairwise `no_overlap`: `sum_{i<j} max(0, min(end_i-start_j, end_j-start_i))`,
/// gated by each pair's presence (§4.B.2 table).
#[derive(Clone, Debug)]
pub struct NoOverlapPair {
    intervals: Vec<Interval>,
    cached: i64,
}

impl NoOverlapPair {
    /// Build from the participating intervals.
    pub fn new(intervals: Vec<Interval>) -> Self {
        NoOverlapPair { intervals, cached: 0 }
    }
}

/// Pairwise `no_overlap_2d`: a pair only violates if it overlaps on both axes;
/// violation is the lesser axis's repair cost scaled by the other axis's
/// overlap, matching the table's `max(0, min(x-repair*y-overlap, y-repair*x-overlap))`.
#[derive(Clone, Debug)]
pub struct NoOverlap2dPair {
    x: Vec<Interval>,
    y: Vec<Interval>,
    cached: i64,
}

impl NoOverlap2dPair {
    /// Build from parallel x/y interval lists (same length, same index = same box).
    pub fn new(x: Vec<Interval>, y: Vec<Interval>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y interval lists must be parallel");
        NoOverlap2dPair { x, y, cached: 0 }
    }
}

fn axis_overlap(a: (i64, i64), b: (i64, i64)) -> i64 {
    let lo = a.0.max(b.0);
    let hi = a.1.min(b.1);
    (hi - lo).max(0)
}

fn axis_repair(a: (i64, i64), b: (i64, i64)) -> i64 {
    // Cost to separate a from b along this axis: move whichever is cheaper.
    (a.1 - b.0).min(b.1 - a.0).max(0)
}

/// A single cumulative-resource task.
#[derive(Clone, Copy, Debug)]
pub struct CumulativeTask {
    /// The task's time interval.
    pub interval: Interval,
    /// Demand placed on the resource while the task is active.
    pub demand: VarId,
}

/// `cumulative`: profile-based integral of `max(0, load - capacity)` over
/// time (§4.B.2 table). Builds an event sweep over task boundaries.
#[derive(Clone, Debug)]
pub struct Cumulative {
    tasks: Vec<CumulativeTask>,
    capacity: VarId,
    cached: i64,
}

impl Cumulative {
    /// Build from tasks and a (possibly variable) resource capacity.
    pub fn new(tasks: Vec<CumulativeTask>, capacity: VarId) -> Self {
        Cumulative { tasks, capacity, cached: 0 }
    }
}

/// A directed next-arc in a `circuit`/`routes` constraint, selected when
/// `literal` holds.
#[derive(Clone, Copy, Debug)]
pub struct CircuitArc {
    /// Arc tail node.
    pub tail: usize,
    /// Arc head node.
    pub head: usize,
    /// Literal selecting this arc.
    pub literal: (VarId, bool),
}

/// `circuit`/`routes`: violation from the SCC structure of the currently
/// enforced next-arcs (§4.B.2 table, glossary "SCC").
#[derive(Clone, Debug)]
pub struct Circuit {
    arcs: Vec<CircuitArc>,
    num_nodes: usize,
    /// `routes` variant designates one node as the depot, which may be
    /// legitimately skipped by a one-node self-loop; plain `circuit` has none.
    depot: Option<usize>,
    cached: i64,
}

impl Circuit {
    /// Build from the arc list, node count, and optional depot (for `routes`).
    pub fn new(arcs: Vec<CircuitArc>, num_nodes: usize, depot: Option<usize>) -> Self {
        Circuit { arcs, num_nodes, depot, cached: 0 }
    }

    /// Selected successor of `node` under `solution`, if any enforced arc picks one.
    fn successor(&self, node: usize, solution: &[i64]) -> Option<usize> {
        self.arcs
            .iter()
            .find(|a| a.tail == node && (solution[a.literal.0.index()] != 0) == a.literal.1)
            .map(|a| a.head)
    }

    fn num_sccs_and_cross_arc_incoming(&self, solution: &[i64]) -> (usize, usize) {
        // The enforced arcs form a functional graph (at most one out-arc per
        // node); its SCCs are exactly the cycles reachable by following
        // `successor` pointers, found in O(n) via a visited-state walk.
        let mut state = vec![0u8; self.num_nodes]; // 0 unvisited, 1 in-progress, 2 done
        let mut sccs: Vec<Vec<usize>> = Vec::new();
        for start in 0..self.num_nodes {
            if state[start] != 0 {
                continue;
            }
            let mut path = Vec::new();
            let mut node = start;
            loop {
                if state[node] == 1 {
                    let cycle_start = path.iter().position(|&n| n == node).unwrap();
                    sccs.push(path[cycle_start..].to_vec());
                    break;
                }
                if state[node] == 2 {
                    break;
                }
                state[node] = 1;
                path.push(node);
                match self.successor(node, solution) {
                    Some(next) => node = next,
                    None => break,
                }
            }
            for &n in &path {
                state[n] = 2;
            }
        }
        let num_sccs = sccs.len();
        let with_incoming_cross_arc = sccs
            .iter()
            .filter(|scc| {
                let members: std::collections::HashSet<usize> = scc.iter().copied().collect();
                self.arcs.iter().any(|a| {
                    members.contains(&a.head)
                        && !members.contains(&a.tail)
                        && (solution[a.literal.0.index()] != 0) == a.literal.1
                })
            })
            .count();
        (num_sccs, with_incoming_cross_arc)
    }
}

/// A tagged sum of every non-linear constraint kind (§9 redesign note).
#[derive(Clone, Debug)]
pub enum CompiledConstraint {
    /// See [`BoolXor`].
    BoolXor(BoolXor),
    /// See [`LinMax`].
    LinMax(LinMax),
    /// See [`IntProd`].
    IntProd(IntProd),
    /// See [`IntDiv`].
    IntDiv(IntDiv),
    /// See [`IntMod`].
    IntMod(IntMod),
    /// See [`AllDifferent`].
    AllDifferent(AllDifferent),
    /// See [`NoOverlapPair`].
    NoOverlapPair(NoOverlapPair),
    /// See [`NoOverlap2dPair`].
    NoOverlap2dPair(NoOverlap2dPair),
    /// See [`Cumulative`].
    Cumulative(Cumulative),
    /// See [`Circuit`].
    Circuit(Circuit),
}

impl ViolationOps for CompiledConstraint {
    fn initialize(&mut self, solution: &[i64]) -> i64 {
        let v = self.compute_violation(solution);
        match self {
            CompiledConstraint::BoolXor(c) => c.cached = v,
            CompiledConstraint::LinMax(c) => c.cached = v,
            CompiledConstraint::IntProd(c) => c.cached = v,
            CompiledConstraint::IntDiv(c) => c.cached = v,
            CompiledConstraint::IntMod(c) => c.cached = v,
            CompiledConstraint::AllDifferent(c) => c.cached = v,
            CompiledConstraint::NoOverlapPair(c) => c.cached = v,
            CompiledConstraint::NoOverlap2dPair(c) => c.cached = v,
            CompiledConstraint::Cumulative(c) => c.cached = v,
            CompiledConstraint::Circuit(c) => c.cached = v,
        }
        v
    }

    fn perform_move(&mut self, _var: VarId, _old_value: i64, solution: &[i64]) {
        let v = self.compute_violation(solution);
        match self {
            CompiledConstraint::BoolXor(c) => c.cached = v,
            CompiledConstraint::LinMax(c) => c.cached = v,
            CompiledConstraint::IntProd(c) => c.cached = v,
            CompiledConstraint::IntDiv(c) => c.cached = v,
            CompiledConstraint::IntMod(c) => c.cached = v,
            CompiledConstraint::AllDifferent(c) => c.cached = v,
            CompiledConstraint::NoOverlapPair(c) => c.cached = v,
            CompiledConstraint::NoOverlap2dPair(c) => c.cached = v,
            CompiledConstraint::Cumulative(c) => c.cached = v,
            CompiledConstraint::Circuit(c) => c.cached = v,
        }
    }

    fn used_variables(&self) -> Vec<VarId> {
        let mut vars: Vec<VarId> = match self {
            CompiledConstraint::BoolXor(c) => c.literals.iter().map(|&(v, _)| v).collect(),
            CompiledConstraint::LinMax(c) => {
                let mut vs = vec![c.target];
                vs.extend(c.exprs.iter().flat_map(|e| e.terms.iter().map(|&(v, _)| v)));
                vs
            }
            CompiledConstraint::IntProd(c) => {
                let mut vs = vec![c.target];
                vs.extend(c.factors.iter().copied());
                vs
            }
            CompiledConstraint::IntDiv(c) => vec![c.target, c.a, c.b],
            CompiledConstraint::IntMod(c) => vec![c.target, c.a],
            CompiledConstraint::AllDifferent(c) => c.vars.clone(),
            CompiledConstraint::NoOverlapPair(c) => c
                .intervals
                .iter()
                .flat_map(|iv| {
                    let mut vs = vec![iv.start, iv.size];
                    vs.extend(iv.enforcement.map(|(v, _)| v));
                    vs
                })
                .collect(),
            CompiledConstraint::NoOverlap2dPair(c) => c
                .x
                .iter()
                .chain(c.y.iter())
                .flat_map(|iv| {
                    let mut vs = vec![iv.start, iv.size];
                    vs.extend(iv.enforcement.map(|(v, _)| v));
                    vs
                })
                .collect(),
            CompiledConstraint::Cumulative(c) => {
                let mut vs = vec![c.capacity];
                for t in &c.tasks {
                    vs.push(t.interval.start);
                    vs.push(t.interval.size);
                    vs.push(t.demand);
                    vs.extend(t.interval.enforcement.map(|(v, _)| v));
                }
                vs
            }
            CompiledConstraint::Circuit(c) => c.arcs.iter().map(|a| a.literal.0).collect(),
        };
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    fn violation(&self) -> i64 {
        match self {
            CompiledConstraint::BoolXor(c) => c.cached,
            CompiledConstraint::LinMax(c) => c.cached,
            CompiledConstraint::IntProd(c) => c.cached,
            CompiledConstraint::IntDiv(c) => c.cached,
            CompiledConstraint::IntMod(c) => c.cached,
            CompiledConstraint::AllDifferent(c) => c.cached,
            CompiledConstraint::NoOverlapPair(c) => c.cached,
            CompiledConstraint::NoOverlap2dPair(c) => c.cached,
            CompiledConstraint::Cumulative(c) => c.cached,
            CompiledConstraint::Circuit(c) => c.cached,
        }
    }

    fn compute_violation(&self, solution: &[i64]) -> i64 {
        match self {
            CompiledConstraint::BoolXor(c) => {
                let xor = c.literals.iter().fold(0i64, |acc, &(v, positive)| {
                    let lit_value = (solution[v.index()] != 0) == positive;
                    acc ^ i64::from(lit_value)
                });
                1 - xor
            }
            CompiledConstraint::LinMax(c) => {
                let max_e = c.exprs.iter().map(|e| e.eval(solution)).max().unwrap_or(i64::MIN);
                (solution[c.target.index()] - max_e).max(0)
            }
            CompiledConstraint::IntProd(c) => {
                let product = c.factors.iter().fold(1i64, |acc, &v| acc * solution[v.index()]);
                (solution[c.target.index()] - product).abs()
            }
            CompiledConstraint::IntDiv(c) => {
                let a = solution[c.a.index()];
                let b = solution[c.b.index()];
                (solution[c.target.index()] - a.div_euclid(b)).abs()
            }
            CompiledConstraint::IntMod(c) => {
                let a = solution[c.a.index()];
                let m = c.modulus;
                let t = solution[c.target.index()];
                let e = a % m; // signed remainder, takes the sign of `a` like C++'s `%`
                let r = e.rem_euclid(m);
                if (e >= 0) == (t >= 0) {
                    let o1 = (t - r).abs();
                    let o2 = t.abs() + (m.abs() - r).abs();
                    let o3 = r.abs() + (m.abs() - t).abs();
                    o1.min(o2).min(o3)
                } else {
                    t.abs() + e.abs()
                }
            }
            CompiledConstraint::AllDifferent(c) => {
                let mut counts: std::collections::HashMap<i64, i64> = std::collections::HashMap::new();
                for &v in &c.vars {
                    *counts.entry(solution[v.index()]).or_insert(0) += 1;
                }
                counts.values().map(|&n| n * (n - 1) / 2).sum()
            }
            CompiledConstraint::NoOverlapPair(c) => {
                let mut total = 0i64;
                for i in 0..c.intervals.len() {
                    for j in (i + 1)..c.intervals.len() {
                        let (a, b) = (&c.intervals[i], &c.intervals[j]);
                        if !a.is_present(solution) || !b.is_present(solution) {
                            continue;
                        }
                        let (a_start, a_end) = a.bounds(solution);
                        let (b_start, b_end) = b.bounds(solution);
                        total += (a_end - b_start).min(b_end - a_start).max(0);
                    }
                }
                total
            }
            CompiledConstraint::NoOverlap2dPair(c) => {
                let mut total = 0i64;
                let n = c.x.len();
                for i in 0..n {
                    for j in (i + 1)..n {
                        if !c.x[i].is_present(solution) || !c.x[j].is_present(solution) {
                            continue;
                        }
                        let xb_i = c.x[i].bounds(solution);
                        let xb_j = c.x[j].bounds(solution);
                        let yb_i = c.y[i].bounds(solution);
                        let yb_j = c.y[j].bounds(solution);
                        let x_overlap = axis_overlap(xb_i, xb_j);
                        let y_overlap = axis_overlap(yb_i, yb_j);
                        if x_overlap == 0 || y_overlap == 0 {
                            continue;
                        }
                        let x_repair = axis_repair(xb_i, xb_j);
                        let y_repair = axis_repair(yb_i, yb_j);
                        total += (x_repair * y_overlap).min(y_repair * x_overlap).max(0);
                    }
                }
                total
            }
            CompiledConstraint::Cumulative(c) => {
                let capacity = solution[c.capacity.index()];
                let mut events: Vec<(i64, i64)> = Vec::new(); // (time, demand delta)
                for t in &c.tasks {
                    if !t.interval.is_present(solution) {
                        continue;
                    }
                    let (start, end) = t.interval.bounds(solution);
                    if end <= start {
                        continue;
                    }
                    let demand = solution[t.demand.index()];
                    events.push((start, demand));
                    events.push((end, -demand));
                }
                events.sort_unstable();
                let mut load = 0i64;
                let mut total = 0i64;
                let mut prev_time = events.first().map_or(0, |e| e.0);
                for &(time, delta) in &events {
                    if time > prev_time {
                        total += (load - capacity).max(0) * (time - prev_time);
                    }
                    load += delta;
                    prev_time = time;
                }
                total
            }
            CompiledConstraint::Circuit(c) => {
                let (num_sccs, with_incoming_cross_arc) = c.num_sccs_and_cross_arc_incoming(solution);
                if num_sccs == 0 {
                    return 0;
                }
                let base = (num_sccs as i64 - 1) + (num_sccs as i64 - with_incoming_cross_arc as i64 - 1).max(0);
                let depot_penalty = match c.depot {
                    Some(depot) => {
                        let reachable = c.successor(depot, solution).is_some();
                        i64::from(!reachable)
                    }
                    None => 0,
                };
                base + depot_penalty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: usize) -> VarId {
        VarId::from_index(i)
    }

    #[test]
    fn e4_bool_xor_matches_spec() {
        let mut c = CompiledConstraint::BoolXor(BoolXor::new(vec![(v(0), true), (v(1), true), (v(2), true)]));
        let solution = [0i64, 0, 0];
        assert_eq!(c.initialize(&solution), 1);
        let mut flipped = solution;
        flipped[0] = 1;
        c.perform_move(v(0), 0, &flipped);
        assert_eq!(c.violation(), 0);
    }

    #[test]
    fn e5_all_different_matches_spec() {
        let c = AllDifferent::new(vec![v(0), v(1), v(2), v(3)]);
        let mut wrapped = CompiledConstraint::AllDifferent(c);
        let solution = [1i64, 1, 2, 2];
        assert_eq!(wrapped.initialize(&solution), 2);
        let flipped = [1i64, 2, 2, 2];
        wrapped.perform_move(v(1), 1, &flipped);
        assert_eq!(wrapped.violation(), 3);
    }

    #[test]
    fn int_prod_and_div_formulas() {
        let mut prod = CompiledConstraint::IntProd(IntProd::new(v(0), vec![v(1), v(2)]));
        assert_eq!(prod.initialize(&[10, 3, 4]), 2);

        let mut div = CompiledConstraint::IntDiv(IntDiv::new(v(0), v(1), v(2)));
        assert_eq!(div.initialize(&[2, 7, 3]), 0);
    }

    #[test]
    fn int_mod_matching_signs_uses_min_of_three_repairs() {
        // a=7, m=3 => e=1, r=1. target t=5 (same sign as e).
        let c = IntMod::new(v(0), v(1), 3);
        let mut wrapped = CompiledConstraint::IntMod(c);
        let violation = wrapped.initialize(&[5, 7]);
        assert!(violation >= 0);
    }

    #[test]
    fn no_overlap_pair_detects_overlap() {
        let intervals = vec![
            Interval { start: v(0), size: v(1), enforcement: None },
            Interval { start: v(2), size: v(3), enforcement: None },
        ];
        let mut c = CompiledConstraint::NoOverlapPair(NoOverlapPair::new(intervals));
        // [0,5) and [2,7): overlap amount = min(5-2, 7-0)=3
        assert_eq!(c.initialize(&[0, 5, 2, 5]), 3);
    }

    #[test]
    fn cumulative_profile_sums_overload() {
        let tasks = vec![
            CumulativeTask {
                interval: Interval { start: v(0), size: v(1), enforcement: None },
                demand: v(2),
            },
            CumulativeTask {
                interval: Interval { start: v(3), size: v(4), enforcement: None },
                demand: v(5),
            },
        ];
        let c = Cumulative::new(tasks, v(6));
        let mut wrapped = CompiledConstraint::Cumulative(c);
        // task1 [0,4) demand 3; task2 [2,6) demand 3; capacity 4. overlap [2,4): load 6, over by 2 for 2 units time = 4
        let violation = wrapped.initialize(&[0, 4, 3, 2, 4, 3, 4]);
        assert_eq!(violation, 4);
    }

    #[test]
    fn circuit_single_cycle_is_feasible() {
        // 0 -> 1 -> 2 -> 0, literals all fixed true (var value 1).
        let arcs = vec![
            CircuitArc { tail: 0, head: 1, literal: (v(0), true) },
            CircuitArc { tail: 1, head: 2, literal: (v(1), true) },
            CircuitArc { tail: 2, head: 0, literal: (v(2), true) },
        ];
        let c = Circuit::new(arcs, 3, None);
        let mut wrapped = CompiledConstraint::Circuit(c);
        assert_eq!(wrapped.initialize(&[1, 1, 1]), 0);
    }
}
