//! The feasibility-jump local-search driver (§4.B.4-§4.B.5,
//! `feasibility_jump.h` `FeasibilityJumpSolver`/`LsState`).

use crate::core::error::{Result, SolverError};
use crate::ls::compound_move::CompoundMoveBuilder;
use crate::ls::evaluator::LsEvaluator;
use crate::ls::jump_table::JumpTable;
use crate::ls::linear_evaluator::IntDomain;
use crate::ls::luby::LubyCounter;
use crate::ls::params::LsParams;
use crate::ls::polarity::PolarityTracker;
use crate::variables::VarId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_WEIGHT: f64 = 1e10;

/// Per-run randomized knobs (§4.B.5 `LsOptions`), sampled once per restart so
/// different states in a shared pool explore different move strategies.
#[derive(Clone, Copy, Debug)]
pub struct LsOptions {
    /// Whether this state restarts on a Luby-scheduled cadence.
    pub use_restart: bool,
    /// Whether stale weight bumps decay (`bump_value *= 1/decay` each step).
    pub use_decay: bool,
    /// Whether a rejected unit move may be extended into a compound move.
    pub use_compound_moves: bool,
}

impl LsOptions {
    /// All strategies enabled; the default for a freshly created state before
    /// any randomization.
    pub fn all_enabled() -> Self {
        LsOptions { use_restart: true, use_decay: true, use_compound_moves: true }
    }

    /// Independently re-roll each knob with 50% probability (§4.B.5 `Randomize`).
    pub fn randomize(&mut self, rng: &mut StdRng) {
        self.use_restart = rng.gen_bool(0.5);
        self.use_decay = rng.gen_bool(0.5);
        self.use_compound_moves = rng.gen_bool(0.5);
    }
}

impl Default for LsOptions {
    fn default() -> Self {
        Self::all_enabled()
    }
}

/// Running statistics for one state, exposed for [`crate::ls::shared_state::SharedLsStates`]
/// aggregation (§4.B.5 `LsCounters`).
#[derive(Clone, Copy, Debug, Default)]
pub struct LsCounters {
    /// Number of batches run.
    pub num_batches: u64,
    /// Number of unit/compound moves committed.
    pub num_moves: u64,
    /// Number of times the violated-constraint weights were bumped.
    pub num_weight_updates: u64,
    /// Number of restarts triggered (Luby-scheduled or forced).
    pub num_restarts: u64,
}

/// One independent local-search worker: a candidate solution, its jump cache,
/// and the bookkeeping needed to resume across batches (§4.B.4 `LsState`).
pub struct LsState {
    solution: Vec<i64>,
    domains: Vec<IntDomain>,
    evaluator: LsEvaluator,
    jump_table: JumpTable,
    polarity: PolarityTracker,
    params: LsParams,
    options: LsOptions,
    rng: StdRng,
    bump_value: f64,
    luby: LubyCounter,
    steps_since_improvement: i64,
    best_weighted_violation: f64,
    compound: CompoundMoveBuilder,
    discrepancy_ceiling: i32,
    counters: LsCounters,
}

impl std::fmt::Debug for LsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LsState")
            .field("num_vars", &self.solution.len())
            .field("counters", &self.counters)
            .finish()
    }
}

impl LsState {
    /// Build a fresh state at each variable's domain minimum, with every
    /// strategy enabled (§4.B.4 "initial solution: domain minimum").
    pub fn new(domains: Vec<IntDomain>, evaluator: LsEvaluator, params: LsParams) -> Self {
        let solution: Vec<i64> = domains.iter().map(IntDomain::min).collect();
        let num_vars = solution.len();
        let mut jump_table = JumpTable::new();
        jump_table.recompute_all(num_vars);
        let rng = StdRng::seed_from_u64(params.random_seed);
        let polarity_increment = params.polarity_rephase_increment;
        let mut state = LsState {
            solution,
            domains,
            evaluator,
            jump_table,
            polarity: PolarityTracker::new(num_vars, polarity_increment),
            params,
            options: LsOptions::default(),
            rng,
            bump_value: 1.0,
            luby: LubyCounter::new(),
            steps_since_improvement: 0,
            best_weighted_violation: f64::INFINITY,
            compound: CompoundMoveBuilder::new(),
            discrepancy_ceiling: 1,
            counters: LsCounters::default(),
        };
        state.reset_current_solution();
        state
    }

    /// Current candidate assignment.
    pub fn solution(&self) -> &[i64] {
        &self.solution
    }

    /// Current `sum violation(c)`, 0 iff feasible.
    pub fn sum_of_violations(&self) -> i64 {
        self.evaluator.sum_of_violations()
    }

    /// Accumulated run statistics.
    pub fn counters(&self) -> LsCounters {
        self.counters
    }

    /// Re-roll this state's [`LsOptions`] (called by the shared pool on release).
    pub fn randomize_options(&mut self) {
        self.options.randomize(&mut self.rng);
    }

    /// Permanently disable restarts on this state, overriding whatever
    /// [`Self::randomize_options`] has rolled or will roll (§4.B.5: every
    /// 16th pooled state is pinned to pure hill-climbing so the pool always
    /// has a worker that never throws away progress).
    pub fn force_no_restart(&mut self) {
        self.options.use_restart = false;
    }

    /// Whether this state currently restarts on a Luby-scheduled cadence.
    pub fn use_restart(&self) -> bool {
        self.options.use_restart
    }

    fn reset_current_solution(&mut self) {
        self.evaluator.compute_all_violations(&self.solution);
        self.jump_table.recompute_all(self.solution.len());
        self.bump_value = 1.0;
        self.best_weighted_violation = self.evaluator.weighted_violation();
        self.steps_since_improvement = 0;
        self.compound.clear();
        self.discrepancy_ceiling = 1;
    }

    /// Perturb a `var_randomization_probability` fraction of variables by up
    /// to `var_perturbation_range_ratio * domain_width`, then recompute
    /// (§4.B.5 `PerturbateCurrentSolution`, used on non-improving restarts).
    pub fn perturbate_current_solution(&mut self) {
        for i in 0..self.solution.len() {
            if self.rng.gen_bool(self.params.var_randomization_probability) {
                let dom = &self.domains[i];
                let width = (dom.max() - dom.min()).max(1);
                let range = ((width as f64) * self.params.var_perturbation_range_ratio).round() as i64;
                let range = range.max(1);
                let delta = self.rng.gen_range(-range..=range);
                let candidate = (self.solution[i] + delta).clamp(dom.min(), dom.max());
                self.solution[i] = dom.value_at_or_before(candidate);
            }
        }
        self.reset_current_solution();
    }

    /// Variables touching any currently violated constraint (§4.B.4
    /// `ScanRelevantVariables`), deduplicated.
    fn relevant_variables(&self) -> Vec<VarId> {
        let mut vars = Vec::new();
        for &g in self.evaluator.violated_constraints() {
            vars.extend(self.evaluator.constraint_to_vars(g));
        }
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    /// Best candidate delta for `var`: each domain interval's endpoints plus,
    /// per linear row touching `var`, the breakpoint where that row's
    /// contribution stops improving and starts worsening (§4.B.1 "find the
    /// minimum ... by scanning each interval of D(v)"). The per-variable
    /// weighted violation is a sum of V-shaped (clipped distance-to-interval)
    /// terms, so its minimum generally sits at one of these interior
    /// breakpoints, not at a domain endpoint -- endpoint-only scanning can
    /// miss the only improving move entirely.
    fn compute_jump(&self, var: VarId) -> (i64, f64) {
        let dom = &self.domains[var.index()];
        let current = self.solution[var.index()];
        let mut best_delta = 0i64;
        let mut best_score = 0.0f64;

        let mut try_candidate = |delta: i64, best_delta: &mut i64, best_score: &mut f64| {
            if delta == 0 {
                return;
            }
            let score = self.evaluator.weighted_violation_delta(var, delta, &self.solution);
            if score < *best_score || (score == *best_score && *best_delta == 0) {
                *best_score = score;
                *best_delta = delta;
            }
        };

        for i in 0..dom.num_intervals() {
            let (lo, hi) = dom.interval(i);
            try_candidate(lo - current, &mut best_delta, &mut best_score);
            try_candidate(hi - current, &mut best_delta, &mut best_score);
        }
        for raw_delta in self.evaluator.linear_breakpoint_deltas(var) {
            let candidate = dom.value_at_or_before((current + raw_delta).clamp(dom.min(), dom.max()));
            try_candidate(candidate - current, &mut best_delta, &mut best_score);
        }
        (best_delta, best_score)
    }

    fn ensure_jump(&mut self, var: VarId) -> (i64, f64) {
        if self.jump_table.needs_recomputation(var.index()) {
            let jump = self.compute_jump(var);
            self.jump_table.set_jump(var.index(), jump.0, jump.1);
        }
        (self.jump_table.deltas()[var.index()], self.jump_table.score(var.index()))
    }

    /// Commit `solution[var] += delta`, propagate scores, and invalidate the
    /// jump cache of every touched variable (§4.B.4 step 3).
    fn perform_move(&mut self, var: VarId, delta: i64) {
        let old_value = self.solution[var.index()];
        let new_value = old_value + delta;
        self.solution[var.index()] = new_value;
        let jump_deltas = self.jump_table.deltas().to_vec();
        let mut jump_scores = self.jump_table.scores().to_vec();
        let touched =
            self.evaluator
                .commit_move(var, old_value, new_value, &jump_deltas, &mut jump_scores, &self.solution);
        self.jump_table.scores_mut().copy_from_slice(&jump_scores);
        for v in touched {
            self.jump_table.recompute(v.index());
        }
        self.polarity.note_value_changed(var.index());
        self.counters.num_moves += 1;
    }

    /// Bump the weight of every currently violated constraint, decay
    /// `bump_value`, and rescale below [`MAX_WEIGHT`] if needed (§4.B.3
    /// `UpdateViolatedConstraintWeights`).
    fn update_violated_constraint_weights(&mut self) -> Result<()> {
        let violated: Vec<usize> = self.evaluator.violated_constraints().iter().copied().collect();
        let weights = self.evaluator.weights_mut();
        let mut max_weight = 0.0f64;
        for &g in &violated {
            weights[g] += self.bump_value;
            max_weight = max_weight.max(weights[g]);
        }
        if max_weight > MAX_WEIGHT {
            if max_weight.is_infinite() || max_weight.is_nan() {
                return Err(SolverError::WeightOverflow {
                    context: "violated-constraint weight diverged to a non-finite value".to_string(),
                });
            }
            let scale = MAX_WEIGHT / max_weight;
            for w in weights.iter_mut() {
                *w *= scale;
            }
            self.bump_value *= scale;
            log::debug!("ls: rescaled weights by {scale:.3e} after crossing MAX_WEIGHT");
        }
        if self.options.use_decay {
            self.bump_value /= self.params.decay;
        }
        self.jump_table.recompute_all(self.solution.len());
        self.counters.num_weight_updates += 1;
        Ok(())
    }

    /// Whether a Luby-scheduled restart is due (§4.B.5, §8 property 9).
    fn restart_due(&self, restart_len: i64) -> bool {
        self.options.use_restart && self.steps_since_improvement >= restart_len
    }

    /// Run up to `max_steps` scan/move iterations (one "batch",
    /// dtime-budgeted in the source; step-budgeted here since this crate has
    /// no deterministic-time oracle -- see `DESIGN.md`). Returns `Ok(true)`
    /// once a fully feasible solution is found.
    ///
    /// When `options.use_compound_moves` is set, every committed move is
    /// pushed onto [`CompoundMoveBuilder`]; a local minimum backtracks the
    /// most recent push instead of bumping weights outright, up to
    /// `discrepancy_ceiling`, which itself escalates (capped at
    /// `compound_move_max_discrepancy_ceiling`) each time the stack survives
    /// to a weight bump (§4.B.4 steps 3-5).
    pub fn run_batch(&mut self, max_steps: u64, shared_luby: &mut LubyCounter) -> Result<bool> {
        self.counters.num_batches += 1;
        // Only restart-using states consume the shared Luby sequence (§4.B.5);
        // others keep an unreachable restart_len so `restart_due` never fires.
        let mut restart_len = if self.options.use_restart {
            shared_luby.next_restart_length(self.params.restart_factor)
        } else {
            i64::MAX
        };
        for _ in 0..max_steps {
            if self.sum_of_violations() == 0 {
                return Ok(true);
            }
            let relevant = self.relevant_variables();
            if relevant.is_empty() {
                return Ok(true);
            }
            let sample_size = self.params.num_to_scan.min(relevant.len());
            let mut candidates: Vec<VarId> = relevant;
            for i in 0..sample_size {
                let j = self.rng.gen_range(i..candidates.len());
                candidates.swap(i, j);
            }
            candidates.truncate(sample_size);

            let mut best_var = None;
            let mut best_delta = 0i64;
            let mut best_score = 0.0f64;
            for &var in &candidates {
                let (delta, score) = self.ensure_jump(var);
                if delta != 0 && (best_var.is_none() || score < best_score) {
                    best_var = Some(var);
                    best_delta = delta;
                    best_score = score;
                }
            }

            match best_var {
                Some(var) if best_score < 0.0 => {
                    let prev_value = self.solution[var.index()];
                    self.perform_move(var, best_delta);
                    if self.options.use_compound_moves && !self.compound.on_stack(var) {
                        self.compound.push(var, prev_value, best_score);
                    }
                    let violation = self.evaluator.weighted_violation();
                    if violation < self.best_weighted_violation {
                        self.best_weighted_violation = violation;
                        self.steps_since_improvement = 0;
                        // A new incumbent resolves whatever compound excursion
                        // was in flight (§4.B.4 step 3): it is committed, not
                        // backtracked, so the stack is simply dropped.
                        self.compound.clear();
                        self.discrepancy_ceiling = 1;
                        if self.options.use_restart {
                            shared_luby.reset();
                            restart_len = shared_luby.next_restart_length(self.params.restart_factor);
                        }
                    } else {
                        self.steps_since_improvement += 1;
                    }
                }
                _ if self.options.use_compound_moves
                    && self.compound.size() > 0
                    && self.compound.discrepancy() < self.discrepancy_ceiling =>
                {
                    // No improving unit move: unwind the most recent
                    // compound-move step and let the next iteration retry
                    // from there, bounded by `discrepancy_ceiling` (§4.B.4
                    // step 4), instead of immediately bumping weights.
                    if let Some((var, prev_value, _)) = self.compound.backtrack() {
                        let current = self.solution[var.index()];
                        self.perform_move(var, prev_value - current);
                    }
                    self.steps_since_improvement += 1;
                }
                _ => {
                    self.update_violated_constraint_weights()?;
                    if self.options.use_compound_moves && self.compound.size() > 0 {
                        // §4.B.4 step 5: raise the discrepancy ceiling up to
                        // its configured maximum before giving up on the
                        // compound excursion entirely.
                        if self.discrepancy_ceiling >= self.params.compound_move_max_discrepancy_ceiling {
                            debug_assert!(self.compound.stack_values_in_domains(&self.domains));
                            self.compound.clear();
                            self.discrepancy_ceiling = 1;
                        } else {
                            self.discrepancy_ceiling += 1;
                        }
                    }
                    self.steps_since_improvement += 1;
                }
            }

            if self.restart_due(restart_len) {
                self.counters.num_restarts += 1;
                log::debug!(
                    "ls: restart #{} after {} steps without improvement",
                    self.counters.num_restarts,
                    self.steps_since_improvement
                );
                self.perturbate_current_solution();
                if self.options.use_restart {
                    restart_len = shared_luby.next_restart_length(self.params.restart_factor);
                }
            }

            self.polarity.note_conflict();
        }
        Ok(self.sum_of_violations() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ls::linear_evaluator::LinearIncrementalEvaluator;

    fn v(i: usize) -> VarId {
        VarId::from_index(i)
    }

    #[test]
    fn solves_a_trivial_linear_equation() {
        // 2x + 3y = 4, x,y in [0,2]: (2,0) is feasible.
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 2);
        linear.add_term(c, v(1), 3);
        linear.finalize(&[2, 2]);
        let evaluator = LsEvaluator::new(linear, vec![], 2);

        let domains = vec![IntDomain::new(0, 2), IntDomain::new(0, 2)];
        let params = LsParams { random_seed: 42, ..LsParams::default() };
        let mut state = LsState::new(domains, evaluator, params);
        let mut shared_luby = LubyCounter::new();

        let mut solved = false;
        for _ in 0..50 {
            if state.run_batch(200, &mut shared_luby).unwrap() {
                solved = true;
                break;
            }
        }
        assert!(solved, "expected feasibility-jump to find 2x+3y=4 within the step budget");
        assert_eq!(state.sum_of_violations(), 0);
    }

    #[test]
    fn escapes_a_wide_domain_whose_endpoints_both_worsen_the_violation() {
        // x in [4,4], x in [0,10]: both domain endpoints make the single
        // term's violation worse than the starting point, so only the
        // interior breakpoint (x=4) is improving.
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 1);
        linear.finalize(&[10]);
        let evaluator = LsEvaluator::new(linear, vec![], 1);

        let domains = vec![IntDomain::new(0, 10)];
        let params = LsParams { random_seed: 1, ..LsParams::default() };
        let mut state = LsState::new(domains, evaluator, params);
        let mut shared_luby = LubyCounter::new();

        let mut solved = false;
        for _ in 0..10 {
            if state.run_batch(50, &mut shared_luby).unwrap() {
                solved = true;
                break;
            }
        }
        assert!(solved, "expected the breakpoint candidate to reach x=4");
        assert_eq!(state.solution()[0], 4);
    }

    #[test]
    fn logs_weight_bumps_and_restarts_under_a_real_subscriber() {
        // Initializes `env_logger` so the `log::debug!` calls in
        // `update_violated_constraint_weights`/`run_batch` run through a real
        // subscriber instead of the no-op default, matching what a developer
        // sees running `cargo test -- --nocapture` with `RUST_LOG=debug`.
        let _ = env_logger::builder().is_test(true).try_init();

        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 2);
        linear.add_term(c, v(1), 3);
        linear.finalize(&[2, 2]);
        let evaluator = LsEvaluator::new(linear, vec![], 2);

        let domains = vec![IntDomain::new(0, 2), IntDomain::new(0, 2)];
        let params = LsParams { random_seed: 42, ..LsParams::default() };
        let mut state = LsState::new(domains, evaluator, params);
        let mut shared_luby = LubyCounter::new();

        let mut solved = false;
        for _ in 0..50 {
            if state.run_batch(200, &mut shared_luby).unwrap() {
                solved = true;
                break;
            }
        }
        assert!(solved);
        assert_eq!(state.sum_of_violations(), 0);
    }

    #[test]
    fn compound_moves_disabled_still_solves_the_same_trivial_equation() {
        // Same problem as `solves_a_trivial_linear_equation` but with the
        // compound-move machinery turned off, confirming it is additive to
        // plain unit-move search rather than load-bearing for it.
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 2);
        linear.add_term(c, v(1), 3);
        linear.finalize(&[2, 2]);
        let evaluator = LsEvaluator::new(linear, vec![], 2);

        let domains = vec![IntDomain::new(0, 2), IntDomain::new(0, 2)];
        let params = LsParams { random_seed: 42, ..LsParams::default() };
        let mut state = LsState::new(domains, evaluator, params);
        state.options.use_compound_moves = false;
        let mut shared_luby = LubyCounter::new();

        let mut solved = false;
        for _ in 0..50 {
            if state.run_batch(200, &mut shared_luby).unwrap() {
                solved = true;
                break;
            }
        }
        assert!(solved, "expected feasibility-jump to still converge with compound moves off");
        assert_eq!(state.sum_of_violations(), 0);
    }

    #[test]
    fn compound_backtrack_restores_solution_and_stack_via_perform_move() {
        // Exercises the exact push/backtrack/perform_move pattern `run_batch`
        // uses on a local minimum: pushing a committed move onto the
        // compound stack, then unwinding it back to the prior value.
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, v(0), 2);
        linear.finalize(&[4]);
        let evaluator = LsEvaluator::new(linear, vec![], 1);
        let domains = vec![IntDomain::new(0, 4)];
        let mut state = LsState::new(domains, evaluator, LsParams::default());

        let before_value = state.solution()[0];
        let before_violation = state.evaluator.weighted_violation();
        state.perform_move(v(0), 2); // x: 0 -> 2, activity 4, now feasible.
        let score = state.evaluator.weighted_violation() - before_violation;
        state.compound.push(v(0), before_value, score);
        assert_eq!(state.compound.size(), 1);
        assert!(state.compound.on_stack(v(0)));

        let (var, prev_value, popped_score) = state.compound.backtrack().unwrap();
        assert_eq!(popped_score, score);
        let current = state.solution()[var.index()];
        state.perform_move(var, prev_value - current);

        assert_eq!(state.solution()[0], before_value);
        assert_eq!(state.compound.size(), 0);
        assert!(!state.compound.on_stack(v(0)));
    }

    #[test]
    fn options_randomize_stays_deterministic_for_a_fixed_seed() {
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let mut a = LsOptions::all_enabled();
        let mut b = LsOptions::all_enabled();
        a.randomize(&mut rng_a);
        b.randomize(&mut rng_b);
        assert_eq!(a.use_restart, b.use_restart);
        assert_eq!(a.use_decay, b.use_decay);
        assert_eq!(a.use_compound_moves, b.use_compound_moves);
    }
}
