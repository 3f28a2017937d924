//! Flattened feasibility-jump parameters (§6.6).

/// Which constraints get relaxed into linear rows during model compilation.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum LinearizationLevel {
    /// Only already-linear constraints feed the linear evaluator.
    None,
    /// Linear constraints plus simple linear relaxations of a few non-linear kinds.
    #[default]
    Default,
    /// Aggressively linearize everything that has a sound linear lower bound.
    Aggressive,
}

/// Recognized local-search parameters (§6.6), with the source's defaults.
#[derive(Clone, Debug)]
pub struct LsParams {
    /// §6.6 `feasibility_jump_linearization_level` (default 2 / [`LinearizationLevel::Aggressive`]).
    pub linearization_level: LinearizationLevel,
    /// Deterministic-time budget for one batch, in arbitrary dtime units (default 0.1).
    pub batch_dtime: f64,
    /// Multiplicative decay applied to `bump_value` before each weight bump (default 0.95).
    pub decay: f64,
    /// Multiplier on the Luby term to get `num_batches_before_change` (default 10).
    pub restart_factor: u32,
    /// Per-variable probability of perturbation on a non-restart reset (default 0.1).
    pub var_randomization_probability: f64,
    /// Fraction of the domain width used as the perturbation range (default 0.2).
    pub var_perturbation_range_ratio: f64,
    /// Above this expanded-pair count, switch to a profile formulation (default 1000).
    pub max_expanded_constraint_size: usize,
    /// Conflicts between polarity-rephase transitions (default 1000).
    pub polarity_rephase_increment: u64,
    /// Perturbation period used by the host's outer violation-LS loop (default 100).
    pub violation_ls_perturbation_period: u64,
    /// Seed for every state's deterministic RNG.
    pub random_seed: u64,
    /// Number of candidates sampled per jump-selection step (§4.B.4, typically 3-5).
    pub num_to_scan: usize,
    /// Ceiling backtrack count in compound-move search before a weight bump (§4.B.4).
    pub compound_move_max_discrepancy_ceiling: i32,
}

impl Default for LsParams {
    fn default() -> Self {
        LsParams {
            linearization_level: LinearizationLevel::Aggressive,
            batch_dtime: 0.1,
            decay: 0.95,
            restart_factor: 10,
            var_randomization_probability: 0.1,
            var_perturbation_range_ratio: 0.2,
            max_expanded_constraint_size: 1000,
            polarity_rephase_increment: 1000,
            violation_ls_perturbation_period: 100,
            random_seed: 0,
            num_to_scan: 5,
            compound_move_max_discrepancy_ceiling: 2,
        }
    }
}
