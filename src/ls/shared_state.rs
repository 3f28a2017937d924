//! Round-robin pool of [`LsState`]s shared across worker threads
//! (§4.B.5 `SharedLsStates`).

use crate::ls::luby::LubyCounter;
use crate::ls::solver::{LsCounters, LsState};
use parking_lot::Mutex;

struct Slot {
    state: Mutex<LsState>,
    taken: std::sync::atomic::AtomicBool,
    /// Every 16th state never restarts, to keep at least one worker doing
    /// pure hill-climbing even when restarts help on average (§4.B.5).
    forced_no_restart: bool,
}

/// Owns every [`LsState`] in the pool plus the one Luby counter every
/// restarting state shares, so restarts across workers stay desynchronized
/// in a reproducible, seed-driven way (§4.B.5).
pub struct SharedLsStates {
    slots: Vec<Slot>,
    luby: Mutex<LubyCounter>,
}

impl std::fmt::Debug for SharedLsStates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLsStates").field("num_states", &self.slots.len()).finish()
    }
}

impl SharedLsStates {
    /// Wrap an already-constructed list of states as a shared pool. The
    /// `i`-th state (0-indexed) is forced to never restart when
    /// `i % 16 == 0` (§4.B.5).
    pub fn new(states: Vec<LsState>) -> Self {
        let slots = states
            .into_iter()
            .enumerate()
            .map(|(i, mut state)| {
                let forced_no_restart = i % 16 == 0;
                if forced_no_restart {
                    state.force_no_restart();
                }
                Slot { state: Mutex::new(state), taken: std::sync::atomic::AtomicBool::new(false), forced_no_restart }
            })
            .collect();
        SharedLsStates { slots, luby: Mutex::new(LubyCounter::new()) }
    }

    /// Number of states in the pool.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reserve the next free state (round-robin, wrapping), returning its
    /// index; `None` if every state is currently taken (§4.B.5 `GetNextState`).
    pub fn get_next_state(&self) -> Option<usize> {
        for i in 0..self.slots.len() {
            if !self.slots[i].taken.swap(true, std::sync::atomic::Ordering::AcqRel) {
                return Some(i);
            }
        }
        None
    }

    /// Reserve a brand-new state at `index`, identical to [`Self::get_next_state`]
    /// but for a caller that already knows which slot it wants (e.g. restoring
    /// a checkpoint) (§4.B.5 `CreateNewState`).
    pub fn create_new_state(&self, index: usize) -> bool {
        !self.slots[index].taken.swap(true, std::sync::atomic::Ordering::AcqRel)
    }

    /// Run `f` against the reserved state at `index`, bumping `bump_value`
    /// decay and restart scheduling against the shared Luby counter.
    ///
    /// Every state shares the same Luby counter here: a forced-no-restart
    /// state's `options.use_restart` is pinned to `false` (see
    /// [`Self::new`]/[`Self::release`]), so `LsState::run_batch` never
    /// advances or consults it for that slot regardless of which counter is
    /// passed in.
    pub fn run_batch(&self, index: usize, max_steps: u64) -> crate::core::error::Result<bool> {
        let mut state = self.slots[index].state.lock();
        let mut luby = self.luby.lock();
        state.run_batch(max_steps, &mut luby)
    }

    /// Release a reserved state back to the pool, re-randomizing its
    /// [`crate::ls::solver::LsOptions`] for the next borrower (§4.B.5 `Release`).
    /// A forced-no-restart slot has its randomized `use_restart` immediately
    /// re-pinned to `false` (§4.B.5).
    pub fn release(&self, index: usize) {
        let mut state = self.slots[index].state.lock();
        state.randomize_options();
        if self.slots[index].forced_no_restart {
            state.force_no_restart();
        }
        drop(state);
        self.slots[index].taken.store(false, std::sync::atomic::Ordering::Release);
    }

    /// Reset the shared Luby counter (e.g. when a new global incumbent is found).
    pub fn reset_luby_counter(&self) {
        self.luby.lock().reset();
    }

    /// Current solution of the state at `index` (caller must hold no other
    /// lock on it).
    pub fn solution(&self, index: usize) -> Vec<i64> {
        self.slots[index].state.lock().solution().to_vec()
    }

    /// Aggregate per-state counters into one total, for reporting (§4.B.5
    /// `CollectStatistics`).
    pub fn collect_statistics(&self) -> LsCounters {
        let mut total = LsCounters::default();
        for slot in &self.slots {
            let counters = slot.state.lock().counters();
            total.num_batches += counters.num_batches;
            total.num_moves += counters.num_moves;
            total.num_weight_updates += counters.num_weight_updates;
            total.num_restarts += counters.num_restarts;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ls::evaluator::LsEvaluator;
    use crate::ls::linear_evaluator::{IntDomain, LinearIncrementalEvaluator};
    use crate::ls::params::LsParams;
    use crate::variables::VarId;

    fn make_state(seed: u64) -> LsState {
        let mut linear = LinearIncrementalEvaluator::new();
        let c = linear.new_constraint(IntDomain::fixed(4));
        linear.add_term(c, VarId::from_index(0), 2);
        linear.add_term(c, VarId::from_index(1), 3);
        linear.finalize(&[2, 2]);
        let evaluator = LsEvaluator::new(linear, vec![], 2);
        let domains = vec![IntDomain::new(0, 2), IntDomain::new(0, 2)];
        let params = LsParams { random_seed: seed, ..LsParams::default() };
        LsState::new(domains, evaluator, params)
    }

    #[test]
    fn get_next_state_round_robins_and_release_frees_a_slot() {
        let pool = SharedLsStates::new(vec![make_state(1), make_state(2)]);
        let a = pool.get_next_state().unwrap();
        let b = pool.get_next_state().unwrap();
        assert_ne!(a, b);
        assert!(pool.get_next_state().is_none());
        pool.release(a);
        assert_eq!(pool.get_next_state(), Some(a));
    }

    #[test]
    fn every_sixteenth_state_is_forced_no_restart() {
        let states: Vec<LsState> = (0..17).map(|i| make_state(i as u64)).collect();
        let pool = SharedLsStates::new(states);
        assert!(pool.slots[0].forced_no_restart);
        assert!(!pool.slots[0].state.lock().use_restart());
        assert!(!pool.slots[1].forced_no_restart);
        assert!(pool.slots[16].forced_no_restart);
        assert!(!pool.slots[16].state.lock().use_restart());
    }

    #[test]
    fn forced_no_restart_survives_randomize_options_on_release() {
        let pool = SharedLsStates::new(vec![make_state(3)]);
        assert!(pool.slots[0].forced_no_restart);
        let idx = pool.get_next_state().unwrap();
        // `release` re-randomizes `LsOptions`, which could otherwise roll
        // `use_restart` back to true; it must stay pinned for a forced slot.
        for _ in 0..20 {
            pool.release(idx);
            pool.get_next_state();
            assert!(!pool.slots[idx].state.lock().use_restart());
        }
    }

    #[test]
    fn run_batch_through_pool_can_reach_feasibility() {
        let pool = SharedLsStates::new(vec![make_state(42)]);
        let idx = pool.get_next_state().unwrap();
        let mut solved = false;
        for _ in 0..50 {
            if pool.run_batch(idx, 200).unwrap() {
                solved = true;
                break;
            }
        }
        assert!(solved);
    }
}
