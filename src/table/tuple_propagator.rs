//! AC-4 table propagator over an indexed [`TupleTable`] (§4.A.5, spec's A1).
//!
//! Maintains generalized arc consistency: initial propagation drops domain
//! values absent from the table, then each call to
//! [`TuplePropagator::filter_on_domain_change`] reacts to one variable's
//! domain shrinking by cascading the now-dead tuples' effect onto every
//! other variable's supports, choosing between the incremental-delete and
//! reset enumeration strategies per §4.A.5's `R` vs `K` heuristic (see
//! DESIGN.md's Open Question log for how "reset" is simplified here).

use std::collections::HashSet;

use crate::core::{SolverError, Trail};
use crate::table::support::PerVariableSupport;
use crate::table::tuple_table::{IntTupleSet, TupleTable};
use crate::variables::{Domain, IntVar};

/// An AC-4 table propagator posted over a fixed list of variables.
#[derive(Clone, Debug)]
pub struct TuplePropagator {
    table: TupleTable,
    support: PerVariableSupport,
}

impl TuplePropagator {
    /// Build the propagator's table and support structures. Does not touch
    /// any variable domain yet — call [`Self::initial_propagate`] after
    /// posting.
    pub fn new(tuples: &dyn IntTupleSet) -> Self {
        let table = TupleTable::build(tuples);
        let support = PerVariableSupport::build(&table);
        TuplePropagator { table, support }
    }

    /// Number of columns == number of variables this propagator expects.
    pub fn arity(&self) -> usize {
        self.table.arity()
    }

    /// §4.A.5 `initial_propagate`: drop domain values absent from the table,
    /// then establish the baseline bounds used by the first
    /// `filter_on_domain_change` round.
    pub fn initial_propagate(&self, vars: &mut [Domain], trail: &mut Trail) -> Result<(), SolverError> {
        for c in 0..self.arity() {
            let values: Vec<i64> = vars[c].domain_iterator(false).collect();
            for v in values {
                if self.table.value_index(c, v).is_none() {
                    vars[c].remove_value(v, trail);
                }
            }
            if vars[c].size() == 0 {
                return Err(SolverError::PropagationFailure { constraint: "table" });
            }
        }
        // A value present in the table always has >=1 alive tuple right
        // after construction, so no further emptiness check is needed here.
        for c in 0..self.arity() {
            vars[c].mark_consistent();
        }
        Ok(())
    }

    /// §4.A.5: the value-indices removed from `vars[c]` since the last
    /// `mark_consistent` call, derived from the domain's own
    /// `old_min`/`old_max`/`contains` (values outside `[old_min, old_max]`
    /// cannot have been removed *this* round by definition).
    fn removed_value_indices(&self, c: usize, vars: &[Domain]) -> Vec<u32> {
        let lo = vars[c].old_min();
        let hi = vars[c].old_max();
        (lo..=hi)
            .filter(|&v| !vars[c].contains(v))
            .filter_map(|v| self.table.value_index(c, v))
            .collect()
    }

    /// §4.A.5 `filter_on_domain_change`. Must be called once per variable
    /// whose domain changed (typically every sweep of the caller's fixpoint
    /// loop); a no-op if nothing changed since the last call.
    pub fn filter_on_domain_change(
        &self,
        c: usize,
        vars: &mut [Domain],
        trail: &mut Trail,
    ) -> Result<(), SolverError> {
        let delta = self.removed_value_indices(c, vars);
        if delta.is_empty() {
            return Ok(());
        }

        let r: usize = delta.iter().map(|&vi| self.support.support_size(c, vi)).sum();
        let k: usize = self
            .support
            .active_value_indices(c)
            .map(|vi| self.support.support_size(c, vi))
            .sum();

        let dead_tuples: Vec<u32> = if r < k {
            log::trace!("table: incremental delete for var {c} (R={r} < K={k})");
            delta.iter().flat_map(|&vi| self.support.alive_tuples(c, vi)).collect()
        } else {
            log::trace!("table: reset mode for var {c} (R={r} >= K={k})");
            let kept: HashSet<u32> = self
                .support
                .active_value_indices(c)
                .flat_map(|vi| self.support.alive_tuples(c, vi))
                .collect();
            delta
                .iter()
                .flat_map(|&vi| self.support.alive_tuples(c, vi))
                .filter(|t| !kept.contains(t))
                .collect()
        };

        for &vi in &delta {
            self.support.deactivate_value(c, vi, trail);
        }

        for t in dead_tuples {
            for other in 0..self.arity() {
                if other == c {
                    continue;
                }
                let ovi = self.table.tuple_value_index(t, other);
                if !self.support.is_active(other, ovi) {
                    continue;
                }
                if self.support.remove_tuple(other, ovi, t, trail) {
                    self.support.deactivate_value(other, ovi, trail);
                    let val = self.table.value_of(other, ovi);
                    vars[other].remove_value(val, trail);
                    if vars[other].size() == 0 {
                        return Err(SolverError::PropagationFailure { constraint: "table" });
                    }
                }
            }
        }
        Ok(())
    }

    /// Convenience driver for hosts without their own propagation queue:
    /// runs `initial_propagate` then sweeps `filter_on_domain_change` over
    /// every variable until a fixpoint (no variable's domain shrank in the
    /// last full sweep).
    pub fn propagate_to_fixpoint(&self, vars: &mut [Domain], trail: &mut Trail) -> Result<(), SolverError> {
        self.initial_propagate(vars, trail)?;
        loop {
            let mut changed = false;
            for c in 0..self.arity() {
                let before = vars[c].size();
                self.filter_on_domain_change(c, vars, trail)?;
                if vars[c].size() != before {
                    changed = true;
                }
                vars[c].mark_consistent();
            }
            if !changed {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tuple_table::VecTupleSet;

    fn e1_tuples() -> VecTupleSet {
        VecTupleSet::new(vec![
            vec![1, 1, 1],
            vec![1, 2, 3],
            vec![2, 2, 2],
            vec![3, 3, 1],
        ])
    }

    #[test]
    fn e1_end_to_end_scenario() {
        let set = e1_tuples();
        let prop = TuplePropagator::new(&set);
        let mut trail = Trail::new();
        let mut vars = vec![Domain::new(1, 3), Domain::new(1, 3), Domain::new(1, 3)];

        trail.push_checkpoint();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        assert_eq!(vars[2].domain_iterator(true).collect::<Vec<_>>(), vec![1, 2, 3]);

        trail.push_checkpoint();
        vars[0].remove_value(2, &mut trail);
        vars[0].remove_value(3, &mut trail);
        vars[0].mark_consistent();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        assert_eq!(vars[1].domain_iterator(true).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(vars[2].domain_iterator(true).collect::<Vec<_>>(), vec![1, 3]);

        trail.push_checkpoint();
        vars[1].remove_value(1, &mut trail);
        vars[1].mark_consistent();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        assert_eq!(vars[2].domain_iterator(true).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn initial_propagation_establishes_gac() {
        // property 1: every remaining domain value has a supporting tuple.
        let set = e1_tuples();
        let prop = TuplePropagator::new(&set);
        let mut trail = Trail::new();
        let mut vars = vec![Domain::new(1, 3), Domain::new(1, 3), Domain::new(0, 5)];
        trail.push_checkpoint();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        // value 0,4,5 of z are not in any tuple -> pruned.
        assert_eq!(vars[2].domain_iterator(true).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn idempotent_second_filter_prunes_nothing() {
        let set = e1_tuples();
        let prop = TuplePropagator::new(&set);
        let mut trail = Trail::new();
        let mut vars = vec![Domain::new(1, 3), Domain::new(1, 3), Domain::new(1, 3)];
        trail.push_checkpoint();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        let before: Vec<_> = vars.iter().map(|d| d.size()).collect();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        let after: Vec<_> = vars.iter().map(|d| d.size()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reversibility_restores_support_state_exactly() {
        let set = e1_tuples();
        let prop = TuplePropagator::new(&set);
        let mut trail = Trail::new();
        let mut vars = vec![Domain::new(1, 3), Domain::new(1, 3), Domain::new(1, 3)];
        trail.push_checkpoint();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();

        trail.push_checkpoint();
        vars[0].remove_value(1, &mut trail);
        vars[0].mark_consistent();
        prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
        assert!(vars[2].size() < 3);

        trail.pop_checkpoint();
        assert_eq!(vars[2].domain_iterator(true).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn infeasible_table_fails_initial_propagation() {
        let set = VecTupleSet::new(vec![vec![1, 1]]);
        let prop = TuplePropagator::new(&set);
        let mut trail = Trail::new();
        let mut vars = vec![Domain::new(5, 6), Domain::new(5, 6)];
        trail.push_checkpoint();
        let err = prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap_err();
        assert!(matches!(err, SolverError::PropagationFailure { .. }));
    }
}
