//! Per-variable, per-value reversible support lists (§3.2, §4.A.4).
//!
//! For every `(column, value_index)` pair this keeps the immutable topology
//! — which tuples use that value in that column — alongside a reversible
//! "still alive" mask over that topology, plus a reversible `active_values`
//! set tracking which value-indices in a column still have at least one
//! alive tuple.
//!
//! The spec's §6.2 `SparseRevSet` (a single externally-shared sparse/dense
//! array backing many per-value sets) is collapsed here into one
//! [`RevIntSet`] per `(column, value_index)` pair — see DESIGN.md's Open
//! Question log. Each stays independently O(1) reversible; only the memory
//! layout differs from the shared-array variant.

use crate::core::{RevIntSet, Trail};
use crate::table::tuple_table::TupleTable;

/// Per-variable per-value reversible tuple supports, built once from a
/// [`TupleTable`] and then maintained by a propagator across domain changes.
#[derive(Clone, Debug)]
pub struct PerVariableSupport {
    /// `tuples_for_value[col][value_index]` = the tuple ids using that value,
    /// in the fixed order assigned at construction (immutable topology).
    tuples_for_value: Vec<Vec<Vec<u32>>>,
    /// `alive[col][value_index]` mirrors `tuples_for_value[col][value_index]`
    /// by local position: a reversible mask of which entries are still
    /// "alive" (not yet cascaded away by some other variable's removal).
    alive: Vec<Vec<RevIntSet>>,
    /// `local_pos[col][tuple_id]` = the position of `tuple_id` within
    /// `tuples_for_value[col][tuple_value_index(tuple_id, col)]`, for O(1)
    /// removal by tuple id.
    local_pos: Vec<Vec<u32>>,
    /// `active_values[col]` = reversible subset of `[0, num_value_indices(col))`
    /// still consistent (support non-empty).
    active_values: Vec<RevIntSet>,
}

impl PerVariableSupport {
    /// Build the topology and initial (fully alive) reversible state from `table`.
    pub fn build(table: &TupleTable) -> Self {
        let arity = table.arity();
        let mut tuples_for_value: Vec<Vec<Vec<u32>>> = (0..arity)
            .map(|c| vec![Vec::new(); table.num_value_indices(c)])
            .collect();
        let mut local_pos: Vec<Vec<u32>> = (0..arity)
            .map(|_| vec![0u32; table.num_tuples()])
            .collect();

        for t in 0..table.num_tuples() as u32 {
            for c in 0..arity {
                let vi = table.tuple_value_index(t, c);
                let list = &mut tuples_for_value[c][vi as usize];
                local_pos[c][t as usize] = list.len() as u32;
                list.push(t);
            }
        }

        let alive: Vec<Vec<RevIntSet>> = tuples_for_value
            .iter()
            .map(|per_value| per_value.iter().map(|l| RevIntSet::full(l.len())).collect())
            .collect();

        let active_values: Vec<RevIntSet> =
            (0..arity).map(|c| RevIntSet::full(table.num_value_indices(c))).collect();

        PerVariableSupport { tuples_for_value, alive, local_pos, active_values }
    }

    /// Number of tuples still supporting `(col, value_index)`.
    pub fn support_size(&self, col: usize, value_index: u32) -> usize {
        self.alive[col][value_index as usize].size()
    }

    /// Whether `value_index` in `col` is still considered consistent.
    pub fn is_active(&self, col: usize, value_index: u32) -> bool {
        self.active_values[col].contains(value_index)
    }

    /// Currently-active value-indices in `col`.
    pub fn active_value_indices(&self, col: usize) -> impl Iterator<Item = u32> + '_ {
        self.active_values[col].iter()
    }

    /// The tuple ids still alive in `(col, value_index)`'s support list.
    pub fn alive_tuples(&self, col: usize, value_index: u32) -> Vec<u32> {
        let topology = &self.tuples_for_value[col][value_index as usize];
        self.alive[col][value_index as usize]
            .iter()
            .map(|pos| topology[pos as usize])
            .collect()
    }

    /// Remove `tuple_id` from `(col, value_index)`'s support. Returns `true`
    /// if this was the last remaining support (the value should now be
    /// pruned and deactivated by the caller).
    pub fn remove_tuple(&self, col: usize, value_index: u32, tuple_id: u32, trail: &mut Trail) -> bool {
        let pos = self.local_pos[col][tuple_id as usize];
        let set = &self.alive[col][value_index as usize];
        if set.remove(pos, trail) {
            set.is_empty()
        } else {
            false
        }
    }

    /// Remove `value_index` from `col`'s active-values set (its support has
    /// dropped to zero, or the value is simply no longer in the domain).
    pub fn deactivate_value(&self, col: usize, value_index: u32, trail: &mut Trail) {
        self.active_values[col].remove(value_index, trail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tuple_table::VecTupleSet;

    #[test]
    fn build_indexes_every_tuple_once_per_column() {
        let set = VecTupleSet::new(vec![vec![1, 1], vec![1, 2], vec![2, 2]]);
        let table = TupleTable::build(&set);
        let support = PerVariableSupport::build(&table);

        let v1 = table.value_index(0, 1).unwrap();
        let v2 = table.value_index(0, 2).unwrap();
        assert_eq!(support.support_size(0, v1), 2); // tuples 0,1
        assert_eq!(support.support_size(0, v2), 1); // tuple 2
    }

    #[test]
    fn remove_tuple_shrinks_support_and_reports_emptiness() {
        let mut trail = Trail::new();
        let set = VecTupleSet::new(vec![vec![1, 1], vec![2, 2]]);
        let table = TupleTable::build(&set);
        let support = PerVariableSupport::build(&table);
        let v1 = table.value_index(0, 1).unwrap();

        trail.push_checkpoint();
        assert!(support.remove_tuple(0, v1, 0, &mut trail)); // last one -> now empty
        assert_eq!(support.support_size(0, v1), 0);
        trail.pop_checkpoint();
        assert_eq!(support.support_size(0, v1), 1);
    }
}
