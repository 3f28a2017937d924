//! Bucketted AC-4 (§4.A.5, spec's A3).
//!
//! Unlike [`crate::table::tuple_propagator::TuplePropagator`], which tracks
//! the *entire* support set per value, this propagator tracks a single
//! current support tuple per `(column, value_index)` and re-seeks it lazily
//! via [`BucketTable::next_bucket`] when it is invalidated, skipping whole
//! empty buckets rather than rescanning every tuple.
//!
//! Grounded on `examples/original_source/src/constraint_solver/bucket_table.cc`'s
//! `TableCt`. That source tracks, per support tuple, a doubly-linked list of
//! every value it currently supports (`ListSc`) so invalidation can walk
//! straight to the dependents. This crate instead rescans the other
//! variables' active domains on each removal to find which supports it
//! invalidated — asymptotically worse per removal, but avoids a second
//! trailed linked-list structure; see DESIGN.md.

use crate::core::{Rev, SolverError, Trail};
use crate::table::bucket_table::BucketTable;
use crate::table::tuple_table::IntTupleSet;
use crate::variables::{Domain, IntVar};

/// Variable-ordering heuristic consulted before each `filter_on_domain_change` (§4.A.5).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum BucketOrder {
    #[default]
    None,
    ByDomainSize,
    ByConflictCount,
}

/// Bucket-seek variant (§4.A.5, §9). The conflict counter is only
/// incremented by [`BucketSeekType::Restart`], mirroring the source rather
/// than unifying the four variants.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum BucketSeekType {
    #[default]
    Restart,
    Continue,
    Inverse,
    Original,
}

/// Default bucket size when the caller has no particular tuning in mind.
pub const DEFAULT_BUCKET_SIZE: u32 = 64;

/// The bucketted AC-4 propagator (§4.A.5).
#[derive(Clone, Debug)]
pub struct BucketTablePropagator {
    table: BucketTable,
    /// `support[col][value_index]` = current supporting tuple, or `None`
    /// once that value has been pruned.
    support: Vec<Vec<Rev<Option<u32>>>>,
    order_kind: BucketOrder,
    seek_kind: BucketSeekType,
    order: Vec<usize>,
    conflicts: Vec<u32>,
}

impl BucketTablePropagator {
    /// Build over an explicit tuple set with [`DEFAULT_BUCKET_SIZE`].
    pub fn new(tuples: &dyn IntTupleSet, order: BucketOrder, seek: BucketSeekType) -> Self {
        Self::with_bucket_size(tuples, order, seek, DEFAULT_BUCKET_SIZE)
    }

    /// Build over an explicit tuple set with a caller-chosen bucket size.
    pub fn with_bucket_size(
        tuples: &dyn IntTupleSet,
        order: BucketOrder,
        seek: BucketSeekType,
        bucket_size: u32,
    ) -> Self {
        let table = BucketTable::build(tuples, bucket_size);
        let arity = table.table().arity();
        let support: Vec<Vec<Rev<Option<u32>>>> = (0..arity)
            .map(|c| (0..table.table().num_value_indices(c)).map(|_| Rev::new(None)).collect())
            .collect();
        BucketTablePropagator {
            table,
            support,
            order_kind: order,
            seek_kind: seek,
            order: (0..arity).collect(),
            conflicts: vec![0; arity],
        }
    }

    /// Number of variables this propagator expects.
    pub fn arity(&self) -> usize {
        self.table.table().arity()
    }

    fn get_support(&self, col: usize, vi: u32) -> Option<u32> {
        self.support[col][vi as usize].get()
    }

    fn set_support(&self, col: usize, vi: u32, t: Option<u32>, trail: &mut Trail) {
        self.support[col][vi as usize].set(t, trail);
    }

    fn valid_tuple(&self, t: u32, vars: &[Domain]) -> bool {
        (0..self.arity()).all(|i| {
            let vi = self.table.table().tuple_value_index(t, i);
            vars[i].contains(self.table.table().value_of(i, vi))
        })
    }

    fn seek_support_in_bucket(&self, col: usize, t: u32, vars: &[Domain]) -> Option<u32> {
        let last = self.table.last_tuple_in_bucket_range(self.table.bucket_of(t));
        let mut nt = self.table.next_tuple_with_same_value(col, t);
        while let Some(cand) = nt {
            if cand > last {
                break;
            }
            if self.valid_tuple(cand, vars) {
                return Some(cand);
            }
            nt = self.table.next_tuple_with_same_value(col, cand);
        }
        None
    }

    /// §4.A.5 `SeekBucketForVar`: smallest `next_bucket` reachable from `bk`
    /// across `xvar`'s whole domain, accounting for its own current support.
    fn seek_bucket_for_var(&self, xvar: usize, bk: usize, vars: &[Domain]) -> usize {
        let nil = self.table.num_buckets();
        let mut minbk = nil;
        for val in vars[xvar].domain_iterator(false) {
            let Some(vi) = self.table.table().value_index(xvar, val) else { continue };
            let support_bucket = self
                .get_support(xvar, vi)
                .map(|t| self.table.bucket_of(t))
                .unwrap_or(0);
            let n_bucket = self.table.next_bucket(xvar, vi, bk).unwrap_or(nil);
            let q = support_bucket.max(n_bucket);
            if q == bk {
                return bk;
            }
            if q < minbk {
                minbk = q;
            }
        }
        minbk
    }

    fn seek_bucket(&mut self, y: usize, ibt: u32, bk: usize, vars: &[Domain]) -> Option<usize> {
        if bk >= self.table.num_buckets() {
            return None;
        }
        match self.seek_kind {
            BucketSeekType::Restart => self.seek_bucket_restart(y, ibt, bk, vars),
            BucketSeekType::Continue => self.seek_bucket_continue(y, ibt, bk, vars),
            BucketSeekType::Inverse => self.seek_bucket_inverse(y, ibt, bk, vars),
            BucketSeekType::Original => self.seek_bucket_original(y, ibt, bk, vars),
        }
    }

    fn seek_bucket_restart(&mut self, y: usize, ibt: u32, bk: usize, vars: &[Domain]) -> Option<usize> {
        let nil = self.table.num_buckets();
        let mut nbk = bk;
        let mut j = 0;
        while j < self.arity() {
            let xvar = self.order[j];
            let q = if xvar == y {
                self.table.next_bucket(y, ibt, nbk).unwrap_or(nil)
            } else {
                self.seek_bucket_for_var(xvar, nbk, vars)
            };
            if q == nbk {
                j += 1;
            } else {
                self.conflicts[xvar] += 1;
                if q >= nil {
                    return None;
                }
                nbk = self.table.next_bucket(y, ibt, q)?;
                j = 0;
            }
        }
        Some(nbk)
    }

    fn seek_bucket_continue(&mut self, y: usize, ibt: u32, bk: usize, vars: &[Domain]) -> Option<usize> {
        let nil = self.table.num_buckets();
        let mut nbk = bk;
        let mut j = 0;
        while j < self.arity() {
            let xvar = self.order[j];
            let q = if xvar == y {
                self.table.next_bucket(y, ibt, nbk).unwrap_or(nil)
            } else {
                self.seek_bucket_for_var(xvar, nbk, vars)
            };
            if q > nbk {
                if q >= nil {
                    return None;
                }
                nbk = self.table.next_bucket(y, ibt, q)?;
            }
            j += 1;
        }
        Some(nbk)
    }

    fn seek_bucket_inverse(&mut self, y: usize, ibt: u32, bk: usize, vars: &[Domain]) -> Option<usize> {
        let nil = self.table.num_buckets();
        let mut nbk = bk;
        let mut j = 0;
        while j < self.arity() {
            let xvar = self.order[j];
            let q = if xvar == y {
                self.table.next_bucket(y, ibt, nbk).unwrap_or(nil)
            } else {
                self.seek_bucket_for_var(xvar, nbk, vars)
            };
            if q == nbk {
                j += 1;
            } else {
                if q >= nil {
                    return None;
                }
                nbk = self.table.next_bucket(y, ibt, q)?;
                j = j.saturating_sub(1);
            }
        }
        Some(nbk)
    }

    fn seek_bucket_original(&mut self, y: usize, ibt: u32, bk: usize, vars: &[Domain]) -> Option<usize> {
        let nil = self.table.num_buckets();
        let mut nq = bk;
        let mut nbk;
        loop {
            nbk = nq;
            let mut j = 0;
            while j < self.arity() {
                let xvar = self.order[j];
                let q = if xvar == y {
                    self.table.next_bucket(y, ibt, nbk).unwrap_or(nil)
                } else {
                    self.seek_bucket_for_var(xvar, nbk, vars)
                };
                if q >= nil {
                    return None;
                }
                j += 1;
            }
            nq = self.table.next_bucket(y, ibt, nbk).unwrap_or(nil);
            if nq >= nil || nbk >= nq {
                break;
            }
        }
        Some(nbk)
    }

    /// §4.A.5 `SeekSupport`: find a new support for `(col, value_index)`
    /// given the now-invalid tuple `start_t`.
    fn seek_support(&mut self, col: usize, value_index: u32, start_t: u32, vars: &[Domain]) -> Option<u32> {
        let mut ct = start_t;
        loop {
            if let Some(nt) = self.seek_support_in_bucket(col, ct, vars) {
                return Some(nt);
            }
            let bk = self.seek_bucket(col, value_index, self.table.bucket_of(ct) + 1, vars)?;
            ct = self.table.first_tuple_in_bucket(col, value_index, bk)?;
            if self.valid_tuple(ct, vars) {
                return Some(ct);
            }
        }
    }

    fn reorder(&mut self, vars: &[Domain]) {
        match self.order_kind {
            BucketOrder::None => {}
            BucketOrder::ByDomainSize => {
                self.order.sort_by_key(|&v| vars[v].size());
            }
            BucketOrder::ByConflictCount => {
                self.order.sort_by_key(|&v| self.conflicts[v]);
            }
        }
    }

    /// §4.A.5 `SeekInitialSupport`.
    pub fn initial_propagate(&mut self, vars: &mut [Domain], trail: &mut Trail) -> Result<(), SolverError> {
        for c in 0..self.arity() {
            let values: Vec<i64> = vars[c].domain_iterator(false).collect();
            for val in values {
                match self.table.table().value_index(c, val) {
                    None => {
                        vars[c].remove_value(val, trail);
                    }
                    Some(vi) => {
                        let bk = self.table.next_bucket(c, vi, 0).expect("value has >=1 tuple");
                        let t = self.table.first_tuple_in_bucket(c, vi, bk).expect("non-empty bucket");
                        self.set_support(c, vi, Some(t), trail);
                    }
                }
            }
            if vars[c].size() == 0 {
                return Err(SolverError::PropagationFailure { constraint: "bucket_table" });
            }
            vars[c].mark_consistent();
        }
        Ok(())
    }

    fn removed_value_indices(&self, c: usize, vars: &[Domain]) -> Vec<u32> {
        let lo = vars[c].old_min();
        let hi = vars[c].old_max();
        (lo..=hi)
            .filter(|&v| !vars[c].contains(v))
            .filter_map(|v| self.table.table().value_index(c, v))
            .collect()
    }

    /// §4.A.5 `FilterX`: react to column `x`'s domain having shrunk.
    pub fn filter_on_domain_change(
        &mut self,
        x: usize,
        vars: &mut [Domain],
        trail: &mut Trail,
    ) -> Result<(), SolverError> {
        self.reorder(vars);
        let removed = self.removed_value_indices(x, vars);
        if removed.is_empty() {
            return Ok(());
        }

        for a_idx in removed {
            self.set_support(x, a_idx, None, trail);
            for y in 0..self.arity() {
                if y == x {
                    continue;
                }
                let values: Vec<i64> = vars[y].domain_iterator(false).collect();
                for val in values {
                    let Some(b) = self.table.table().value_index(y, val) else { continue };
                    let Some(t) = self.get_support(y, b) else { continue };
                    if self.table.table().tuple_value_index(t, x) != a_idx {
                        continue;
                    }
                    match self.seek_support(y, b, t, vars) {
                        Some(nt) => self.set_support(y, b, Some(nt), trail),
                        None => {
                            self.set_support(y, b, None, trail);
                            vars[y].remove_value(val, trail);
                            if vars[y].size() == 0 {
                                return Err(SolverError::PropagationFailure { constraint: "bucket_table" });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Convenience fixpoint driver, as with [`crate::table::TuplePropagator`].
    pub fn propagate_to_fixpoint(&mut self, vars: &mut [Domain], trail: &mut Trail) -> Result<(), SolverError> {
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
    fn bucketted_restart_matches_plain_ac4_on_e1() {
        let set = e1_tuples();
        let mut prop = BucketTablePropagator::with_bucket_size(&set, BucketOrder::None, BucketSeekType::Restart, 2);
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
    }

    #[test]
    fn all_four_seek_variants_agree_on_final_domains() {
        let set = e1_tuples();
        for seek in [
            BucketSeekType::Restart,
            BucketSeekType::Continue,
            BucketSeekType::Inverse,
            BucketSeekType::Original,
        ] {
            let mut prop = BucketTablePropagator::with_bucket_size(&set, BucketOrder::None, seek, 1);
            let mut trail = Trail::new();
            let mut vars = vec![Domain::new(1, 3), Domain::new(1, 3), Domain::new(1, 3)];
            trail.push_checkpoint();
            prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
            vars[0].remove_value(2, &mut trail);
            vars[0].remove_value(3, &mut trail);
            vars[0].mark_consistent();
            prop.propagate_to_fixpoint(&mut vars, &mut trail).unwrap();
            assert_eq!(
                vars[2].domain_iterator(true).collect::<Vec<_>>(),
                vec![1, 3],
                "seek variant {seek:?} disagreed"
            );
        }
    }

    #[test]
    fn reversibility_restores_support_across_backtrack() {
        let set = e1_tuples();
        let mut prop = BucketTablePropagator::with_bucket_size(&set, BucketOrder::None, BucketSeekType::Restart, 2);
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
}
