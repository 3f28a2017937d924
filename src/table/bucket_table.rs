//! Bucketted tuple storage (§4.A.3).
//!
//! Tuples are partitioned into fixed-size buckets `[b·S, (b+1)·S)`. For
//! every `(column, value_index)` this keeps `first_tuple_in_bucket[b]` (the
//! lowest tuple in bucket `b` using that value, or `None`) and
//! `next_bucket[b]` (the smallest `b' >= b` with a non-empty
//! `first_tuple_in_bucket`, so a propagator can skip whole empty buckets).
//! Within a bucket, tuples sharing a value are chained via
//! `next_tuple_with_same_value`, exactly as plain [`PerVariableSupport`]
//! chains them globally — but bucketted per [`BucketTable::bucket_of`].

use crate::table::tuple_table::{IntTupleSet, TupleTable};

/// Per-`(column, value_index)` bucket links over a [`TupleTable`] (§4.A.3).
#[derive(Clone, Debug)]
pub struct BucketTable {
    table: TupleTable,
    bucket_size: u32,
    num_buckets: usize,
    /// `first_tuple_in_bucket[col][value_index][bucket]`.
    first_tuple_in_bucket: Vec<Vec<Vec<Option<u32>>>>,
    /// `next_bucket[col][value_index][bucket]`, monotone non-decreasing.
    next_bucket: Vec<Vec<Vec<Option<usize>>>>,
    /// `next_same_value[col][tuple]` chains tuples sharing a value, in
    /// table order (spans bucket boundaries freely; a seek stops consulting
    /// it once it leaves the current bucket).
    next_same_value: Vec<Vec<Option<u32>>>,
}

impl BucketTable {
    /// Build bucket boundaries and same-value chains with bucket size `bucket_size`.
    pub fn build(tuples: &dyn IntTupleSet, bucket_size: u32) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        let table = TupleTable::build(tuples);
        let arity = table.arity();
        let num_tuples = table.num_tuples();
        let num_buckets = num_tuples / bucket_size as usize + 1;

        let mut first_tuple_in_bucket: Vec<Vec<Vec<Option<u32>>>> = (0..arity)
            .map(|c| vec![vec![None; num_buckets]; table.num_value_indices(c)])
            .collect();
        let mut next_same_value: Vec<Vec<Option<u32>>> =
            (0..arity).map(|_| vec![None; num_tuples]).collect();
        let mut last_tuple_index: Vec<Vec<Option<u32>>> =
            (0..arity).map(|c| vec![None; table.num_value_indices(c)]).collect();

        for t in 0..num_tuples as u32 {
            for c in 0..arity {
                let vi = table.tuple_value_index(t, c) as usize;
                if let Some(last) = last_tuple_index[c][vi] {
                    next_same_value[c][last as usize] = Some(t);
                }
                last_tuple_index[c][vi] = Some(t);

                let b = (t / bucket_size) as usize;
                if first_tuple_in_bucket[c][vi][b].is_none() {
                    first_tuple_in_bucket[c][vi][b] = Some(t);
                }
            }
        }

        let mut next_bucket: Vec<Vec<Vec<Option<usize>>>> = (0..arity)
            .map(|c| vec![vec![None; num_buckets]; table.num_value_indices(c)])
            .collect();
        for c in 0..arity {
            for vi in 0..table.num_value_indices(c) {
                let mut next: Option<usize> = None;
                for b in (0..num_buckets).rev() {
                    if first_tuple_in_bucket[c][vi][b].is_some() {
                        next = Some(b);
                    }
                    next_bucket[c][vi][b] = next;
                }
            }
        }

        BucketTable {
            table,
            bucket_size,
            num_buckets,
            first_tuple_in_bucket,
            next_bucket,
            next_same_value,
        }
    }

    /// The underlying indexed table.
    pub fn table(&self) -> &TupleTable {
        &self.table
    }

    /// Fixed bucket size this table was built with.
    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    /// Total number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// The bucket index a tuple falls in.
    pub fn bucket_of(&self, tuple: u32) -> usize {
        (tuple / self.bucket_size) as usize
    }

    /// Last tuple index that could belong to `bucket` (may exceed `num_tuples`).
    pub fn last_tuple_in_bucket_range(&self, bucket: usize) -> u32 {
        (bucket as u32 + 1) * self.bucket_size - 1
    }

    /// §4.A.3 `first_tuple_in_bucket`.
    pub fn first_tuple_in_bucket(&self, col: usize, value_index: u32, bucket: usize) -> Option<u32> {
        self.first_tuple_in_bucket[col][value_index as usize][bucket]
    }

    /// §4.A.3 `next_bucket`: smallest `b' >= bucket` with a non-empty
    /// `first_tuple_in_bucket` for this value, `None` past the last bucket.
    pub fn next_bucket(&self, col: usize, value_index: u32, bucket: usize) -> Option<usize> {
        self.next_bucket[col][value_index as usize].get(bucket).copied().flatten()
    }

    /// Next tuple (possibly in a later bucket) sharing the same `col`-th
    /// value as `tuple`, in table order.
    pub fn next_tuple_with_same_value(&self, col: usize, tuple: u32) -> Option<u32> {
        self.next_same_value[col][tuple as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tuple_table::VecTupleSet;

    #[test]
    fn next_bucket_is_monotone_and_skips_empty_buckets() {
        // value 1 appears in tuples 0 and 5 only; with bucket size 2 that's
        // buckets 0 and 2, so next_bucket(1) must skip the empty bucket 1.
        let rows: Vec<Vec<i64>> = (0..6).map(|i| vec![if i == 0 || i == 5 { 1 } else { 9 }]).collect();
        let set = VecTupleSet::new(rows);
        let bt = BucketTable::build(&set, 2);
        let v1 = bt.table().value_index(0, 1).unwrap();

        assert_eq!(bt.first_tuple_in_bucket(0, v1, 0), Some(0));
        assert_eq!(bt.first_tuple_in_bucket(0, v1, 1), None);
        assert_eq!(bt.next_bucket(0, v1, 0), Some(0));
        assert_eq!(bt.next_bucket(0, v1, 1), Some(2));
        assert_eq!(bt.next_bucket(0, v1, 2), Some(2));
        assert_eq!(bt.next_bucket(0, v1, 3), None);
    }

    #[test]
    fn same_value_chain_spans_buckets_in_table_order() {
        let rows: Vec<Vec<i64>> = vec![vec![1], vec![2], vec![1], vec![1]];
        let set = VecTupleSet::new(rows);
        let bt = BucketTable::build(&set, 2);
        let v1 = bt.table().value_index(0, 1).unwrap();
        let first = bt.first_tuple_in_bucket(0, v1, 0).unwrap();
        assert_eq!(first, 0);
        let second = bt.next_tuple_with_same_value(0, first).unwrap();
        assert_eq!(second, 2);
        let third = bt.next_tuple_with_same_value(0, second).unwrap();
        assert_eq!(third, 3);
        assert_eq!(bt.next_tuple_with_same_value(0, third), None);
    }
}
