//! Part A: table and MDD constraint propagation (§4.A).
//!
//! Three families share the same `TupleTable`/value-index foundation:
//! plain AC-4 ([`tuple_propagator`]), bucketted AC-4 with configurable
//! variable/value order ([`bucket_table`], [`bucket_propagator`]), and
//! AC-4R over a reduced MDD with reset/restore ([`mdd`], [`mdd_propagator`]).

pub mod bucket_propagator;
pub mod bucket_table;
pub mod mdd;
pub mod mdd_propagator;
pub mod support;
pub mod tuple_propagator;
pub mod tuple_table;

pub use bucket_propagator::{BucketOrder, BucketSeekType, BucketTablePropagator};
pub use bucket_table::BucketTable;
pub use mdd::{MddFactory, MddGraph, RegularSpec};
pub use mdd_propagator::MddPropagator;
pub use tuple_propagator::TuplePropagator;
pub use tuple_table::{IntTupleSet, TupleTable, VecTupleSet};

/// Build a plain AC-4 propagator over an explicit tuple set (§6.4 `build_ac4_table`).
pub fn build_ac4_table(tuples: &dyn IntTupleSet) -> TuplePropagator {
    TuplePropagator::new(tuples)
}

/// Build a bucketted AC-4 propagator (§6.4 `build_bucketted_table`).
pub fn build_bucketted_table(
    tuples: &dyn IntTupleSet,
    order: BucketOrder,
    seek: BucketSeekType,
    bucket_size: u32,
) -> BucketTablePropagator {
    BucketTablePropagator::with_bucket_size(tuples, order, seek, bucket_size)
}

/// Build an AC4R propagator over an MDD compiled from explicit tuples
/// (§6.4 `build_ac4_mdd_reset_table`).
pub fn build_ac4_mdd_reset_table(tuples: &dyn IntTupleSet) -> MddPropagator {
    let graph = MddFactory::from_tuples(tuples);
    MddPropagator::new(graph)
}

/// Build an AC4R propagator over an MDD compiled from a regular-language
/// (automaton) specification (§6.4 `build_ac4_mdd_reset_regular`).
pub fn build_ac4_mdd_reset_regular(automaton: &mdd::RegularSpec) -> MddPropagator {
    let graph = MddFactory::from_regular(automaton);
    MddPropagator::new(graph)
}
