//! Variable and domain system (§3.1, §6.1).
//!
//! [`VarId`] identifies a variable; [`IntVar`] is the trait both engines
//! consume (the external contract of §6.1); [`domain::Domain`] is this
//! crate's own trailed implementation of it, used by the integration tests
//! and by `table::*` when no larger host is available.

pub mod domain;
mod var_id;

pub use domain::Domain;
pub use var_id::VarId;

use std::fmt::Debug;

/// Iterator over a domain's values, ascending.
pub type DomainIter<'a> = Box<dyn Iterator<Item = i64> + 'a>;

/// The domain/variable interface consumed by Part A (§6.1).
///
/// A host search library implements this over its own variable
/// representation; this crate's [`Domain`] is a standalone implementation
/// used by the test suite and by callers with no larger host.
pub trait IntVar: Debug {
    /// Current minimum.
    fn min(&self) -> i64;
    /// Current maximum.
    fn max(&self) -> i64;
    /// Minimum as of the last propagation snapshot.
    fn old_min(&self) -> i64;
    /// Maximum as of the last propagation snapshot.
    fn old_max(&self) -> i64;
    /// Number of values currently in the domain.
    fn size(&self) -> u64;
    /// Whether `v` is currently in the domain.
    fn contains(&self, v: i64) -> bool;
    /// Remove `v` from the domain. Implementations fail the enclosing search
    /// (via their own trail/propagation-queue mechanism) if this empties the
    /// domain; this crate's `Domain` instead returns whether anything changed
    /// and exposes emptiness through `size() == 0`.
    fn remove_value(&mut self, v: i64, trail: &mut crate::core::Trail) -> bool;
    /// Whether the domain has exactly one value.
    fn is_fixed(&self) -> bool {
        self.size() == 1
    }
    /// The single remaining value, if fixed.
    fn fixed_value(&self) -> Option<i64> {
        self.is_fixed().then(|| self.min())
    }
    /// Iterate the domain's current values.
    fn domain_iterator(&self, ordered: bool) -> DomainIter<'_>;
    /// Drain and return the values removed since the last call to this
    /// method (§6.1). Must never include removals that only moved a bound
    /// (`[old_min, min)` or `(max, old_max]`), only true interior holes.
    fn hole_iterator(&mut self, ordered: bool) -> Vec<i64>;
}
