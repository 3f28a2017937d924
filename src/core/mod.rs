//! Core functionality shared by both engines.
//!
//! - [`error`]: failure types for Part A/Part B (§7).
//! - [`trail`]: reversible containers and the backtracking trail consumed by
//!   Part A propagators (§6.2).

pub mod error;
pub mod trail;

pub use error::{Result, SolverError};
pub use trail::{NumericalRev, Rev, RevIntSet, Trail};
