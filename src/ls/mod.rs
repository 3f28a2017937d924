//! Feasibility-jump weighted local search (§4.B).
//!
//! Minimizes a weighted sum of constraint violations over a candidate
//! solution held as a plain `Vec<i64>`. Unlike the table propagators in
//! [`crate::table`], this part of the engine is not trailed or backtracked:
//! a search state is mutated directly and restored only by an explicit
//! restart, never by undoing to a choice point (§3.3).

pub mod compiled_constraint;
pub mod compound_move;
pub mod evaluator;
pub mod jump_table;
pub mod linear_evaluator;
pub mod luby;
pub mod params;
pub mod polarity;
pub mod shared_state;
pub mod solver;

pub use compiled_constraint::{CompiledConstraint, ViolationOps};
pub use evaluator::LsEvaluator;
pub use linear_evaluator::{EnforcementLiteral, IntDomain, LinearIncrementalEvaluator};
pub use params::{LinearizationLevel, LsParams};
pub use shared_state::SharedLsStates;
pub use solver::{LsCounters, LsOptions, LsState};
