//! # propa
//!
//! A constraint-propagation engine combining two independent families of
//! techniques:
//!
//! - [`table`] (Part A): backtrackable, trail-based table/MDD constraint
//!   propagators reaching generalized arc consistency over an explicit tuple
//!   set -- a plain tuple-indexed AC-4, a bucketted variant with a
//!   configurable variable/value scan order, and an MDD-compressed AC-4R with
//!   reset/restore support.
//! - [`ls`] (Part B): a feasibility-jump weighted-violation local search,
//!   supporting both linear and non-linear constraints, compound moves,
//!   Luby-scheduled restarts, and a shared pool of independent search states.
//!
//! The two parts share [`variables::VarId`] and [`core::error::SolverError`]
//! but are otherwise independent: Part A mutates domains through
//! [`core::trail::Trail`] and can be undone to any earlier choice point, while
//! Part B holds its candidate solution as a plain `Vec<i64>` and is restored
//! only by an explicit restart (§3.3).
//!
//! ## Example: a table constraint
//!
//! ```rust
//! use propa::table::{build_ac4_table, VecTupleSet};
//! use propa::variables::Domain;
//! use propa::core::Trail;
//!
//! let tuples = VecTupleSet::new(vec![vec![0, 0], vec![1, 1]]);
//! let propagator = build_ac4_table(&tuples);
//! let mut trail = Trail::new();
//! let mut domains = vec![Domain::new(0, 1), Domain::new(0, 1)];
//! propagator.initial_propagate(&mut domains, &mut trail).unwrap();
//! ```
//!
//! ## Example: feasibility-jump local search
//!
//! ```rust
//! use propa::ls::{IntDomain, LinearIncrementalEvaluator, LsEvaluator, LsParams, LsState};
//! use propa::ls::luby::LubyCounter;
//! use propa::variables::VarId;
//!
//! // 2x + 3y == 4, x, y in [0, 2].
//! let mut linear = LinearIncrementalEvaluator::new();
//! let c = linear.new_constraint(IntDomain::fixed(4));
//! linear.add_term(c, VarId::from_index(0), 2);
//! linear.add_term(c, VarId::from_index(1), 3);
//! linear.finalize(&[2, 2]);
//!
//! let evaluator = LsEvaluator::new(linear, vec![], 2);
//! let domains = vec![IntDomain::new(0, 2), IntDomain::new(0, 2)];
//! let mut state = LsState::new(domains, evaluator, LsParams::default());
//! let mut shared_luby = LubyCounter::new();
//! for _ in 0..50 {
//!     if state.run_batch(200, &mut shared_luby).unwrap() {
//!         break;
//!     }
//! }
//! assert_eq!(state.sum_of_violations(), 0);
//! ```

pub mod core;
pub mod ls;
pub mod table;
pub mod variables;
