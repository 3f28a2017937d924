//! Error handling for the table-constraint and feasibility-jump engines.
//!
//! All errors this crate can return are accounted for in §7 of the
//! specification: Part A never constructs an error itself (empty-domain
//! failures are the host domain layer's responsibility, observed only through
//! [`crate::variables::IntVar::remove_value`]'s return value), while Part B
//! reports unsupported models and crossed time limits cooperatively.

use thiserror::Error;

/// Failure modes surfaced by the table propagators and the feasibility-jump
/// local search engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// Initial propagation found the table/MDD has no tuple consistent with
    /// the posted variables' domains (§4.A.6).
    #[error("table constraint `{constraint}` is unsatisfiable under the initial domains")]
    PropagationFailure {
        /// Name of the constraint that failed to find any supported tuple.
        constraint: &'static str,
    },

    /// A zero-violation local-search solution failed the full-model
    /// feasibility check (§4.B.7, `ModelUnsupported`).
    #[error("evaluator model is unsupported: {reason}")]
    ModelUnsupported {
        /// Why the exact model rejected a solution the evaluator found feasible.
        reason: String,
    },

    /// A shared or local time limit was crossed at a batch boundary or
    /// inside the ~100-evaluation inner-loop check (§5, §7).
    #[error("time limit crossed during batch execution")]
    TimeLimitCrossed,

    /// A constraint weight exceeded the configured ceiling and the automatic
    /// rescale (§4.B.1) could not restore a finite weight.
    #[error("weight overflow: {context}")]
    WeightOverflow {
        /// Extra context (which constraint, what weight) for diagnostics.
        context: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;
