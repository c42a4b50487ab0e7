//! Error types for factor and variable message updates.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while building tables, compiling plans, or updating messages.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// All failures are local and synchronous. When an update call fails, outgoing
/// buffers for edges completed earlier in the same call keep their new values
/// and the failing edge (and any edge after it) keeps its prior value.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every candidate output value summed to zero during normalization.
    #[error(
        "degenerate message: all weights were zero when computing edge {edge} of factor '{factor}'"
    )]
    DegenerateMessage { factor: Arc<str>, edge: usize },

    /// The joint belief of a factor summed to zero.
    #[error("degenerate belief: all joint weights were zero for factor '{factor}'")]
    DegenerateBelief { factor: Arc<str> },

    /// A message buffer length disagrees with the edge's declared domain size.
    #[error(
        "shape mismatch on edge {edge} of '{factor}': expected {expected} values, got {actual}"
    )]
    ShapeMismatch {
        factor: Arc<str>,
        edge: usize,
        expected: usize,
        actual: usize,
    },

    /// An update was requested before buffers and plan were initialized.
    #[error("uninitialized plan: {0}")]
    UninitializedPlan(String),

    /// An edge index past the node's degree.
    #[error("edge {edge} out of range for '{factor}' with degree {degree}")]
    EdgeOutOfRange {
        factor: Arc<str>,
        edge: usize,
        degree: usize,
    },

    /// Weight table construction rejected its input.
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// Configuration or argument validation failed.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Internal invariant violated (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Zero-sum failure on one output edge.
    pub(crate) fn degenerate_message(factor: &Arc<str>, edge: usize) -> Self {
        #[cfg(feature = "tracing")]
        tracing::warn!(factor = %factor, edge, "degenerate message: all weights were zero");
        EngineError::DegenerateMessage {
            factor: Arc::clone(factor),
            edge,
        }
    }

    /// Returns true for zero-sum normalization failures.
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            EngineError::DegenerateMessage { .. } | EngineError::DegenerateBelief { .. }
        )
    }
}
