//! Error types for pattern construction and handler dispatch

/// Errors raised by the path-pattern bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A pattern failed to compile at construction time
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern text
        pattern: String,
        /// Why the pattern was rejected
        reason: String,
    },

    /// A handler returned an error while processing a publication
    ///
    /// This variant is never returned from [`crate::Bus::publish`] — it only
    /// exists so handlers have a concrete error type to return. Failures are
    /// caught, logged, and swallowed; they never propagate to the publisher.
    #[error("handler failed: {0}")]
    HandlerFailed(String),
}

impl BusError {
    pub(crate) fn invalid(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}
