//! Errors for the Circuit Breaker Fabric

use thiserror::Error;

/// Failure modes for breaker-gated calls.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// The breaker is open and no fallback was supplied for this call.
    #[error("circuit open for {provider}")]
    CircuitOpen { provider: String },

    /// The gated call itself failed; the breaker has already recorded the failure.
    #[error("call failed: {0}")]
    CallFailed(String),
}
