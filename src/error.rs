//! Crate-level error aggregation
//!
//! Each subsystem (key pool, breaker, router, dispatcher, conductor) defines its own
//! `thiserror`-derived error enum covering the taxonomy kinds relevant to it. `CoreError`
//! aggregates them for callers that cross subsystem boundaries (e.g. the Conductor calling
//! into the Router).

use thiserror::Error;

use crate::breaker::BreakerError;
use crate::conductor::ConductorError;
use crate::dispatcher::DispatcherError;
use crate::key_pool::KeyPoolError;
use crate::router::RouterError;

/// Aggregated error type for cross-subsystem call sites.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key pool failure (e.g. every key quarantined).
    #[error(transparent)]
    KeyPool(#[from] KeyPoolError),

    /// Circuit breaker refused the call.
    #[error(transparent)]
    Breaker(#[from] BreakerError),

    /// Router-level failure.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Task dispatcher failure.
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    /// Conductor-level failure.
    #[error(transparent)]
    Conductor(#[from] ConductorError),

    /// Persistence-layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration failure at process start.
    #[error("configuration error: {0}")]
    Configuration(String),
}
