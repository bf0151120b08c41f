//! Circuit Breaker Fabric (spec §4.3): adaptive per-provider breakers with exponential backoff.

pub mod breaker;
pub mod config;
pub mod domain_types;
pub mod fabric;
pub mod traits;

pub use breaker::CircuitBreaker;
pub use config::BreakerConfig;
pub use domain_types::{BreakerSnapshot, BreakerState};
pub use fabric::BreakerFabric;
pub use traits::BreakerError;
