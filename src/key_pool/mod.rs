//! API-Key Pool Manager (spec §4.1)
//!
//! Round-robin + health-scored key selection under concurrent demand, with quarantine and
//! automatic recovery. See `SPEC_FULL.md` §4.1 and the grounding ledger in `DESIGN.md`.

pub mod config;
pub mod domain_types;
pub mod pool;
pub mod traits;

pub use config::KeyPoolConfig;
pub use domain_types::{ApiKey, ApiKeyIndex, CallOutcome, KeyHealth};
pub use pool::KeyPoolImpl;
pub use traits::{KeyPool, KeyPoolError};
