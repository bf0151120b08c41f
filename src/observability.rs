//! Structured logging initialization (spec §10.1).
//!
//! Mirrors the prior binary entrypoint's
//! `tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env())` convention:
//! `RUST_LOG` selects verbosity and per-module directives, with a JSON-formatted variant for
//! production deployments where a log aggregator expects structured records.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber with a human-readable, compact formatter.
/// Intended for local development and interactive terminals.
pub fn init_pretty() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .init();
}

/// Installs the global `tracing` subscriber with JSON-formatted output, one record per line.
/// Intended for production deployments whose log pipeline parses structured JSON.
pub fn init_json() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
}
