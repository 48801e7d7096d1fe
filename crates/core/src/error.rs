//! Errors surfaced to callers of the transport engine.
//!
//! Transport passes themselves never fail: out-of-bounds probes and degenerate
//! inputs are absorbed by defaulting. Only structural edits that name an
//! object (sources, barriers) can be rejected.

use thiserror::Error;

/// Failure of a structural edit on the airflow model or barrier handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// A ventilation source with this name is already registered
    #[error("ventilation source '{0}' already exists")]
    DuplicateSource(String),

    /// No ventilation source with this name
    #[error("unknown ventilation source '{0}'")]
    UnknownSource(String),

    /// A barrier with this name is already registered
    #[error("barrier '{0}' already exists")]
    DuplicateBarrier(String),

    /// No barrier with this name
    #[error("unknown barrier '{0}'")]
    UnknownBarrier(String),
}

/// Result alias for structural edits.
pub type Result<T> = std::result::Result<T, TransportError>;
