//! Error types.
//!
//! Only configuration problems and one-shot resolution without network
//! access are ever returned to callers. Transport and storage failures are
//! logged and degraded to "no result" by the engine.

use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// Project key missing or blank.
    #[error("flagbag: missing project key")]
    MissingProjectKey,

    /// Endpoint missing or blank.
    #[error("flagbag: missing endpoint")]
    MissingEndpoint,

    /// One-shot resolution was requested from a transport that cannot send
    /// outbound requests.
    #[error("flagbag: fetch_once requires an outbound-capable transport")]
    NetworkUnsupported,
}

/// Failures of the persisted cache slot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage access denied: {0}")]
    Denied(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Failures of a single network exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("transport cannot send outbound requests")]
    Offline,
}
