//! Error types for counter queries.

use thiserror::Error;

/// Result type alias for session operations.
pub type PerfmonResult<T> = Result<T, PerfmonError>;

/// Errors a counter source reports outside the per-sample tagged result.
///
/// These are session-level: the handle is unusable or the provider is gone.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid connection handle")]
    InvalidHandle,

    #[error("{0}")]
    Provider(String),
}

/// Errors that can occur during session, registry, and poll operations.
#[derive(Debug, Error)]
pub enum PerfmonError {
    #[error("failed to initialize perfmon library. cause: {0}")]
    ProviderInit(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("querying the performance counters failed")]
    Resample,

    #[error("failed to clear query")]
    ClearQuery,

    #[error("invalid subscription: {0}")]
    Subscribe(String),

    #[error("counter source error: {0}")]
    Source(#[from] SourceError),
}
