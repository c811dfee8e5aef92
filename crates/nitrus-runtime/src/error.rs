//! Error types for the runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A socket operation failed; treated like a peer disconnect.
    #[error("transport: {0}")]
    Io(#[from] std::io::Error),

    /// A protocol engine rejected its input.
    #[error(transparent)]
    Protocol(#[from] nitrus_core::Error),
}
