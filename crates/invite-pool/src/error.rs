//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("record file error: {0}")]
    Ledger(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
