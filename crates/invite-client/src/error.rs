//! Error types for submission attempts

/// Why a single submission produced no HTTP status.
///
/// `Transport` covers everything between us and the endpoint (connect,
/// timeout, TLS, broken body). `Local` is a failure on our side before the
/// request left the process. `Config` only comes out of client construction.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("local error: {0}")]
    Local(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl SubmitError {
    /// Map a reqwest failure to transport vs. local.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            SubmitError::Local(err.to_string())
        } else {
            SubmitError::Transport(err.to_string())
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, SubmitError>;
