//! Status classification for acceptance responses
//!
//! The endpoint signals everything through the status code:
//! 200 accepted, 401 bad credential, 403 unknown token, 429 slow down.
//! Anything else is treated as a server-side hiccup worth retrying.

/// Classified response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200: token accepted
    Accepted,
    /// 401: bearer credential rejected, nothing else will work
    Unauthorized,
    /// 403: token is not valid
    Rejected,
    /// 429: rate limited
    RateLimited,
    /// Any other status
    ServerError(u16),
}

impl StatusClass {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StatusClass::Accepted => "accepted",
            StatusClass::Unauthorized => "unauthorized",
            StatusClass::Rejected => "rejected",
            StatusClass::RateLimited => "rate_limited",
            StatusClass::ServerError(_) => "server_error",
        }
    }
}

/// Classify a response status code.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200 => StatusClass::Accepted,
        401 => StatusClass::Unauthorized,
        403 => StatusClass::Rejected,
        429 => StatusClass::RateLimited,
        other => StatusClass::ServerError(other),
    }
}
