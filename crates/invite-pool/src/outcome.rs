//! Terminal outcomes of a submission task

use std::fmt;

/// How a submission task ended. Exactly one per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// 200
    Success,
    /// 401: credential rejected, the whole run must stop
    AuthError,
    /// 403: token permanently excluded
    InvalidCode,
    /// 429 on every attempt up to the retry budget
    RateLimitedExhausted,
    /// Unexpected status on the final attempt
    ServerErrorExhausted,
    /// Transport failure on the final attempt
    TransportErrorExhausted,
    /// Local failure on the final attempt
    UnexpectedErrorExhausted,
    /// The task itself crashed
    WorkerError,
    /// Claim failed before dispatch
    Duplicate,
}

impl Outcome {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::AuthError => "auth_error",
            Outcome::InvalidCode => "invalid_code",
            Outcome::RateLimitedExhausted => "rate_limited_exhausted",
            Outcome::ServerErrorExhausted => "server_error_exhausted",
            Outcome::TransportErrorExhausted => "transport_error_exhausted",
            Outcome::UnexpectedErrorExhausted => "unexpected_error_exhausted",
            Outcome::WorkerError => "worker_error",
            Outcome::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an attempt is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// 429
    RateLimited,
    /// Any status other than 200/401/403/429
    ServerError,
    /// No response: connect, timeout, I/O
    Transport,
    /// Our own failure before or while sending
    Unexpected,
}

impl Cause {
    /// Outcome once the retry budget is spent on this cause.
    pub fn exhausted(self) -> Outcome {
        match self {
            Cause::RateLimited => Outcome::RateLimitedExhausted,
            Cause::ServerError => Outcome::ServerErrorExhausted,
            Cause::Transport => Outcome::TransportErrorExhausted,
            Cause::Unexpected => Outcome::UnexpectedErrorExhausted,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Cause::RateLimited => "rate_limited",
            Cause::ServerError => "server_error",
            Cause::Transport => "transport_error",
            Cause::Unexpected => "unexpected_error",
        }
    }
}
