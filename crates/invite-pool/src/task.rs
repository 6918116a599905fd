//! Submission task: one token, attempts until a verdict or the budget runs out

use common::Token;
use invite_client::{StatusClass, SubmitError, Submitter, classify_status};
use tracing::{debug, error, info, warn};

use crate::outcome::{Cause, Outcome};
use crate::retry::RetryPolicy;

/// A token plus its attempt counter, owned by exactly one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub token: Token,
    pub attempt: u32,
}

impl WorkItem {
    pub fn new(token: Token) -> Self {
        Self { token, attempt: 0 }
    }
}

/// Drive `work` through the retry state machine.
///
/// 200, 401 and 403 end the task immediately. 429, other statuses, transport
/// failures and local failures are retried per `policy`; when the budget is
/// spent the outcome names the cause of the last attempt. Backoff sleeps only
/// suspend this task.
pub async fn run_submission(
    submitter: &dyn Submitter,
    policy: &RetryPolicy,
    mut work: WorkItem,
) -> Outcome {
    let token = work.token.clone();
    loop {
        let attempt = work.attempt;
        let cause = match submitter.submit(&token).await {
            Ok(status) => {
                let class = classify_status(status);
                metrics::counter!("invite_attempts_total", "class" => class.label()).increment(1);
                match class {
                    StatusClass::Accepted => {
                        info!(token = %token, attempt, "token accepted");
                        return Outcome::Success;
                    }
                    StatusClass::Unauthorized => {
                        error!(token = %token, "credential rejected (401)");
                        return Outcome::AuthError;
                    }
                    StatusClass::Rejected => {
                        info!(token = %token, "token rejected as invalid (403)");
                        return Outcome::InvalidCode;
                    }
                    StatusClass::RateLimited => {
                        debug!(token = %token, attempt, "rate limited (429)");
                        Cause::RateLimited
                    }
                    StatusClass::ServerError(status) => {
                        warn!(token = %token, attempt, status, "unexpected status");
                        Cause::ServerError
                    }
                }
            }
            Err(SubmitError::Transport(e)) => {
                metrics::counter!("invite_attempts_total", "class" => "transport_error").increment(1);
                warn!(token = %token, attempt, error = %e, "request failed");
                Cause::Transport
            }
            Err(e) => {
                metrics::counter!("invite_attempts_total", "class" => "unexpected_error").increment(1);
                warn!(token = %token, attempt, error = %e, "unexpected local failure");
                Cause::Unexpected
            }
        };

        match policy.next_delay(cause, attempt) {
            Some(delay) => {
                debug!(
                    token = %token,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries(),
                    cause = cause.label(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                work.attempt += 1;
            }
            None => {
                warn!(
                    token = %token,
                    attempts = policy.max_retries(),
                    cause = cause.label(),
                    "retry budget exhausted, giving up"
                );
                return cause.exhausted();
            }
        }
    }
}
