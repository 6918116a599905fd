//! Submission client for the invite acceptance endpoint
//!
//! Defines the `Submitter` trait the worker pool talks to, the status
//! classification the retry policy is built on, and `HttpSubmitter`, the
//! reqwest-backed implementation used in production. Tests in other crates
//! substitute their own `Submitter` to script responses.

pub mod classify;
pub mod error;
pub mod http;

pub use classify::{StatusClass, classify_status};
pub use error::{Result, SubmitError};
pub use http::{HeaderInjection, HttpSubmitter, HttpSubmitterConfig};

use common::Token;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by `Submitter::submit`.
pub type SubmitFuture<'a> = Pin<Box<dyn Future<Output = Result<u16>> + Send + 'a>>;

/// One network attempt for one token.
///
/// Returns the HTTP status code of whatever response came back; the body is
/// never inspected. Uses `Pin<Box<dyn Future>>` so the pool can hold an
/// `Arc<dyn Submitter>`.
pub trait Submitter: Send + Sync {
    /// Identifier for logging (e.g. "http").
    fn id(&self) -> &str;

    fn submit<'a>(&'a self, token: &'a Token) -> SubmitFuture<'a>;
}
