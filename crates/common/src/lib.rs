//! Common types for the invite sweep workspace
//!
//! Holds the `Token` candidate type shared by the client and the pool, the
//! `Secret` wrapper for the bearer credential, and the credential loader.

pub mod credential;
mod error;
mod secret;
mod token;

pub use credential::{AUTH_TOKEN_ENV, load_bearer, normalize_bearer, sanitize_bearer};
pub use error::{Error, Result};
pub use secret::Secret;
pub use token::{TOKEN_LEN, Token};
