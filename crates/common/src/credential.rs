//! Bearer credential loading
//!
//! The credential is resolved from the `INVITE_AUTH_TOKEN` env var first, then
//! from the auth file. Values copied out of a browser often carry a `Bearer `
//! prefix, line breaks, or typographic punctuation that cannot go into an HTTP
//! header; all of that is normalized here so the client only sees ASCII.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Env var that overrides the auth file.
pub const AUTH_TOKEN_ENV: &str = "INVITE_AUTH_TOKEN";

/// Typographic characters and their ASCII stand-ins.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2026}', "..."),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
];

/// Load the bearer credential: env var wins over the file.
pub fn load_bearer(auth_file: &Path) -> Result<Secret<String>> {
    if let Ok(raw) = std::env::var(AUTH_TOKEN_ENV) {
        info!(source = AUTH_TOKEN_ENV, "loading bearer credential from environment");
        return normalize_bearer(&raw).map(Secret::new);
    }

    let raw = std::fs::read_to_string(auth_file).map_err(|e| {
        Error::Config(format!(
            "failed to read auth file {}: {e}",
            auth_file.display()
        ))
    })?;
    info!(path = %auth_file.display(), "loaded bearer credential from file");
    normalize_bearer(&raw).map(Secret::new)
}

/// Strip an optional `Bearer` scheme word and all whitespace, then sanitize.
///
/// The scheme is only stripped when it stands alone (followed by whitespace
/// or nothing). Returns `Error::Config` if nothing is left.
pub fn normalize_bearer(raw: &str) -> Result<String> {
    let trimmed = raw.trim_start();
    let trimmed = match trimmed.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        _ => trimmed,
    };
    let compact: String = trimmed.split_whitespace().collect();
    if compact.is_empty() {
        return Err(Error::Config("bearer credential is empty".into()));
    }
    Ok(sanitize_bearer(&compact))
}

/// Replace characters that are not valid in a header value.
pub fn sanitize_bearer(token: &str) -> String {
    let mut out = token.to_string();
    for (from, to) in REPLACEMENTS {
        if out.contains(*from) {
            info!(replaced = %from, with = *to, "replaced character in bearer credential");
            out = out.replace(*from, to);
        }
    }

    if !out.is_ascii() {
        warn!("bearer credential contains other non-ASCII characters, replacing them with '?'");
        out = out
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect();
    }

    if out != token {
        info!("bearer credential sanitized to be ASCII-safe");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch `INVITE_AUTH_TOKEN`.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn normalize_strips_bearer_prefix_and_whitespace() {
        let token = normalize_bearer("  Bearer abc.def\n.ghi \r\n").unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(normalize_bearer("   \n").is_err());
        assert!(normalize_bearer("Bearer   ").is_err());
    }

    #[test]
    fn normalize_rejects_bare_scheme_word() {
        for raw in ["Bearer", "Bearer\n", "  Bearer\t\r\n", "\nBearer \n "] {
            let err = normalize_bearer(raw).unwrap_err();
            assert!(err.to_string().contains("empty"), "{raw:?} gave: {err}");
        }
    }

    #[test]
    fn normalize_keeps_token_that_merely_starts_with_bearer() {
        assert_eq!(normalize_bearer("BearerXYZ.sig").unwrap(), "BearerXYZ.sig");
        assert_eq!(normalize_bearer("Bearer\tabc").unwrap(), "abc");
    }

    #[test]
    fn sanitize_maps_typographic_punctuation() {
        assert_eq!(sanitize_bearer("a\u{2026}b"), "a...b");
        assert_eq!(sanitize_bearer("\u{201C}x\u{201D}"), "\"x\"");
        assert_eq!(sanitize_bearer("\u{2018}x\u{2019}"), "'x'");
        assert_eq!(sanitize_bearer("a\u{2013}b\u{2014}c"), "a-b--c");
    }

    #[test]
    fn sanitize_replaces_other_non_ascii() {
        assert_eq!(sanitize_bearer("abc\u{00e9}d\u{4e2d}"), "abc?d?");
    }

    #[test]
    fn sanitize_leaves_ascii_untouched() {
        assert_eq!(sanitize_bearer("eyJhbGciOiJIUzI1NiJ9.e30.sig"), "eyJhbGciOiJIUzI1NiJ9.e30.sig");
    }

    #[test]
    fn load_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(AUTH_TOKEN_ENV) };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.txt");
        std::fs::write(&path, "Bearer file-token\n").unwrap();

        let secret = load_bearer(&path).unwrap();
        assert_eq!(secret.expose(), "file-token");
    }

    #[test]
    fn env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.txt");
        std::fs::write(&path, "file-token").unwrap();

        unsafe { set_env(AUTH_TOKEN_ENV, "env-token") };
        let secret = load_bearer(&path).unwrap();
        unsafe { remove_env(AUTH_TOKEN_ENV) };

        assert_eq!(secret.expose(), "env-token");
    }

    #[test]
    fn missing_file_is_config_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(AUTH_TOKEN_ENV) };

        let err = load_bearer(Path::new("/nonexistent/auth.txt")).unwrap_err();
        assert!(
            err.to_string().contains("failed to read auth file"),
            "got: {err}"
        );
    }
}
