//! Append-only record files
//!
//! Three line files survive between runs:
//! - used: every accepted token
//! - success: every accepted token (kept separate so it can be handed out)
//! - invalid: every token the endpoint rejected
//!
//! Each event appends `<token>\n`. Files are never rewritten and never
//! deduplicated; a restart rebuilds the in-memory sets by reading them back.
//! A per-file tokio `Mutex` keeps concurrent appends from interleaving.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use common::Token;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Where the three record files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
    pub used: PathBuf,
    pub success: PathBuf,
    pub invalid: PathBuf,
}

impl RecordPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            used: dir.join("used_codes.txt"),
            success: dir.join("success.txt"),
            invalid: dir.join("invalid_codes.txt"),
        }
    }
}

/// One append-only file.
#[derive(Debug)]
struct RecordFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn append(&self, token: &Token) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::Ledger(format!("opening {}: {e}", self.path.display())))?;
        let line = format!("{token}\n");
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Ledger(format!("appending to {}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| Error::Ledger(format!("flushing {}: {e}", self.path.display())))?;
        debug!(token = %token, path = %self.path.display(), "record appended");
        Ok(())
    }
}

/// Read every non-blank trimmed line of `path` as a token.
///
/// A missing file is an empty set. Lines that are not UTF-8 or not valid
/// tokens are skipped with a warning; they can never be generated so they
/// cannot cause a repeat.
pub async fn load_tokens(path: &Path) -> Result<HashSet<Token>> {
    let contents = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "record file not found, starting empty");
            return Ok(HashSet::new());
        }
        Err(e) => {
            return Err(Error::Ledger(format!("reading {}: {e}", path.display())));
        }
    };

    let mut tokens = HashSet::new();
    for (index, raw) in contents.split(|&b| b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            warn!(path = %path.display(), line = index + 1, "skipping non-UTF-8 record line");
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Token::parse(line) {
            Ok(token) => {
                tokens.insert(token);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable record line"),
        }
    }
    info!(path = %path.display(), tokens = tokens.len(), "loaded record file");
    Ok(tokens)
}

/// The three record files.
#[derive(Debug)]
pub struct Ledger {
    paths: RecordPaths,
    used: RecordFile,
    success: RecordFile,
    invalid: RecordFile,
}

impl Ledger {
    pub fn new(paths: RecordPaths) -> Self {
        Self {
            used: RecordFile::new(paths.used.clone()),
            success: RecordFile::new(paths.success.clone()),
            invalid: RecordFile::new(paths.invalid.clone()),
            paths,
        }
    }

    pub fn paths(&self) -> &RecordPaths {
        &self.paths
    }

    /// Read back `(used, invalid)` to seed the claim store.
    pub async fn load_history(&self) -> Result<(HashSet<Token>, HashSet<Token>)> {
        let used = load_tokens(&self.paths.used).await?;
        let invalid = load_tokens(&self.paths.invalid).await?;
        Ok((used, invalid))
    }

    /// Accepted token: goes to both the success and the used file.
    ///
    /// Both appends are attempted even if the first fails.
    pub async fn record_success(&self, token: &Token) -> Result<()> {
        let success = self.success.append(token).await;
        let used = self.used.append(token).await;
        success.and(used)
    }

    /// Rejected token.
    pub async fn record_invalid(&self, token: &Token) -> Result<()> {
        self.invalid.append(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> Token {
        Token::parse(raw).unwrap()
    }

    async fn lines(path: &Path) -> Vec<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(c) => c.lines().map(String::from).collect(),
            Err(_) => vec![],
        }
    }

    #[tokio::test]
    async fn missing_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(RecordPaths::in_dir(dir.path()));
        let (used, invalid) = ledger.load_history().await.unwrap();
        assert!(used.is_empty());
        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn success_appends_to_success_and_used_only() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RecordPaths::in_dir(dir.path());
        let ledger = Ledger::new(paths.clone());

        ledger.record_success(&t("0A1B2C")).await.unwrap();
        ledger.record_success(&t("0D3E4F")).await.unwrap();

        assert_eq!(lines(&paths.success).await, vec!["0A1B2C", "0D3E4F"]);
        assert_eq!(lines(&paths.used).await, vec!["0A1B2C", "0D3E4F"]);
        assert!(lines(&paths.invalid).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_appends_to_invalid_only() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RecordPaths::in_dir(dir.path());
        let ledger = Ledger::new(paths.clone());

        ledger.record_invalid(&t("0A1B2C")).await.unwrap();

        assert_eq!(lines(&paths.invalid).await, vec!["0A1B2C"]);
        assert!(lines(&paths.used).await.is_empty());
        assert!(lines(&paths.success).await.is_empty());
    }

    #[tokio::test]
    async fn appends_never_rewrite_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RecordPaths::in_dir(dir.path());
        tokio::fs::write(&paths.invalid, "0Z9Y8X\n").await.unwrap();

        let ledger = Ledger::new(paths.clone());
        ledger.record_invalid(&t("0Z9Y8X")).await.unwrap();

        // No in-file dedup
        assert_eq!(lines(&paths.invalid).await, vec!["0Z9Y8X", "0Z9Y8X"]);
    }

    #[tokio::test]
    async fn load_skips_blank_and_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used_codes.txt");
        tokio::fs::write(&path, "0A1B2C\n\n   \n  0D3E4F  \nnot-a-token\n0A1B2C\n")
            .await
            .unwrap();

        let tokens = load_tokens(&path).await.unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains(&t("0A1B2C")));
        assert!(tokens.contains(&t("0D3E4F")));
    }

    #[tokio::test]
    async fn load_skips_non_utf8_lines_and_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used_codes.txt");
        tokio::fs::write(&path, b"0A1B2C\n\xff\xfe\n0D3E4F\r\n0G5H\xc36I\n")
            .await
            .unwrap();

        let tokens = load_tokens(&path).await.unwrap();
        assert_eq!(tokens.len(), 2, "got: {tokens:?}");
        assert!(tokens.contains(&t("0A1B2C")));
        assert!(tokens.contains(&t("0D3E4F")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RecordPaths::in_dir(dir.path());
        let ledger = std::sync::Arc::new(Ledger::new(paths.clone()));

        let tokens: Vec<Token> = {
            let mut rng = rand::rng();
            (0..200).map(|_| Token::random(&mut rng)).collect()
        };
        let handles: Vec<_> = tokens
            .iter()
            .cloned()
            .map(|token| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record_invalid(&token).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let written = lines(&paths.invalid).await;
        assert_eq!(written.len(), 200);
        for line in written {
            assert!(Token::parse(&line).is_ok(), "corrupted line {line:?}");
        }
    }

    #[tokio::test]
    async fn unwritable_path_is_ledger_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RecordPaths {
            used: dir.path().join("missing-dir/used.txt"),
            success: dir.path().join("missing-dir/success.txt"),
            invalid: dir.path().join("missing-dir/invalid.txt"),
        };
        let ledger = Ledger::new(paths);
        let err = ledger.record_invalid(&t("0A1B2C")).await.unwrap_err();
        assert!(matches!(err, Error::Ledger(_)), "got: {err:?}");
    }
}
