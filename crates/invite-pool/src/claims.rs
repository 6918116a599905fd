//! Claim store: which tokens are taken and which are known bad
//!
//! Both sets sit behind a single tokio `Mutex`, so the membership check and
//! the insert in `try_claim` happen as one step. Two callers racing for the
//! same token can never both win.

use std::collections::HashSet;

use common::Token;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Snapshot of set sizes for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClaimSizes {
    pub used: usize,
    pub invalid: usize,
}

#[derive(Debug, Default)]
struct ClaimSets {
    /// In flight or succeeded
    used: HashSet<Token>,
    /// Rejected by the endpoint, never released
    invalid: HashSet<Token>,
}

/// Exclusive token reservations.
#[derive(Debug, Default)]
pub struct ClaimStore {
    sets: Mutex<ClaimSets>,
}

impl ClaimStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from previous runs' record files.
    pub fn with_history(used: HashSet<Token>, invalid: HashSet<Token>) -> Self {
        info!(
            used = used.len(),
            invalid = invalid.len(),
            "claim store seeded from history"
        );
        Self {
            sets: Mutex::new(ClaimSets { used, invalid }),
        }
    }

    /// Reserve `token` if it is neither used nor invalid.
    pub async fn try_claim(&self, token: &Token) -> bool {
        let mut sets = self.sets.lock().await;
        if sets.invalid.contains(token) {
            return false;
        }
        sets.used.insert(token.clone())
    }

    /// Give a token back after a non-success outcome. No-op if absent.
    pub async fn release(&self, token: &Token) {
        if self.sets.lock().await.used.remove(token) {
            debug!(token = %token, "claim released");
        }
    }

    /// Exclude a token permanently.
    pub async fn mark_invalid(&self, token: &Token) {
        let mut sets = self.sets.lock().await;
        sets.used.remove(token);
        sets.invalid.insert(token.clone());
    }

    /// Whether `try_claim` would currently succeed.
    pub async fn is_claimable(&self, token: &Token) -> bool {
        let sets = self.sets.lock().await;
        !sets.used.contains(token) && !sets.invalid.contains(token)
    }

    pub async fn sizes(&self) -> ClaimSizes {
        let sets = self.sets.lock().await;
        ClaimSizes {
            used: sets.used.len(),
            invalid: sets.invalid.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn t(raw: &str) -> Token {
        Token::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let store = ClaimStore::new();
        assert!(store.try_claim(&t("0A1B2C")).await);
        assert!(!store.try_claim(&t("0A1B2C")).await);
        assert_eq!(store.sizes().await, ClaimSizes { used: 1, invalid: 0 });
    }

    #[tokio::test]
    async fn release_makes_token_claimable_again() {
        let store = ClaimStore::new();
        let token = t("0A1B2C");
        assert!(store.try_claim(&token).await);
        store.release(&token).await;
        assert!(store.is_claimable(&token).await);
        assert!(store.try_claim(&token).await);
    }

    #[tokio::test]
    async fn release_of_unknown_token_is_noop() {
        let store = ClaimStore::new();
        store.release(&t("0Z9Z9Z")).await;
        assert_eq!(store.sizes().await, ClaimSizes::default());
    }

    #[tokio::test]
    async fn invalid_tokens_are_never_claimable() {
        let store = ClaimStore::new();
        let token = t("0A1B2C");
        assert!(store.try_claim(&token).await);
        store.mark_invalid(&token).await;

        assert_eq!(store.sizes().await, ClaimSizes { used: 0, invalid: 1 });
        assert!(!store.try_claim(&token).await);

        // Releasing does not resurrect it
        store.release(&token).await;
        assert!(!store.try_claim(&token).await);
    }

    #[tokio::test]
    async fn history_blocks_used_and_invalid() {
        let used: HashSet<Token> = [t("0A1B2C")].into_iter().collect();
        let invalid: HashSet<Token> = [t("0D3E4F")].into_iter().collect();
        let store = ClaimStore::with_history(used, invalid);

        assert!(!store.try_claim(&t("0A1B2C")).await);
        assert!(!store.try_claim(&t("0D3E4F")).await);
        assert!(store.try_claim(&t("0G5H6I")).await);
        assert_eq!(store.sizes().await, ClaimSizes { used: 2, invalid: 1 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(ClaimStore::new());
        let token = t("0Q7R8S");
        let barrier = Arc::new(tokio::sync::Barrier::new(64));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                let token = token.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    store.try_claim(&token).await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one claimant may win");
    }
}
