//! API-key persistence and validation.
//!
//! The credential is a single opaque string stored under
//! [`CREDENTIAL_KEY`](super::CREDENTIAL_KEY).  A candidate is only persisted
//! after a remote probe accepts it; clearing it makes every later remote call
//! fail with `NoCredential` until a new key is submitted.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{KeyValueStore, StoreError, CREDENTIAL_KEY};

/// Saved keys at or below this length are not treated as configured.
const MIN_CONFIGURED_LEN: usize = 10;

// ---------------------------------------------------------------------------
// CredentialProbe
// ---------------------------------------------------------------------------

/// A minimal remote call that succeeds only for a usable credential.
///
/// Implementations must swallow every failure (auth, network, parse) and
/// report it as `false`.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    async fn probe(&self, candidate: &str) -> bool;
}

// ---------------------------------------------------------------------------
// CredentialError
// ---------------------------------------------------------------------------

/// Why a submitted credential was not accepted.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API 키를 입력해주세요.")]
    Blank,

    #[error("유효하지 않은 API 키입니다. 다시 확인해주세요.")]
    Rejected,

    #[error("failed to persist credential: {0}")]
    Storage(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Reads, writes and validates the single live credential.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Probe `candidate` remotely.  Blank input is rejected without a call.
    pub async fn validate(&self, probe: &dyn CredentialProbe, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return false;
        }
        probe.probe(candidate).await
    }

    pub fn save(&self, candidate: &str) -> Result<(), StoreError> {
        self.store.set(CREDENTIAL_KEY, candidate)
    }

    /// The saved credential, if any.  An empty saved value counts as absent.
    pub fn load(&self) -> Option<String> {
        self.store
            .get(CREDENTIAL_KEY)
            .filter(|key| !key.is_empty())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CREDENTIAL_KEY)
    }

    /// Startup heuristic: a saved key longer than 10 characters.
    ///
    /// This is not validation; a configured key may still be rejected by the
    /// first real call.
    pub fn is_configured(&self) -> bool {
        self.load()
            .is_some_and(|key| key.chars().count() > MIN_CONFIGURED_LEN)
    }

    /// Validate `candidate` and persist it only when the probe accepts it.
    pub async fn submit(
        &self,
        probe: &dyn CredentialProbe,
        candidate: &str,
    ) -> Result<(), CredentialError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(CredentialError::Blank);
        }
        if !self.validate(probe, candidate).await {
            log::warn!("credential: validation probe rejected the submitted key");
            return Err(CredentialError::Rejected);
        }
        self.save(candidate)?;
        log::info!("credential: new API key saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts exactly one key and counts probe calls.
    struct FixedProbe {
        accepted: &'static str,
        calls: AtomicUsize,
    }

    impl FixedProbe {
        fn new(accepted: &'static str) -> Self {
            Self {
                accepted,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CredentialProbe for FixedProbe {
        async fn probe(&self, candidate: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            candidate == self.accepted
        }
    }

    fn make_store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn save_load_clear_are_idempotent() {
        let creds = make_store();
        assert!(creds.load().is_none());

        creds.save("AIzaSyExampleKey").unwrap();
        creds.save("AIzaSyExampleKey").unwrap();
        assert_eq!(creds.load().as_deref(), Some("AIzaSyExampleKey"));

        creds.clear().unwrap();
        creds.clear().unwrap();
        assert!(creds.load().is_none());
    }

    #[test]
    fn configured_requires_more_than_ten_chars() {
        let creds = make_store();
        assert!(!creds.is_configured());

        creds.save("0123456789").unwrap();
        assert!(!creds.is_configured());

        creds.save("0123456789a").unwrap();
        assert!(creds.is_configured());
    }

    #[tokio::test]
    async fn malformed_candidate_is_rejected_and_not_persisted() {
        let creds = make_store();
        let probe = FixedProbe::new("AIzaSyGoodKey0000");

        assert!(!creds.validate(&probe, "not-a-key").await);

        let err = creds.submit(&probe, "not-a-key").await.unwrap_err();
        assert!(matches!(err, CredentialError::Rejected));
        assert!(creds.load().is_none());
    }

    #[tokio::test]
    async fn blank_candidate_skips_probe() {
        let creds = make_store();
        let probe = FixedProbe::new("AIzaSyGoodKey0000");

        assert!(!creds.validate(&probe, "   ").await);
        let err = creds.submit(&probe, "").await.unwrap_err();
        assert!(matches!(err, CredentialError::Blank));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accepted_candidate_is_trimmed_and_saved() {
        let creds = make_store();
        let probe = FixedProbe::new("AIzaSyGoodKey0000");

        creds.submit(&probe, "  AIzaSyGoodKey0000\n").await.unwrap();
        assert_eq!(creds.load().as_deref(), Some("AIzaSyGoodKey0000"));
        assert!(creds.is_configured());
    }
}
