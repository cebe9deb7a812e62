//! Durable local key-value storage.
//!
//! Everything the learner produces (credential, transcript, level/topic/voice)
//! is persisted as string values under a handful of fixed keys.  Values are
//! opaque strings and every write replaces the value wholesale.
//!
//! * [`KeyValueStore`]: the trait the rest of the crate talks to.
//! * [`JsonFileStore`]: one JSON document on disk, atomically rewritten.
//! * [`MemoryStore`]: in-memory map for tests and throwaway sessions.
//! * [`CredentialStore`]: API-key persistence and remote validation.

pub mod credential;
pub mod file;
pub mod memory;

pub use credential::{CredentialError, CredentialProbe, CredentialStore};
pub use file::JsonFileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Key holding the Gemini API key.
pub const CREDENTIAL_KEY: &str = "gemini_api_key";
/// Key holding the serialized conversation log.
pub const TRANSCRIPT_KEY: &str = "ai_teacher_chat";
/// Key holding the serialized level/topic/voice settings.
pub const SETTINGS_KEY: &str = "ai_teacher_settings";

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors raised when a write cannot be made durable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialise storage: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

/// String-valued persistent storage.
///
/// Reads never fail: a key that is missing or unreadable is simply absent.
/// Writes report failure so callers can keep their in-memory view in sync
/// with what is actually on disk.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`.  Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
