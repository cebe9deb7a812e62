//! Core `TutorClient` trait, its error type and history turns.

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::{Level, Topic, Voice};

// ---------------------------------------------------------------------------
// TutorError
// ---------------------------------------------------------------------------

/// Errors that can occur while requesting a tutor reply.
///
/// Speech synthesis never surfaces an error; see
/// [`TutorClient::request_speech`].
#[derive(Debug, Error)]
pub enum TutorError {
    /// No credential has been saved; no remote call was made.
    #[error("no API key configured")]
    NoCredential,

    /// The remote service rejected the credential.
    #[error("API key rejected by the service")]
    InvalidCredential,

    /// 5xx-class failure on the remote side.
    #[error("tutor service unavailable (HTTP {status})")]
    TransientServer { status: u16 },

    /// The call succeeded but carried no text.
    #[error("tutor returned an empty reply")]
    EmptyReply,

    /// Transport failure or an unexpected non-success status.
    #[error("tutor request failed: {0}")]
    Request(String),

    /// The response body could not be decoded.
    #[error("failed to parse tutor response: {0}")]
    Parse(String),
}

impl TutorError {
    /// Text of the substitute assistant message shown for a failed turn.
    pub fn user_message(&self) -> &'static str {
        match self {
            TutorError::NoCredential => "API 키가 설정되지 않았습니다.",
            TutorError::InvalidCredential => {
                "API 키가 유효하지 않습니다. 설정에서 올바른 키를 입력해주세요."
            }
            TutorError::TransientServer { .. } => {
                "AI 서버 일시적 오류입니다. 잠시 후 다시 시도해 주세요."
            }
            TutorError::EmptyReply => "죄송합니다. 답변을 생성할 수 없습니다.",
            TutorError::Request(_) | TutorError::Parse(_) => {
                "오류가 발생했습니다. 잠시 후 다시 시도해 주세요."
            }
        }
    }

    /// `true` when the learner has to (re-)enter a credential.
    pub fn needs_credential(&self) -> bool {
        matches!(self, TutorError::NoCredential | TutorError::InvalidCredential)
    }
}

impl From<reqwest::Error> for TutorError {
    fn from(e: reqwest::Error) -> Self {
        TutorError::Request(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// HistoryTurn
// ---------------------------------------------------------------------------

/// Speaker labels in the tutor service's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TutorRole {
    User,
    Model,
}

impl TutorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TutorRole::User => "user",
            TutorRole::Model => "model",
        }
    }
}

/// One prior message passed as context with a reply request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: TutorRole,
    pub text: String,
}

impl HistoryTurn {
    pub fn new(role: TutorRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TutorClient trait
// ---------------------------------------------------------------------------

/// Remote tutor: reply generation and speech synthesis.
///
/// Implementors must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn TutorClient>`.
#[async_trait]
pub trait TutorClient: Send + Sync {
    /// Generate the tutor's formatted reply to `utterance`.
    ///
    /// `history` holds the earlier conversation, oldest first, and does not
    /// include `utterance` itself.
    async fn request_reply(
        &self,
        utterance: &str,
        history: &[HistoryTurn],
        level: Level,
        topic: Topic,
    ) -> Result<String, TutorError>;

    /// Synthesize the speakable part of `text` as raw PCM bytes.
    ///
    /// Returns `None` when there is nothing to speak or when synthesis fails
    /// for any reason; speech is never required for a turn to complete.
    async fn request_speech(&self, text: &str, voice: Voice) -> Option<Vec<u8>>;
}

// Compile-time assertion: Box<dyn TutorClient> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn TutorClient>) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_ask_for_a_key() {
        assert!(TutorError::NoCredential.needs_credential());
        assert!(TutorError::InvalidCredential.needs_credential());
        assert!(!TutorError::EmptyReply.needs_credential());
        assert!(!TutorError::TransientServer { status: 503 }.needs_credential());
    }

    #[test]
    fn user_messages_are_distinct_per_kind() {
        let transient = TutorError::TransientServer { status: 500 }.user_message();
        let invalid = TutorError::InvalidCredential.user_message();
        let empty = TutorError::EmptyReply.user_message();

        assert!(transient.contains("잠시 후"));
        assert!(invalid.contains("API 키"));
        assert_ne!(transient, invalid);
        assert_ne!(empty, invalid);
    }

    #[test]
    fn role_labels() {
        assert_eq!(TutorRole::User.as_str(), "user");
        assert_eq!(TutorRole::Model.as_str(), "model");
    }
}
