//! Turn state machine and shared conversation state.
//!
//! [`TurnPhase`] records where the current turn is; front ends read it via
//! [`SharedState`] to render a status line.
//!
//! [`ConversationState`] is the single source of truth for the session: the
//! message log, the learner's settings, the pending input and the
//! recognition/turn flags.
//!
//! [`SharedState`] is `Arc<Mutex<ConversationState>>`.  Never hold the lock
//! across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::stt::LanguageTag;

use super::model::{Message, MessageIdGenerator, UserSettings};

// ---------------------------------------------------------------------------
// TurnPhase
// ---------------------------------------------------------------------------

/// Phases of one conversation turn.
///
/// ```text
/// Idle ──submit──▶ AppendingUserMessage ──▶ RequestingReply
///   RequestingReply ──ok──▶ AppendingAssistantMessage ──▶ RequestingSpeech
///                                        ──bytes──▶ Playing ──▶ Idle
///                                        ──none───▶ Idle
///   RequestingReply ──err─▶ AppendingErrorMessage ──▶ Idle
/// ```
///
/// Initial turns (greeting, level change) skip `AppendingUserMessage`.
/// Replays go straight to `RequestingSpeech`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    AppendingUserMessage,
    RequestingReply,
    AppendingAssistantMessage,
    AppendingErrorMessage,
    RequestingSpeech,
    Playing,
}

impl TurnPhase {
    /// `true` between submission and the end of the turn.
    ///
    /// ```
    /// use ai_teacher::conversation::TurnPhase;
    ///
    /// assert!(!TurnPhase::Idle.is_busy());
    /// assert!(TurnPhase::RequestingReply.is_busy());
    /// assert!(TurnPhase::RequestingSpeech.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, TurnPhase::Idle)
    }

    /// Status-line label.
    pub fn label(&self) -> &'static str {
        match self {
            TurnPhase::Idle => "Ready",
            TurnPhase::AppendingUserMessage => "Sending",
            TurnPhase::RequestingReply => "Thinking",
            TurnPhase::AppendingAssistantMessage => "Replying",
            TurnPhase::AppendingErrorMessage => "Error",
            TurnPhase::RequestingSpeech => "Preparing audio",
            TurnPhase::Playing => "Speaking",
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

pub struct ConversationState {
    pub phase: TurnPhase,

    /// The single-turn guard.  Set while a turn or replay is in flight.
    pub loading: bool,

    /// Ordered message log.  Always equal to what is persisted.
    pub messages: Vec<Message>,

    pub settings: UserSettings,

    /// `false` while the topic picker should be shown.
    pub topic_active: bool,

    /// Text being composed; filled by final recognition results.
    pub input: String,

    /// Provisional recognition text; never persisted.
    pub interim: String,

    pub input_language: LanguageTag,

    /// Set when a reply failed for lack of a usable credential.
    pub credential_required: bool,

    /// Bumped whenever the log is reset or rewound.  A turn whose reply
    /// arrives under a different epoch is discarded.
    pub(crate) log_epoch: u64,

    pub(crate) ids: MessageIdGenerator,
}

impl ConversationState {
    /// State restored from a saved log and settings.  A non-empty log means
    /// a conversation is in progress.
    pub fn restored(messages: Vec<Message>, settings: UserSettings) -> Self {
        Self {
            phase: TurnPhase::Idle,
            loading: false,
            ids: MessageIdGenerator::seeded_from(&messages),
            topic_active: !messages.is_empty(),
            messages,
            settings,
            input: String::new(),
            interim: String::new(),
            input_language: LanguageTag::default(),
            credential_required: false,
            log_epoch: 0,
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::restored(Vec::new(), UserSettings::default())
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

pub type SharedState = Arc<Mutex<ConversationState>>;

pub fn new_shared_state(state: ConversationState) -> SharedState {
    Arc::new(Mutex::new(state))
}

/// Lock `state`, recovering the data from a poisoned mutex.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, ConversationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::model::{MessageId, Role};

    #[test]
    fn only_idle_is_not_busy() {
        assert!(!TurnPhase::Idle.is_busy());
        for phase in [
            TurnPhase::AppendingUserMessage,
            TurnPhase::RequestingReply,
            TurnPhase::AppendingAssistantMessage,
            TurnPhase::AppendingErrorMessage,
            TurnPhase::RequestingSpeech,
            TurnPhase::Playing,
        ] {
            assert!(phase.is_busy(), "{phase:?}");
        }
    }

    #[test]
    fn labels() {
        assert_eq!(TurnPhase::Idle.label(), "Ready");
        assert_eq!(TurnPhase::RequestingReply.label(), "Thinking");
        assert_eq!(TurnPhase::Playing.label(), "Speaking");
    }

    #[test]
    fn fresh_state_shows_topic_picker() {
        let state = ConversationState::default();
        assert!(!state.topic_active);
        assert!(!state.loading);
        assert_eq!(state.phase, TurnPhase::Idle);
        assert_eq!(state.input_language, LanguageTag::EnUs);
    }

    #[test]
    fn restored_log_resumes_conversation() {
        let log = vec![Message {
            id: MessageId(10),
            role: Role::Assistant,
            content: "Welcome back!".into(),
            created_at: 10,
            has_audio: true,
        }];
        let mut state = ConversationState::restored(log, UserSettings::default());
        assert!(state.topic_active);
        assert!(state.ids.next_at(5) > MessageId(10));
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }
}
