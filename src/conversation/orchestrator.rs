//! Conversation orchestrator: drives turns, replays and session controls.
//!
//! [`Orchestrator`] owns the [`SharedState`] and is the only writer of the
//! message log and the learner's settings.  It is cheap to clone so a front
//! end can run a turn on a spawned task while it keeps reading input.
//!
//! # Turn flow
//!
//! ```text
//! handle_send(text, Normal)
//!   └─▶ guard (busy → Busy) ─▶ history snapshot ─▶ append user msg   [AppendingUserMessage]
//!         └─▶ tutor.request_reply                                   [RequestingReply]
//!               ├─ Ok  → append assistant msg (hasAudio)            [AppendingAssistantMessage]
//!               │        └─▶ tutor.request_speech(voice)            [RequestingSpeech]
//!               │              └─ bytes → playback.play(1.0x)        [Playing]
//!               └─ Err → append Korean error notice                 [AppendingErrorMessage]
//! ```
//!
//! Every log or settings mutation is written to the store first and only
//! committed to memory once the write succeeded, so the persisted transcript
//! always equals the in-memory log.

use std::sync::Arc;

use thiserror::Error;

use crate::audio::{PlaybackEngine, PlaybackTarget};
use crate::config::AudioConfig;
use crate::store::{
    CredentialError, CredentialProbe, CredentialStore, KeyValueStore, StoreError, SETTINGS_KEY,
    TRANSCRIPT_KEY,
};
use crate::stt::{LanguageTag, RecognitionBridge, RecognitionError, RecognitionEvent};
use crate::tutor::{HistoryTurn, TutorClient, TutorRole};

use super::model::{now_millis, Level, Message, MessageId, Role, Topic, UserSettings, Voice};
use super::state::{lock_state, new_shared_state, ConversationState, SharedState, TurnPhase};

/// Phrase synthesized by the voice preview.
pub const PREVIEW_PHRASE: &str = "Hello, nice to meet you!";

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

/// How a submission enters the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// Learner input: appended to the log, sent with the full history.
    Normal,
    /// System-originated prompt (greeting, level change): not appended,
    /// sent with an empty history.
    Initial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The tutor replied; `played` tells whether its speech started.
    Completed { message_id: MessageId, played: bool },
    /// The reply failed and an error notice was appended instead.
    Failed { message_id: MessageId },
    /// Another turn is in flight; nothing happened.
    Busy,
    /// Blank input; nothing happened.
    Ignored,
    /// The log was reset or rewound before the reply arrived; the reply was
    /// dropped.
    Superseded,
}

/// Result of replay and preview requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Started,
    /// The same target was playing and has been stopped.
    Stopped,
    /// No speech could be produced or played.
    Unavailable,
    /// A turn is in flight.
    Busy,
    /// No speakable assistant message with that id.
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    Started(LanguageTag),
    /// A stop was requested; the final result still arrives as an event.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Interim or pending input text changed.
    Updated,
    /// The recognized utterance was sent as a turn.
    Submitted(TurnOutcome),
    /// The session ended without recognized text.
    NoResult,
    /// The session failed in a way the learner can fix.
    Alert(&'static str),
    /// The session failed silently.
    Ignored,
}

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// Everything the orchestrator talks to.
pub struct AppContext {
    pub store: Arc<dyn KeyValueStore>,
    pub credentials: CredentialStore,
    pub tutor: Arc<dyn TutorClient>,
    pub playback: PlaybackEngine,
    pub recognition: Arc<RecognitionBridge>,
    pub audio: AudioConfig,
}

// ---------------------------------------------------------------------------
// TurnGuard
// ---------------------------------------------------------------------------

/// Releases the loading flag when a turn or replay ends, however it ends.
struct TurnGuard<'a> {
    state: &'a SharedState,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut st = lock_state(self.state);
        st.loading = false;
        st.phase = TurnPhase::Idle;
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Orchestrator {
    state: SharedState,
    store: Arc<dyn KeyValueStore>,
    credentials: CredentialStore,
    tutor: Arc<dyn TutorClient>,
    playback: PlaybackEngine,
    recognition: Arc<RecognitionBridge>,
    slow_rate: f32,
}

impl Orchestrator {
    /// Build the orchestrator, restoring settings and the log from the store.
    pub fn start(ctx: AppContext) -> Self {
        let settings = restore_settings(ctx.store.as_ref());
        let messages = restore_log(ctx.store.as_ref());
        log::info!(
            "conversation: restored {} messages (level={}, topic={}, voice={})",
            messages.len(),
            settings.level.short_name(),
            settings.topic,
            settings.voice
        );

        Self {
            state: new_shared_state(ConversationState::restored(messages, settings)),
            store: ctx.store,
            credentials: ctx.credentials,
            tutor: ctx.tutor,
            playback: ctx.playback,
            recognition: ctx.recognition,
            slow_rate: ctx.audio.slow_rate,
        }
    }

    /// Handle to the shared state for rendering.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn messages(&self) -> Vec<Message> {
        lock_state(&self.state).messages.clone()
    }

    pub fn settings(&self) -> UserSettings {
        lock_state(&self.state).settings
    }

    pub fn is_loading(&self) -> bool {
        lock_state(&self.state).loading
    }

    pub fn phase(&self) -> TurnPhase {
        lock_state(&self.state).phase
    }

    pub fn topic_active(&self) -> bool {
        lock_state(&self.state).topic_active
    }

    pub fn currently_playing(&self) -> Option<PlaybackTarget> {
        self.playback.currently_playing()
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    /// Run one conversation turn.
    ///
    /// Only storage failures are returned as errors; tutor failures become an
    /// assistant notice and speech failures are silent.
    pub async fn handle_send(
        &self,
        text: &str,
        kind: SendKind,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        let Some(_turn) = self.begin_turn() else {
            log::debug!("conversation: turn already in flight, ignoring submission");
            return Ok(TurnOutcome::Busy);
        };
        self.run_turn(text, kind).await
    }

    /// Claim the single-turn guard, or `None` while another turn holds it.
    fn begin_turn(&self) -> Option<TurnGuard<'_>> {
        {
            let mut st = lock_state(&self.state);
            if st.loading {
                return None;
            }
            st.loading = true;
        }
        Some(TurnGuard { state: &self.state })
    }

    /// Turn body.  The caller holds the turn guard.
    ///
    /// The log epoch is captured up front; when a reset or rewind lands while
    /// the tutor is answering, the reply is dropped and nothing is played.
    async fn run_turn(&self, text: &str, kind: SendKind) -> Result<TurnOutcome, OrchestratorError> {
        let (history, settings, epoch) = {
            let mut st = lock_state(&self.state);
            let history = match kind {
                SendKind::Normal => history_from(&st.messages),
                SendKind::Initial => Vec::new(),
            };
            if kind == SendKind::Normal {
                st.phase = TurnPhase::AppendingUserMessage;
                self.append_locked(&mut st, Role::User, text, false)?;
                st.input.clear();
            }
            st.phase = TurnPhase::RequestingReply;
            (history, st.settings, st.log_epoch)
        };

        log::debug!(
            "conversation: requesting reply ({kind:?}, {} history turns)",
            history.len()
        );
        let reply = self
            .tutor
            .request_reply(text, &history, settings.level, settings.topic)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("conversation: reply failed: {e}");
                let mut st = lock_state(&self.state);
                if e.needs_credential() {
                    st.credential_required = true;
                }
                if st.log_epoch != epoch {
                    log::debug!("conversation: log changed during the turn, dropping error notice");
                    return Ok(TurnOutcome::Superseded);
                }
                st.phase = TurnPhase::AppendingErrorMessage;
                let message_id =
                    self.append_locked(&mut st, Role::Assistant, e.user_message(), false)?;
                return Ok(TurnOutcome::Failed { message_id });
            }
        };

        let (message_id, voice) = {
            let mut st = lock_state(&self.state);
            if st.log_epoch != epoch {
                log::debug!("conversation: log changed during the turn, dropping reply");
                return Ok(TurnOutcome::Superseded);
            }
            st.phase = TurnPhase::AppendingAssistantMessage;
            let id = self.append_locked(&mut st, Role::Assistant, &reply, true)?;
            st.phase = TurnPhase::RequestingSpeech;
            (id, st.settings.voice)
        };

        let Some(audio) = self.tutor.request_speech(&reply, voice).await else {
            return Ok(TurnOutcome::Completed {
                message_id,
                played: false,
            });
        };

        {
            let mut st = lock_state(&self.state);
            if st.log_epoch != epoch {
                log::debug!("conversation: log changed during synthesis, not playing");
                return Ok(TurnOutcome::Superseded);
            }
            st.phase = TurnPhase::Playing;
        }
        let played = self
            .playback
            .play(&audio, PlaybackTarget::Message(message_id), 1.0)
            .is_some();

        Ok(TurnOutcome::Completed { message_id, played })
    }

    /// Speak an assistant message again, or stop it if it is playing.
    pub async fn replay(&self, message_id: MessageId, slow: bool) -> PlaybackOutcome {
        let target = PlaybackTarget::Message(message_id);
        if self.playback.is_playing(target) {
            self.playback.stop();
            return PlaybackOutcome::Stopped;
        }

        let (content, voice) = {
            let mut st = lock_state(&self.state);
            let Some(message) = st
                .messages
                .iter()
                .find(|m| m.id == message_id && m.role == Role::Assistant && m.has_audio)
            else {
                return PlaybackOutcome::NotFound;
            };
            let content = message.content.clone();
            if st.loading {
                return PlaybackOutcome::Busy;
            }
            st.loading = true;
            st.phase = TurnPhase::RequestingSpeech;
            (content, st.settings.voice)
        };
        let _turn = TurnGuard { state: &self.state };

        let Some(audio) = self.tutor.request_speech(&content, voice).await else {
            return PlaybackOutcome::Unavailable;
        };

        let speed = if slow { self.slow_rate } else { 1.0 };
        lock_state(&self.state).phase = TurnPhase::Playing;
        match self.playback.play(&audio, target, speed) {
            Some(_) => PlaybackOutcome::Started,
            None => PlaybackOutcome::Unavailable,
        }
    }

    /// Play (or stop) the sample phrase in `voice`.
    pub async fn preview_voice(&self, voice: Voice) -> PlaybackOutcome {
        let target = PlaybackTarget::Preview(voice);
        if self.playback.is_playing(target) {
            self.playback.stop();
            return PlaybackOutcome::Stopped;
        }

        let Some(audio) = self.tutor.request_speech(PREVIEW_PHRASE, voice).await else {
            return PlaybackOutcome::Unavailable;
        };
        match self.playback.play(&audio, target, 1.0) {
            Some(_) => PlaybackOutcome::Started,
            None => PlaybackOutcome::Unavailable,
        }
    }

    pub fn stop_audio(&self) {
        self.playback.stop();
    }

    // -----------------------------------------------------------------------
    // Log and settings controls
    // -----------------------------------------------------------------------

    /// Drop `message_id` and everything after it.  Returns `false` (and
    /// changes nothing) when the id is not in the log.  A turn still waiting
    /// on the tutor is discarded when its reply arrives.
    pub fn restart_from_message(&self, message_id: MessageId) -> Result<bool, OrchestratorError> {
        let truncated = {
            let mut st = lock_state(&self.state);
            let Some(index) = st.messages.iter().position(|m| m.id == message_id) else {
                return Ok(false);
            };
            let prefix = st.messages[..index].to_vec();
            self.persist_log(&prefix)?;
            st.messages = prefix;
            st.log_epoch += 1;
            true
        };
        self.playback.stop();
        log::info!("conversation: rewound to before message {message_id}");
        Ok(truncated)
    }

    /// Start a fresh conversation about `topic` with a greeting turn.
    ///
    /// While a turn is in flight nothing changes and `Busy` is returned.
    pub async fn select_topic(&self, topic: Topic) -> Result<TurnOutcome, OrchestratorError> {
        let Some(_turn) = self.begin_turn() else {
            log::debug!("conversation: turn in flight, topic change ignored");
            return Ok(TurnOutcome::Busy);
        };
        self.playback.stop();

        let level = {
            let mut st = lock_state(&self.state);
            self.persist_log(&[])?;
            st.messages.clear();
            st.log_epoch += 1;

            let mut settings = st.settings;
            settings.topic = topic;
            self.persist_settings(&settings)?;
            st.settings = settings;
            st.topic_active = true;
            settings.level
        };
        log::info!("conversation: topic selected: {topic}");

        let greeting = format!(
            "Hi! Let's practice speaking about '{}' at a {} level. Shall we begin?",
            topic.display_name(),
            level.short_name()
        );
        self.run_turn(&greeting, SendKind::Initial).await
    }

    /// Persist `level`; announce it with a turn when a topic is active.
    ///
    /// With a topic active and a turn in flight, nothing changes and
    /// `Some(Busy)` is returned.
    pub async fn change_level(&self, level: Level) -> Result<Option<TurnOutcome>, OrchestratorError> {
        let announce = {
            let mut st = lock_state(&self.state);
            if st.topic_active && st.loading {
                log::debug!("conversation: turn in flight, level change ignored");
                return Ok(Some(TurnOutcome::Busy));
            }
            let mut settings = st.settings;
            settings.level = level;
            self.persist_settings(&settings)?;
            st.settings = settings;
            if st.topic_active {
                st.loading = true;
            }
            st.topic_active
        };
        log::info!("conversation: level changed to {}", level.short_name());

        if !announce {
            return Ok(None);
        }
        let _turn = TurnGuard { state: &self.state };
        let announcement = format!("Level changed to {}. Let's continue!", level.label());
        self.run_turn(&announcement, SendKind::Initial)
            .await
            .map(Some)
    }

    pub fn select_voice(&self, voice: Voice) -> Result<(), OrchestratorError> {
        let mut st = lock_state(&self.state);
        let mut settings = st.settings;
        settings.voice = voice;
        self.persist_settings(&settings)?;
        st.settings = settings;
        log::info!("conversation: voice set to {voice}");
        Ok(())
    }

    /// Clear the log and return to the topic picker.  A turn still waiting
    /// on the tutor is discarded when its reply arrives.
    pub fn reset_conversation(&self) -> Result<(), OrchestratorError> {
        self.playback.stop();
        let mut st = lock_state(&self.state);
        self.persist_log(&[])?;
        st.messages.clear();
        st.log_epoch += 1;
        st.topic_active = false;
        st.input.clear();
        log::info!("conversation: reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Credential
    // -----------------------------------------------------------------------

    /// Forget the stored API key; the front end should ask for a new one.
    pub fn change_credential(&self) -> Result<(), OrchestratorError> {
        self.playback.stop();
        self.credentials.clear()?;
        lock_state(&self.state).credential_required = true;
        log::info!("conversation: API key cleared");
        Ok(())
    }

    /// Validate and store a new API key.
    pub async fn submit_credential(
        &self,
        probe: &dyn CredentialProbe,
        candidate: &str,
    ) -> Result<(), CredentialError> {
        self.credentials.submit(probe, candidate).await?;
        lock_state(&self.state).credential_required = false;
        Ok(())
    }

    pub fn credential_required(&self) -> bool {
        let flagged = lock_state(&self.state).credential_required;
        flagged || !self.credentials.is_configured()
    }

    // -----------------------------------------------------------------------
    // Voice input
    // -----------------------------------------------------------------------

    /// Stop listening, or stop playback and start listening.
    pub fn toggle_listening(&self) -> Result<ListenOutcome, OrchestratorError> {
        if self.recognition.is_listening() {
            self.recognition.stop();
            return Ok(ListenOutcome::Stopping);
        }

        self.playback.stop();
        let language = {
            let mut st = lock_state(&self.state);
            st.interim.clear();
            st.input_language
        };
        self.recognition.start(language)?;
        Ok(ListenOutcome::Started(language))
    }

    pub fn toggle_input_language(&self) -> LanguageTag {
        let mut st = lock_state(&self.state);
        st.input_language = st.input_language.toggled();
        st.input_language
    }

    /// Apply one recognition event; a non-empty final result is sent as a
    /// normal turn.
    pub async fn handle_recognition(
        &self,
        event: RecognitionEvent,
    ) -> Result<RecognitionOutcome, OrchestratorError> {
        match event {
            RecognitionEvent::Started => {
                lock_state(&self.state).interim.clear();
                Ok(RecognitionOutcome::Updated)
            }
            RecognitionEvent::Interim(text) => {
                lock_state(&self.state).interim = text;
                Ok(RecognitionOutcome::Updated)
            }
            RecognitionEvent::FinalSegment(text) => {
                let mut st = lock_state(&self.state);
                st.input = text;
                st.interim.clear();
                Ok(RecognitionOutcome::Updated)
            }
            RecognitionEvent::Finished(text) => {
                lock_state(&self.state).interim.clear();
                if text.trim().is_empty() {
                    log::debug!("conversation: recognition ended without a result");
                    return Ok(RecognitionOutcome::NoResult);
                }
                let outcome = self.handle_send(&text, SendKind::Normal).await?;
                Ok(RecognitionOutcome::Submitted(outcome))
            }
            RecognitionEvent::Failed(e) => {
                lock_state(&self.state).interim.clear();
                Ok(match e.alert() {
                    Some(alert) => RecognitionOutcome::Alert(alert),
                    None => RecognitionOutcome::Ignored,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence helpers
    // -----------------------------------------------------------------------

    /// Append a message: persist the extended log, then commit it.
    fn append_locked(
        &self,
        st: &mut ConversationState,
        role: Role,
        content: &str,
        has_audio: bool,
    ) -> Result<MessageId, StoreError> {
        let id = st.ids.next();
        let mut next = st.messages.clone();
        next.push(Message {
            id,
            role,
            content: content.to_string(),
            created_at: now_millis(),
            has_audio,
        });

        self.persist_log(&next).inspect_err(|e| {
            log::error!("conversation: failed to persist message log: {e}");
        })?;
        st.messages = next;
        Ok(id)
    }

    fn persist_log(&self, log: &[Message]) -> Result<(), StoreError> {
        if log.is_empty() {
            return self.store.remove(TRANSCRIPT_KEY);
        }
        let json = serde_json::to_string(log)?;
        self.store.set(TRANSCRIPT_KEY, &json)
    }

    fn persist_settings(&self, settings: &UserSettings) -> Result<(), StoreError> {
        let json = serde_json::to_string(settings)?;
        self.store.set(SETTINGS_KEY, &json).inspect_err(|e| {
            log::error!("conversation: failed to persist settings: {e}");
        })
    }
}

/// Log entries in the tutor's role vocabulary.
fn history_from(messages: &[Message]) -> Vec<HistoryTurn> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => TutorRole::User,
                Role::Assistant => TutorRole::Model,
            };
            HistoryTurn::new(role, m.content.clone())
        })
        .collect()
}

fn restore_settings(store: &dyn KeyValueStore) -> UserSettings {
    let Some(raw) = store.get(SETTINGS_KEY) else {
        return UserSettings::default();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::warn!("conversation: ignoring unreadable saved settings: {e}");
        UserSettings::default()
    })
}

fn restore_log(store: &dyn KeyValueStore) -> Vec<Message> {
    let Some(raw) = store.get(TRANSCRIPT_KEY) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::warn!("conversation: ignoring unreadable saved transcript: {e}");
        Vec::new()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
