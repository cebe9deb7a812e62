//! Conversation domain: the message log, the learner's settings and the
//! orchestrator that runs each turn.
//!
//! * [`model`]: plain data: [`Level`], [`Topic`], [`Voice`], [`Message`].
//! * [`state`]: [`TurnPhase`] and the [`SharedState`] read by front ends.
//! * [`orchestrator`]: [`Orchestrator`], the only writer of that state.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ai_teacher::audio::{CpalOutput, PlaybackEngine};
//! use ai_teacher::config::AppConfig;
//! use ai_teacher::conversation::{AppContext, Orchestrator, SendKind, Topic};
//! use ai_teacher::store::{CredentialStore, KeyValueStore, MemoryStore};
//! use ai_teacher::stt::RecognitionBridge;
//! use ai_teacher::tutor::GeminiTutor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
//!     let credentials = CredentialStore::new(Arc::clone(&store));
//!     let tutor = GeminiTutor::from_config(&config.gemini, credentials.clone());
//!     let (bridge, _events) = RecognitionBridge::new(None);
//!
//!     let orchestrator = Orchestrator::start(AppContext {
//!         store,
//!         credentials,
//!         tutor: Arc::new(tutor),
//!         playback: PlaybackEngine::new(Arc::new(CpalOutput::new())),
//!         recognition: Arc::new(bridge),
//!         audio: config.audio.clone(),
//!     });
//!
//!     orchestrator.select_topic(Topic::Restaurant).await.unwrap();
//!     orchestrator.handle_send("A table for two, please.", SendKind::Normal).await.unwrap();
//! }
//! ```

pub mod model;
pub mod orchestrator;
pub mod state;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use model::{
    now_millis, Level, Message, MessageId, MessageIdGenerator, Role, Topic, UserSettings, Voice,
};
pub use orchestrator::{
    AppContext, ListenOutcome, Orchestrator, OrchestratorError, PlaybackOutcome,
    RecognitionOutcome, SendKind, TurnOutcome, PREVIEW_PHRASE,
};
pub use state::{lock_state, new_shared_state, ConversationState, SharedState, TurnPhase};
