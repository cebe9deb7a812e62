//! Speech-to-text: voice input for the conversation.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ RecognitionBridge  (one session at a time, session-id filter) │
//! │        │ start(lang) / stop()              ▲ RecognitionSink   │
//! │        ▼                                   │                   │
//! │  Recognizer (trait) ── MicRecognizer ──────┘                   │
//! │                          │ cpal capture + UtteranceTracker     │
//! │                          ▼                                     │
//! │                     SttEngine (trait) ── WhisperEngine         │
//! └───────────────────────────────────────────────────────────────┘
//!          │ RecognitionEvent (tokio mpsc)
//!          ▼
//!    conversation orchestrator
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ai_teacher::config::{AppPaths, SttConfig};
//! use ai_teacher::stt::{LanguageTag, MicRecognizer, ModelPaths, RecognitionBridge, WhisperEngine};
//!
//! # async fn demo() {
//! let config = SttConfig::default();
//! let model = ModelPaths::resolve(&AppPaths::new(), &config);
//! let engine = WhisperEngine::load(&model.model_file, config.use_gpu).unwrap();
//! let recognizer = MicRecognizer::new(Arc::new(engine), config);
//!
//! let (bridge, mut events) = RecognitionBridge::new(Some(Arc::new(recognizer)));
//! bridge.start(LanguageTag::EnUs).unwrap();
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # }
//! ```

pub mod bridge;
pub mod engine;
pub mod model;
pub mod recognizer;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use bridge::{
    LanguageTag, RecognitionBridge, RecognitionError, RecognitionEvent, RecognitionSink,
    RecognizerSignal,
};
pub use engine::{SttEngine, SttError, WhisperEngine};
pub use model::{ModelPaths, MODEL_SOURCE_URL};
pub use recognizer::{ActiveRecognition, MicRecognizer, Recognizer, UtteranceTracker};
