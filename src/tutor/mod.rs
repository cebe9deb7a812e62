//! Remote English tutor.
//!
//! This module provides:
//! * [`TutorClient`]: async trait for reply generation and speech synthesis.
//! * [`GeminiTutor`]: Gemini REST implementation (also the credential probe).
//! * [`PromptBuilder`]: builds the level/topic system instruction.
//! * [`speakable_text`]: extracts the part of a reply that is read aloud.
//! * [`TutorError`]: error variants for reply requests.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ai_teacher::config::AppConfig;
//! use ai_teacher::conversation::{Level, Topic};
//! use ai_teacher::store::{CredentialStore, MemoryStore};
//! use ai_teacher::tutor::{GeminiTutor, TutorClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
//!     let tutor = GeminiTutor::from_config(&config.gemini, credentials);
//!
//!     match tutor
//!         .request_reply("I go to park yesterday.", &[], Level::Beginner, Topic::General)
//!         .await
//!     {
//!         Ok(reply) => println!("{reply}"),
//!         Err(e) => eprintln!("{}", e.user_message()),
//!     }
//! }
//! ```

pub mod client;
pub mod gemini;
pub mod prompt;
pub mod speech;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{HistoryTurn, TutorClient, TutorError, TutorRole};
pub use gemini::GeminiTutor;
pub use prompt::{level_guidance, PromptBuilder};
pub use speech::{speakable_text, CORRECTION_MARKER, TRANSLATION_LABEL, TRANSLATION_MARKER};
