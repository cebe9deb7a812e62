//! AI Teacher: spoken English practice with a Gemini-backed tutor.
//!
//! ```text
//! mic ─▶ stt ─▶ conversation::Orchestrator ─▶ tutor (reply) ─▶ store
//!                         │                       │
//!                         └──────── audio ◀── tutor (speech)
//! ```

pub mod audio;
pub mod config;
pub mod conversation;
pub mod store;
pub mod stt;
pub mod tutor;
