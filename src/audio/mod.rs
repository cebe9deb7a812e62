//! Audio in and out.
//!
//! # Capture (speech recognition)
//!
//! ```text
//! Microphone → cpal callback → downmix → AudioChunk (mpsc)
//!           → resample_to_16k → EndpointDetector → trim_silence → STT
//! ```
//!
//! # Playback (tutor speech)
//!
//! ```text
//! PCM16LE bytes → decode_pcm16le → PlaybackEngine (single slot)
//!              → AudioOutput (CpalOutput: resample 24 kHz × speed → device)
//! ```

pub mod capture;
pub mod decode;
pub mod playback;
pub mod resample;
pub mod vad;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use decode::decode_pcm16le;
pub use playback::{
    ActiveOutput, AudioOutput, CompletionFn, CpalOutput, PlaybackEngine, PlaybackError,
    PlaybackHandle, PlaybackTarget, SPEECH_SAMPLE_RATE,
};
pub use resample::{resample, resample_to_16k, speed_adjusted_rate, stereo_to_mono, STT_SAMPLE_RATE};
pub use vad::{Endpoint, EndpointDetector, VadDetector};
