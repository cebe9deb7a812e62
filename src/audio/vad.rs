//! Energy-based voice activity detection for 16 kHz mono audio.
//!
//! Two consumers:
//!
//! * [`VadDetector::trim_silence`] cuts leading/trailing silence before an
//!   utterance is transcribed (Whisper hallucinates on long quiet stretches).
//! * [`EndpointDetector`] decides, chunk by chunk, when the learner has
//!   finished speaking.
//!
//! A 30 ms frame (480 samples) counts as *voice* when its RMS exceeds the
//! threshold.

use super::resample::STT_SAMPLE_RATE;

/// 30 ms at 16 kHz.
const FRAME_SIZE: usize = 480;

// ---------------------------------------------------------------------------
// VadDetector
// ---------------------------------------------------------------------------

/// Frame classifier and silence trimmer.
///
/// ```rust
/// use ai_teacher::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 480]);
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct VadDetector {
    rms_threshold: f32,
}

impl VadDetector {
    /// `0.01` suits a quiet room; raise it in noisy environments.
    pub fn new(rms_threshold: f32) -> Self {
        Self { rms_threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    pub fn is_voice(&self, frame: &[f32]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }

    /// Sub-slice from the first to the last voice frame; empty when the whole
    /// clip is silent.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        let voiced: Vec<usize> = audio
            .chunks(FRAME_SIZE)
            .enumerate()
            .filter(|(_, frame)| self.is_voice(frame))
            .map(|(i, _)| i)
            .collect();

        match (voiced.first(), voiced.last()) {
            (Some(&first), Some(&last)) => {
                let start = first * FRAME_SIZE;
                let end = ((last + 1) * FRAME_SIZE).min(audio.len());
                &audio[start..end]
            }
            _ => &audio[0..0],
        }
    }
}

// ---------------------------------------------------------------------------
// EndpointDetector
// ---------------------------------------------------------------------------

/// Outcome of feeding one chunk to the [`EndpointDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Keep listening.
    Listening,
    /// Voice was heard and has been followed by enough trailing silence.
    Silence,
    /// The utterance hit the maximum length.
    MaxLength,
}

/// End-of-utterance detection over a stream of 16 kHz mono samples.
///
/// Leading silence never ends the utterance; only silence after the first
/// voice frame counts.  Partial frames are carried over between calls.
#[derive(Debug)]
pub struct EndpointDetector {
    vad: VadDetector,
    silence_frames_needed: usize,
    max_frames: usize,
    pending: Vec<f32>,
    frames: usize,
    trailing_silence: usize,
    heard_voice: bool,
}

impl EndpointDetector {
    pub fn new(vad: VadDetector, silence_ms: u64, max_utterance_secs: u64) -> Self {
        let frame_ms = (FRAME_SIZE as u64 * 1_000) / STT_SAMPLE_RATE as u64;
        Self {
            vad,
            silence_frames_needed: (silence_ms.div_ceil(frame_ms)).max(1) as usize,
            max_frames: ((max_utterance_secs * 1_000) / frame_ms).max(1) as usize,
            pending: Vec::with_capacity(FRAME_SIZE),
            frames: 0,
            trailing_silence: 0,
            heard_voice: false,
        }
    }

    pub fn heard_voice(&self) -> bool {
        self.heard_voice
    }

    pub fn feed(&mut self, samples: &[f32]) -> Endpoint {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / FRAME_SIZE * FRAME_SIZE;
        let mut verdict = Endpoint::Listening;

        for frame in self.pending[..complete].chunks_exact(FRAME_SIZE) {
            self.frames += 1;
            if self.vad.is_voice(frame) {
                self.heard_voice = true;
                self.trailing_silence = 0;
            } else if self.heard_voice {
                self.trailing_silence += 1;
            }

            if self.frames >= self.max_frames {
                verdict = Endpoint::MaxLength;
                break;
            }
            if self.heard_voice && self.trailing_silence >= self.silence_frames_needed {
                verdict = Endpoint::Silence;
                break;
            }
        }

        self.pending.drain(..complete);
        verdict
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(silent_pre: usize, voice: usize, silent_post: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; silent_pre];
        v.extend(vec![0.5_f32; voice]);
        v.extend(vec![0.0_f32; silent_post]);
        v
    }

    #[test]
    fn trims_both_ends() {
        let vad = VadDetector::new(0.01);
        assert_eq!(vad.trim_silence(&signal(480, 480, 480)).len(), 480);
    }

    #[test]
    fn all_silence_trims_to_empty() {
        let vad = VadDetector::new(0.01);
        assert!(vad.trim_silence(&vec![0.0_f32; 1_440]).is_empty());
        assert!(vad.trim_silence(&[]).is_empty());
    }

    #[test]
    fn leading_silence_never_ends_utterance() {
        let mut ep = EndpointDetector::new(VadDetector::new(0.01), 800, 30);
        assert_eq!(ep.feed(&vec![0.0_f32; 16_000 * 2]), Endpoint::Listening);
        assert!(!ep.heard_voice());
    }

    #[test]
    fn voice_then_silence_ends_utterance() {
        let mut ep = EndpointDetector::new(VadDetector::new(0.01), 800, 30);
        assert_eq!(ep.feed(&vec![0.5_f32; 8_000]), Endpoint::Listening);
        // 600 ms of silence is not enough.
        assert_eq!(ep.feed(&vec![0.0_f32; 9_600]), Endpoint::Listening);
        // Another 300 ms crosses 800 ms.
        assert_eq!(ep.feed(&vec![0.0_f32; 4_800]), Endpoint::Silence);
    }

    #[test]
    fn speech_resets_trailing_silence() {
        let mut ep = EndpointDetector::new(VadDetector::new(0.01), 800, 30);
        ep.feed(&vec![0.5_f32; 4_800]);
        ep.feed(&vec![0.0_f32; 9_600]);
        ep.feed(&vec![0.5_f32; 4_800]);
        assert_eq!(ep.feed(&vec![0.0_f32; 9_600]), Endpoint::Listening);
    }

    #[test]
    fn max_length_caps_utterance() {
        let mut ep = EndpointDetector::new(VadDetector::new(0.01), 800, 1);
        assert_eq!(ep.feed(&vec![0.5_f32; 16_000]), Endpoint::MaxLength);
    }

    #[test]
    fn partial_frames_carry_over() {
        let mut ep = EndpointDetector::new(VadDetector::new(0.01), 30, 30);
        assert_eq!(ep.feed(&vec![0.5_f32; 300]), Endpoint::Listening);
        assert!(!ep.heard_voice());
        ep.feed(&vec![0.5_f32; 300]);
        assert!(ep.heard_voice());
    }
}
