//! Recognizer capability and the microphone + Whisper implementation.
//!
//! A [`Recognizer`] runs one non-continuous session per `start`: it listens
//! until the learner stops talking (or is told to stop), reports interim and
//! final text through its [`RecognitionSink`], and ends with exactly one
//! `Ended` or `Error` signal.
//!
//! [`MicRecognizer`] session thread:
//!
//! ```text
//! open mic ──▶ chunk ──▶ resample 16 kHz ──▶ UtteranceTracker
//!                 ▲            every ~1 s of new audio: Interim(whisper)
//!                 └── Listening ◀──┤
//!                                  └── Silence / MaxLength / stop()
//!                                        ──▶ trim ──▶ FinalSegment(whisper) ──▶ Ended
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crate::audio::{
    resample_to_16k, AudioCapture, AudioChunk, CaptureError, Endpoint, EndpointDetector,
    VadDetector, STT_SAMPLE_RATE,
};
use crate::config::SttConfig;

use super::bridge::{LanguageTag, RecognitionError, RecognitionSink, RecognizerSignal};
use super::engine::{SttEngine, MIN_AUDIO_SAMPLES};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Something that can run a recognition session.
pub trait Recognizer: Send + Sync {
    /// Begin a session.  Precondition failures (no device, access refused)
    /// are returned here rather than signalled.
    fn start(
        &self,
        language: LanguageTag,
        sink: RecognitionSink,
    ) -> Result<Box<dyn ActiveRecognition>, RecognitionError>;
}

/// A running session.
pub trait ActiveRecognition: Send {
    /// Finish early with whatever has been heard so far.  Idempotent.
    fn stop(&mut self);
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Recognizer>, _: Box<dyn ActiveRecognition>) {}
};

// ---------------------------------------------------------------------------
// UtteranceTracker
// ---------------------------------------------------------------------------

/// Interim passes run after this much new audio (1 s at 16 kHz).
const INTERIM_STEP_SAMPLES: usize = STT_SAMPLE_RATE as usize;

/// Collects 16 kHz audio for one utterance and decides when it is over.
pub struct UtteranceTracker {
    vad: VadDetector,
    endpoint: EndpointDetector,
    audio: Vec<f32>,
    since_interim: usize,
}

impl UtteranceTracker {
    pub fn new(config: &SttConfig) -> Self {
        let vad = VadDetector::new(config.vad_threshold);
        Self {
            vad,
            endpoint: EndpointDetector::new(
                vad,
                u64::from(config.silence_ms),
                u64::from(config.max_utterance_secs),
            ),
            audio: Vec::new(),
            since_interim: 0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Endpoint {
        self.audio.extend_from_slice(samples);
        self.since_interim += samples.len();
        self.endpoint.feed(samples)
    }

    /// `true` once per [`INTERIM_STEP_SAMPLES`] of new audio after voice was
    /// first heard.
    pub fn interim_due(&mut self) -> bool {
        if self.endpoint.heard_voice() && self.since_interim >= INTERIM_STEP_SAMPLES {
            self.since_interim = 0;
            true
        } else {
            false
        }
    }

    /// The utterance without leading/trailing silence, or `None` when it is
    /// too short to transcribe.
    pub fn speech(&self) -> Option<&[f32]> {
        let speech = self.vad.trim_silence(&self.audio);
        (speech.len() >= MIN_AUDIO_SAMPLES).then_some(speech)
    }
}

// ---------------------------------------------------------------------------
// MicRecognizer
// ---------------------------------------------------------------------------

/// Default microphone + [`SttEngine`].
pub struct MicRecognizer {
    engine: Arc<dyn SttEngine>,
    config: SttConfig,
}

impl MicRecognizer {
    pub fn new(engine: Arc<dyn SttEngine>, config: SttConfig) -> Self {
        Self { engine, config }
    }
}

impl Recognizer for MicRecognizer {
    fn start(
        &self,
        language: LanguageTag,
        sink: RecognitionSink,
    ) -> Result<Box<dyn ActiveRecognition>, RecognitionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), RecognitionError>>();

        let session = MicSession {
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            language,
            sink,
            stop: Arc::clone(&stop),
        };

        std::thread::Builder::new()
            .name("ai-teacher-stt".into())
            .spawn(move || session.run(ready_tx))
            .map_err(|e| RecognitionError::Failed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(MicHandle { stop })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RecognitionError::Failed(
                "recognition thread exited before starting".into(),
            )),
        }
    }
}

struct MicHandle {
    stop: Arc<AtomicBool>,
}

impl ActiveRecognition for MicHandle {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

struct MicSession {
    engine: Arc<dyn SttEngine>,
    config: SttConfig,
    language: LanguageTag,
    sink: RecognitionSink,
    stop: Arc<AtomicBool>,
}

impl MicSession {
    fn run(self, ready: mpsc::Sender<Result<(), RecognitionError>>) {
        const POLL: Duration = Duration::from_millis(100);

        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let stream = AudioCapture::open().and_then(|capture| capture.start(tx));
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(recognition_error(&e)));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        self.sink.emit(RecognizerSignal::Started);

        let mut tracker = UtteranceTracker::new(&self.config);
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if !self.sink.is_current() {
                log::debug!("stt: session superseded, abandoning capture");
                return;
            }

            let chunk = match rx.recv_timeout(POLL) {
                Ok(chunk) => chunk,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.sink.emit(RecognizerSignal::Error(RecognitionError::Failed(
                        "input stream closed".into(),
                    )));
                    return;
                }
            };

            let endpoint = tracker.push(&resample_to_16k(&chunk.samples, chunk.sample_rate));
            if endpoint != Endpoint::Listening {
                log::debug!("stt: utterance ended ({endpoint:?})");
                break;
            }

            if tracker.interim_due() {
                if let Some(speech) = tracker.speech() {
                    match self.engine.transcribe(speech, self.language.whisper_code()) {
                        Ok(text) if !text.is_empty() => {
                            self.sink.emit(RecognizerSignal::Interim(text));
                        }
                        Ok(_) => {}
                        Err(e) => log::debug!("stt: interim pass failed: {e}"),
                    }
                }
            }
        }
        drop(stream);

        if let Some(speech) = tracker.speech() {
            match self.engine.transcribe(speech, self.language.whisper_code()) {
                Ok(text) => {
                    if !text.is_empty() {
                        self.sink.emit(RecognizerSignal::FinalSegment(text));
                    }
                }
                Err(e) => {
                    self.sink
                        .emit(RecognizerSignal::Error(RecognitionError::Failed(e.to_string())));
                    return;
                }
            }
        }
        self.sink.emit(RecognizerSignal::Ended);
    }
}

fn recognition_error(e: &CaptureError) -> RecognitionError {
    if e.is_missing_device() {
        RecognitionError::Unsupported(e.to_string())
    } else if e.is_access_refused() {
        RecognitionError::PermissionDenied
    } else {
        RecognitionError::Failed(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
