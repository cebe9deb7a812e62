//! Recognition session management.
//!
//! [`RecognitionBridge`] owns the single recognition slot and turns the raw
//! [`RecognizerSignal`]s of a [`Recognizer`] into [`RecognitionEvent`]s for
//! the conversation layer.
//!
//! ```text
//!  Recognizer thread ──signal──▶ RecognitionSink ──(session == current?)──▶ mpsc
//!                                     │                                   │
//!                                     ├─ Interim  → interim text          ▼
//!                                     ├─ Final    → final buffer      orchestrator
//!                                     └─ Ended    → Finished(buffer)
//! ```
//!
//! Every `start` opens a new session id.  Signals from an older session are
//! dropped, and each session delivers at most one terminal event
//! (`Finished` or `Failed`).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

use super::recognizer::{ActiveRecognition, Recognizer};

// ---------------------------------------------------------------------------
// LanguageTag
// ---------------------------------------------------------------------------

/// Input language for speech recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguageTag {
    #[default]
    EnUs,
    KoKr,
}

impl LanguageTag {
    /// BCP-47 tag, e.g. `"en-US"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageTag::EnUs => "en-US",
            LanguageTag::KoKr => "ko-KR",
        }
    }

    /// ISO-639-1 code understood by Whisper.
    pub fn whisper_code(&self) -> &'static str {
        match self {
            LanguageTag::EnUs => "en",
            LanguageTag::KoKr => "ko",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            LanguageTag::EnUs => LanguageTag::KoKr,
            LanguageTag::KoKr => LanguageTag::EnUs,
        }
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RecognitionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The platform refused microphone access.
    #[error("microphone access was denied")]
    PermissionDenied,

    /// No recognition capability (no model, no input device).
    #[error("speech recognition is unavailable: {0}")]
    Unsupported(String),

    /// Anything else that ended the session early.
    #[error("speech recognition failed: {0}")]
    Failed(String),
}

impl RecognitionError {
    /// Alert text for the learner, or `None` when the failure is silent.
    pub fn alert(&self) -> Option<&'static str> {
        match self {
            RecognitionError::PermissionDenied => Some(
                "마이크 권한이 거부되었습니다.\n\n해결 방법:\n\
                 1. 시스템 설정에서 이 앱의 마이크 접근을 허용\n\
                 2. 앱 다시 시작",
            ),
            RecognitionError::Unsupported(_) => Some(
                "이 환경은 음성 인식을 지원하지 않습니다. \
                 마이크 연결과 Whisper 모델 파일을 확인해 주세요.",
            ),
            RecognitionError::Failed(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signals and events
// ---------------------------------------------------------------------------

/// What a [`Recognizer`] reports about its own session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerSignal {
    Started,
    /// Provisional text for the words heard so far.
    Interim(String),
    /// A finalized piece of the utterance.
    FinalSegment(String),
    /// The recognizer finished (naturally or after `stop`).
    Ended,
    Error(RecognitionError),
}

/// What the conversation layer sees.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Started,
    /// Superseding provisional text; never persisted.
    Interim(String),
    /// The accumulated final text so far.
    FinalSegment(String),
    /// Terminal: trimmed accumulated final text, empty when nothing was
    /// recognized.
    Finished(String),
    /// Terminal.
    Failed(RecognitionError),
}

impl RecognitionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecognitionEvent::Finished(_) | RecognitionEvent::Failed(_))
    }
}

// ---------------------------------------------------------------------------
// Shared slot
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    session: u64,
    listening: bool,
    language: LanguageTag,
    interim: String,
    final_text: String,
    active: Option<Box<dyn ActiveRecognition>>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// RecognitionSink
// ---------------------------------------------------------------------------

/// Handed to a [`Recognizer`] for one session.
#[derive(Clone)]
pub struct RecognitionSink {
    session: u64,
    slot: Arc<Mutex<Slot>>,
    tx: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RecognitionSink {
    /// Deliver `signal`.  Returns `false` once the session is over or has
    /// been superseded; recognizers may stop early when that happens.
    pub fn emit(&self, signal: RecognizerSignal) -> bool {
        let mut slot = lock(&self.slot);
        if slot.session != self.session || !slot.listening {
            log::debug!("stt: dropping {signal:?} from stale session {}", self.session);
            return false;
        }

        let event = match signal {
            RecognizerSignal::Started => {
                slot.interim.clear();
                slot.final_text.clear();
                RecognitionEvent::Started
            }
            RecognizerSignal::Interim(text) => {
                slot.interim = text.clone();
                RecognitionEvent::Interim(text)
            }
            RecognizerSignal::FinalSegment(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !slot.final_text.is_empty() {
                        slot.final_text.push(' ');
                    }
                    slot.final_text.push_str(text);
                }
                slot.interim.clear();
                RecognitionEvent::FinalSegment(slot.final_text.clone())
            }
            RecognizerSignal::Ended => {
                slot.listening = false;
                slot.interim.clear();
                slot.active = None;
                RecognitionEvent::Finished(slot.final_text.trim().to_string())
            }
            RecognizerSignal::Error(e) => {
                slot.listening = false;
                slot.interim.clear();
                slot.active = None;
                log::warn!("stt: session {} failed: {e}", self.session);
                RecognitionEvent::Failed(e)
            }
        };
        drop(slot);

        let _ = self.tx.send(event);
        true
    }

    pub fn is_current(&self) -> bool {
        let slot = lock(&self.slot);
        slot.session == self.session && slot.listening
    }
}

// ---------------------------------------------------------------------------
// RecognitionBridge
// ---------------------------------------------------------------------------

/// Single-slot recognition manager.
pub struct RecognitionBridge {
    recognizer: Option<Arc<dyn Recognizer>>,
    slot: Arc<Mutex<Slot>>,
    tx: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RecognitionBridge {
    /// `recognizer = None` means the platform has no recognition capability;
    /// every `start` then fails with [`RecognitionError::Unsupported`].
    pub fn new(
        recognizer: Option<Arc<dyn Recognizer>>,
    ) -> (Self, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Self {
            recognizer,
            slot: Arc::new(Mutex::new(Slot::default())),
            tx,
        };
        (bridge, rx)
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Start a session, silently ending any prior one first.
    pub fn start(&self, language: LanguageTag) -> Result<(), RecognitionError> {
        let Some(recognizer) = self.recognizer.as_ref() else {
            return Err(RecognitionError::Unsupported(
                "no speech recognizer configured".into(),
            ));
        };

        let (session, previous) = {
            let mut slot = lock(&self.slot);
            let previous = slot.active.take();
            slot.session += 1;
            slot.listening = true;
            slot.language = language;
            slot.interim.clear();
            slot.final_text.clear();
            (slot.session, previous)
        };
        if let Some(mut previous) = previous {
            log::debug!("stt: superseding previous session");
            previous.stop();
        }

        let sink = RecognitionSink {
            session,
            slot: Arc::clone(&self.slot),
            tx: self.tx.clone(),
        };

        match recognizer.start(language, sink) {
            Ok(mut active) => {
                let mut slot = lock(&self.slot);
                if slot.session == session && slot.listening {
                    slot.active = Some(active);
                    log::info!("stt: listening ({language}), session {session}");
                } else {
                    drop(slot);
                    active.stop();
                }
                Ok(())
            }
            Err(e) => {
                let mut slot = lock(&self.slot);
                if slot.session == session {
                    slot.listening = false;
                }
                log::warn!("stt: failed to start recognition: {e}");
                Err(e)
            }
        }
    }

    /// Ask the active recognizer to finish.  Its terminal event still
    /// arrives.  No-op when idle.
    pub fn stop(&self) {
        let active = lock(&self.slot).active.take();
        if let Some(mut active) = active {
            log::debug!("stt: stop requested");
            active.stop();
        }
    }

    pub fn is_listening(&self) -> bool {
        lock(&self.slot).listening
    }

    pub fn interim_text(&self) -> String {
        lock(&self.slot).interim.clone()
    }

    /// Language of the current or most recent session.
    pub fn language(&self) -> LanguageTag {
        lock(&self.slot).language
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Keeps every sink so the test can drive sessions by hand.
    #[derive(Default)]
    struct ManualRecognizer {
        sinks: Mutex<Vec<RecognitionSink>>,
        languages: Mutex<Vec<LanguageTag>>,
        stops: Arc<AtomicUsize>,
        deny: AtomicBool,
    }

    struct ManualActive {
        stops: Arc<AtomicUsize>,
    }

    impl ActiveRecognition for ManualActive {
        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Recognizer for ManualRecognizer {
        fn start(
            &self,
            language: LanguageTag,
            sink: RecognitionSink,
        ) -> Result<Box<dyn ActiveRecognition>, RecognitionError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(RecognitionError::PermissionDenied);
            }
            sink.emit(RecognizerSignal::Started);
            self.sinks.lock().unwrap().push(sink);
            self.languages.lock().unwrap().push(language);
            Ok(Box::new(ManualActive {
                stops: Arc::clone(&self.stops),
            }))
        }
    }

    impl ManualRecognizer {
        fn sink(&self, index: usize) -> RecognitionSink {
            self.sinks.lock().unwrap()[index].clone()
        }
    }

    fn make_bridge() -> (
        Arc<ManualRecognizer>,
        RecognitionBridge,
        mpsc::UnboundedReceiver<RecognitionEvent>,
    ) {
        let recognizer = Arc::new(ManualRecognizer::default());
        let (bridge, rx) = RecognitionBridge::new(Some(recognizer.clone()));
        (recognizer, bridge, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RecognitionEvent>) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn session_accumulates_final_segments() {
        let (recognizer, bridge, mut rx) = make_bridge();
        bridge.start(LanguageTag::EnUs).unwrap();
        assert!(bridge.is_listening());

        let sink = recognizer.sink(0);
        sink.emit(RecognizerSignal::Interim("I went".into()));
        assert_eq!(bridge.interim_text(), "I went");
        sink.emit(RecognizerSignal::FinalSegment("I went to".into()));
        sink.emit(RecognizerSignal::FinalSegment(" the park ".into()));
        sink.emit(RecognizerSignal::Ended);

        assert_eq!(
            drain(&mut rx),
            vec![
                RecognitionEvent::Started,
                RecognitionEvent::Interim("I went".into()),
                RecognitionEvent::FinalSegment("I went to".into()),
                RecognitionEvent::FinalSegment("I went to the park".into()),
                RecognitionEvent::Finished("I went to the park".into()),
            ]
        );
        assert!(!bridge.is_listening());
        assert_eq!(bridge.interim_text(), "");
    }

    #[test]
    fn no_result_finishes_with_empty_text() {
        let (recognizer, bridge, mut rx) = make_bridge();
        bridge.start(LanguageTag::KoKr).unwrap();
        recognizer.sink(0).emit(RecognizerSignal::Ended);

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&RecognitionEvent::Finished(String::new())));
        assert_eq!(recognizer.languages.lock().unwrap()[0], LanguageTag::KoKr);
    }

    #[test]
    fn restarting_swallows_prior_session_events() {
        let (recognizer, bridge, mut rx) = make_bridge();
        bridge.start(LanguageTag::EnUs).unwrap();
        bridge.start(LanguageTag::EnUs).unwrap();
        assert_eq!(recognizer.stops.load(Ordering::SeqCst), 1);

        let old = recognizer.sink(0);
        assert!(!old.emit(RecognizerSignal::FinalSegment("stale".into())));
        assert!(!old.emit(RecognizerSignal::Ended));
        assert!(!old.is_current());

        recognizer.sink(1).emit(RecognizerSignal::Ended);
        let terminals: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(RecognitionEvent::is_terminal)
            .collect();
        assert_eq!(terminals, vec![RecognitionEvent::Finished(String::new())]);
    }

    #[test]
    fn error_is_the_only_terminal_event() {
        let (recognizer, bridge, mut rx) = make_bridge();
        bridge.start(LanguageTag::EnUs).unwrap();
        let sink = recognizer.sink(0);
        sink.emit(RecognizerSignal::Error(RecognitionError::Failed("device lost".into())));
        assert!(!sink.emit(RecognizerSignal::Ended));

        let terminals: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(RecognitionEvent::is_terminal)
            .collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], RecognitionEvent::Failed(_)));
    }

    #[test]
    fn stop_still_delivers_terminal_event() {
        let (recognizer, bridge, mut rx) = make_bridge();
        bridge.start(LanguageTag::EnUs).unwrap();
        bridge.stop();
        bridge.stop();
        assert_eq!(recognizer.stops.load(Ordering::SeqCst), 1);

        let sink = recognizer.sink(0);
        sink.emit(RecognizerSignal::FinalSegment("hello".into()));
        sink.emit(RecognizerSignal::Ended);
        assert_eq!(
            drain(&mut rx).last(),
            Some(&RecognitionEvent::Finished("hello".into()))
        );
    }

    #[test]
    fn start_errors_are_returned() {
        let (recognizer, bridge, _rx) = make_bridge();
        recognizer.deny.store(true, Ordering::SeqCst);
        assert_eq!(
            bridge.start(LanguageTag::EnUs),
            Err(RecognitionError::PermissionDenied)
        );
        assert!(!bridge.is_listening());
    }

    #[test]
    fn missing_recognizer_is_unsupported() {
        let (bridge, _rx) = RecognitionBridge::new(None);
        assert!(!bridge.is_available());
        assert!(matches!(
            bridge.start(LanguageTag::EnUs),
            Err(RecognitionError::Unsupported(_))
        ));
    }

    #[test]
    fn language_tags() {
        assert_eq!(LanguageTag::EnUs.as_str(), "en-US");
        assert_eq!(LanguageTag::KoKr.whisper_code(), "ko");
        assert_eq!(LanguageTag::EnUs.toggled(), LanguageTag::KoKr);
        assert_eq!(LanguageTag::KoKr.toggled(), LanguageTag::EnUs);
    }

    #[test]
    fn only_actionable_errors_alert() {
        assert!(RecognitionError::PermissionDenied.alert().is_some());
        assert!(RecognitionError::Unsupported("x".into()).alert().is_some());
        assert!(RecognitionError::Failed("x".into()).alert().is_none());
    }
}
