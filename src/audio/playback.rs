//! Single-slot speech playback.
//!
//! ```text
//! play(bytes, target, speed)
//!   │  stop current ──▶ decode PCM16LE ──▶ AudioOutput::start ──▶ install
//!   │
//!   └─ completion callback (output thread)
//!        generation == current? ──yes──▶ clear slot
//!                               ──no───▶ ignore (stale)
//! ```
//!
//! Every started output gets a fresh generation number.  A completion only
//! clears the slot when it carries the generation of the output that is
//! installed there, so a superseded output finishing late can never clear a
//! newer one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::decode::decode_pcm16le;
use super::resample::{resample, speed_adjusted_rate};
use crate::conversation::{MessageId, Voice};

/// Sample rate of synthesized speech.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio to play")]
    EmptyAudio,

    #[error("PCM16 payload has odd length {len}")]
    MisalignedPcm { len: usize },

    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("playback thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// Targets and handles
// ---------------------------------------------------------------------------

/// What the audio in the slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackTarget {
    /// Speech of a logged assistant message.
    Message(MessageId),
    /// A voice sample from the voice picker.
    Preview(Voice),
}

/// Returned when an output actually started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHandle {
    pub target: PlaybackTarget,
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// Output seam
// ---------------------------------------------------------------------------

/// Invoked once when an output reaches the end of its samples.
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// A device that can play mono `f32` samples.
pub trait AudioOutput: Send + Sync {
    /// Begin playing `samples` recorded at `sample_rate`, sped up or slowed
    /// down by `speed` (pitch is not preserved).
    ///
    /// `on_complete` must be called after natural completion and must not be
    /// called after [`ActiveOutput::stop`].
    fn start(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        speed: f32,
        on_complete: CompletionFn,
    ) -> Result<Box<dyn ActiveOutput>, PlaybackError>;
}

/// A started output.
pub trait ActiveOutput: Send {
    /// Halt and release the output.  Idempotent.
    fn stop(&mut self);
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioOutput>, _: Box<dyn ActiveOutput>) {}
};

// ---------------------------------------------------------------------------
// PlaybackEngine
// ---------------------------------------------------------------------------

struct ActiveSlot {
    generation: u64,
    target: PlaybackTarget,
    output: Box<dyn ActiveOutput>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    current: Option<ActiveSlot>,
    /// Generation that completed before `play` got to install it.
    finished_early: Option<u64>,
}

/// Owns the one-and-only playback slot.  Cheap to clone.
#[derive(Clone)]
pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    sample_rate: u32,
    slot: Arc<Mutex<Slot>>,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self::with_sample_rate(output, SPEECH_SAMPLE_RATE)
    }

    pub fn with_sample_rate(output: Arc<dyn AudioOutput>, sample_rate: u32) -> Self {
        Self {
            output,
            sample_rate,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Stop whatever is playing and play `audio` (PCM16LE mono).
    ///
    /// Returns `None` when nothing was played: undecodable audio, a device
    /// failure, or a concurrent `play` that superseded this one.
    pub fn play(&self, audio: &[u8], target: PlaybackTarget, speed: f32) -> Option<PlaybackHandle> {
        self.stop();

        let samples = match decode_pcm16le(audio) {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("playback: cannot decode audio for {target:?}: {e}");
                return None;
            }
        };

        let generation = {
            let mut slot = self.lock();
            slot.generation += 1;
            slot.generation
        };

        let weak = Arc::downgrade(&self.slot);
        let on_complete: CompletionFn = Box::new(move || finish(&weak, generation));

        let mut output = match self
            .output
            .start(samples, self.sample_rate, speed, on_complete)
        {
            Ok(output) => output,
            Err(e) => {
                log::warn!("playback: failed to start output for {target:?}: {e}");
                return None;
            }
        };

        let mut slot = self.lock();
        if slot.generation != generation {
            drop(slot);
            log::debug!("playback: {target:?} superseded before it was installed");
            output.stop();
            return None;
        }
        if slot.finished_early == Some(generation) {
            slot.finished_early = None;
            drop(slot);
            output.stop();
            return Some(PlaybackHandle { target, generation });
        }

        let previous = slot.current.replace(ActiveSlot {
            generation,
            target,
            output,
        });
        drop(slot);
        if let Some(mut previous) = previous {
            previous.output.stop();
        }

        log::debug!("playback: started {target:?} at {speed}x (generation {generation})");
        Some(PlaybackHandle { target, generation })
    }

    /// Halt the active output.  No-op when idle.
    pub fn stop(&self) {
        let active = self.lock().current.take();
        if let Some(mut active) = active {
            log::debug!("playback: stopping {:?}", active.target);
            active.output.stop();
        }
    }

    pub fn currently_playing(&self) -> Option<PlaybackTarget> {
        self.lock().current.as_ref().map(|active| active.target)
    }

    pub fn is_playing(&self, target: PlaybackTarget) -> bool {
        self.currently_playing() == Some(target)
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn finish(slot: &Weak<Mutex<Slot>>, generation: u64) {
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

    let is_current = guard
        .current
        .as_ref()
        .is_some_and(|active| active.generation == generation);

    if is_current {
        let active = guard.current.take();
        drop(guard);
        if let Some(mut active) = active {
            log::debug!("playback: {:?} finished", active.target);
            active.output.stop();
        }
    } else if guard.generation == generation {
        guard.finished_early = Some(generation);
    } else {
        log::debug!("playback: ignoring stale completion (generation {generation})");
    }
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// Plays on the default output device.
///
/// `cpal::Stream` is not `Send`, so each playback builds and owns its stream
/// on a dedicated thread and is stopped through a shared flag.
#[derive(Debug, Default)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for CpalOutput {
    fn start(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        speed: f32,
        on_complete: CompletionFn,
    ) -> Result<Box<dyn ActiveOutput>, PlaybackError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), PlaybackError>>();

        std::thread::Builder::new()
            .name("ai-teacher-playback".into())
            .spawn(move || {
                run_output_thread(samples, sample_rate, speed, stop_flag, ready_tx, on_complete)
            })
            .map_err(|e| PlaybackError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalPlayback { stop })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError::Thread(
                "playback thread exited before starting".into(),
            )),
        }
    }
}

struct CpalPlayback {
    stop: Arc<AtomicBool>,
}

impl ActiveOutput for CpalPlayback {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

struct OpenStream {
    stream: cpal::Stream,
    drained: Arc<AtomicBool>,
    duration: Duration,
}

fn open_stream(samples: Vec<f32>, sample_rate: u32, speed: f32) -> Result<OpenStream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;

    let supported = device.default_output_config()?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(PlaybackError::UnsupportedFormat(format!(
            "{:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels.max(1) as usize;
    let device_rate = config.sample_rate.0;

    let samples = resample(&samples, speed_adjusted_rate(sample_rate, speed), device_rate);
    let duration = Duration::from_millis(samples.len() as u64 * 1_000 / device_rate.max(1) as u64);

    let drained = Arc::new(AtomicBool::new(false));
    let drained_cb = Arc::clone(&drained);
    let mut position = 0usize;

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let sample = samples.get(position).copied().unwrap_or(0.0);
                frame.fill(sample);
                if position < samples.len() {
                    position += 1;
                } else {
                    drained_cb.store(true, Ordering::SeqCst);
                }
            }
        },
        |err: cpal::StreamError| {
            log::error!("playback: cpal stream error: {err}");
        },
        None,
    )?;
    stream.play()?;

    Ok(OpenStream {
        stream,
        drained,
        duration,
    })
}

fn run_output_thread(
    samples: Vec<f32>,
    sample_rate: u32,
    speed: f32,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), PlaybackError>>,
    on_complete: CompletionFn,
) {
    const POLL: Duration = Duration::from_millis(20);
    const GRACE: Duration = Duration::from_millis(500);

    let open = match open_stream(samples, sample_rate, speed) {
        Ok(open) => open,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let deadline = Instant::now() + open.duration + GRACE;
    while !open.drained.load(Ordering::SeqCst) && Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(POLL);
    }

    drop(open.stream);
    if !stop.load(Ordering::SeqCst) {
        on_complete();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
