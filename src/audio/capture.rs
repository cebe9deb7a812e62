//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] opens the default input device; [`AudioCapture::start`]
//! streams mono [`AudioChunk`]s over an mpsc channel until the returned
//! [`StreamHandle`] is dropped.  Channels are downmixed inside the callback,
//! resampling to 16 kHz is left to the consumer.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::resample::stereo_to_mono;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One callback's worth of mono samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    /// Device rate in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// Keeps the input stream alive; dropping it stops capture.
///
/// Not `Send`: keep it on the thread that called [`AudioCapture::start`].
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

impl CaptureError {
    /// No usable microphone at all.
    pub fn is_missing_device(&self) -> bool {
        matches!(
            self,
            CaptureError::NoDevice
                | CaptureError::UnsupportedFormat(_)
                | CaptureError::BuildStream(cpal::BuildStreamError::DeviceNotAvailable)
                | CaptureError::DefaultConfig(cpal::DefaultStreamConfigError::DeviceNotAvailable)
        )
    }

    /// The backend refused to open or start the stream.  On desktop
    /// platforms this is how a denied microphone permission surfaces.
    pub fn is_access_refused(&self) -> bool {
        matches!(
            self,
            CaptureError::BuildStream(cpal::BuildStreamError::BackendSpecific { .. })
                | CaptureError::PlayStream(cpal::PlayStreamError::BackendSpecific { .. })
        )
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Default-microphone wrapper.
///
/// ```rust,no_run
/// use std::sync::mpsc;
/// use ai_teacher::audio::{AudioCapture, AudioChunk};
///
/// let (tx, rx) = mpsc::channel::<AudioChunk>();
/// let capture = AudioCapture::open().unwrap();
/// let _handle = capture.start(tx).unwrap();
/// let first = rx.recv().unwrap();
/// println!("{} samples @ {} Hz", first.samples.len(), first.sample_rate);
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the system default input device with its preferred config.
    pub fn open() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{:?}",
                supported.sample_format()
            )));
        }

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        if let Ok(name) = device.name() {
            log::debug!("capture: using input device '{name}' ({sample_rate} Hz, {channels} ch)");
        }

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start recording into `tx`.  Send errors (receiver gone) are ignored.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: stereo_to_mono(data, channels),
                    sample_rate,
                });
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
