//! Sample-rate conversion and channel mixing.
//!
//! Both directions of the audio path need it:
//!
//! * capture: device rate, N channels → **16 kHz mono** for Whisper, and
//! * playback: 24 kHz tutor speech (scaled by the playback speed) → device
//!   rate.
//!
//! Conversion uses linear interpolation.  Playback speed is expressed purely
//! as a different *source* rate, so slowing down also lowers the pitch.

/// Sample rate expected by the STT engine.
pub const STT_SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; `channels == 0` yields an
/// empty vector.
///
/// ```rust
/// use ai_teacher::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz.
///
/// Equal rates return a copy.  Output length is
/// `ceil(samples.len() * target_rate / source_rate)`.
///
/// ```rust
/// use ai_teacher::audio::resample;
///
/// // 24 kHz speech played at 0.75x on a 48 kHz device:
/// let speech = vec![0.0_f32; 2_400]; // 100 ms
/// let out = resample(&speech, 18_000, 48_000);
/// assert_eq!(out.len(), 6_400);      // 133 ms
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Resample to [`STT_SAMPLE_RATE`].
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    resample(samples, source_rate, STT_SAMPLE_RATE)
}

/// Effective source rate for playing `sample_rate` audio at `speed`.
///
/// Non-positive or non-finite speeds fall back to normal speed.
pub fn speed_adjusted_rate(sample_rate: u32, speed: f32) -> u32 {
    let speed = if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    };
    ((sample_rate as f64) * speed as f64).round().max(1.0) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
