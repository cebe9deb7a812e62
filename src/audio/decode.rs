//! Raw PCM decoding for synthesized speech.

use super::playback::PlaybackError;

/// Decode 16-bit little-endian signed mono PCM into `f32` samples in
/// `[-1.0, 1.0)`.
///
/// Empty input and an odd byte count are rejected.
///
/// ```rust
/// use ai_teacher::audio::decode_pcm16le;
///
/// let samples = decode_pcm16le(&[0x00, 0x40, 0x00, 0xC0]).unwrap();
/// assert_eq!(samples, vec![0.5, -0.5]);
/// ```
pub fn decode_pcm16le(bytes: &[u8]) -> Result<Vec<f32>, PlaybackError> {
    if bytes.is_empty() {
        return Err(PlaybackError::EmptyAudio);
    }
    if bytes.len() % 2 != 0 {
        return Err(PlaybackError::MisalignedPcm { len: bytes.len() });
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect())
}
