//! WAV decoding into the canonical form the speaker encoder expects.
//!
//! Uploads are RIFF/WAVE, 16-bit PCM, mono or stereo. Anything else is
//! rejected before any state is touched. Output is mono f32 in [-1, 1]
//! at [`CANONICAL_SAMPLE_RATE`].

use thiserror::Error;

/// Sample rate the speaker encoder was trained on.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Shortest clip that can plausibly carry a spoken challenge phrase.
pub const MIN_DURATION_SECONDS: f64 = 0.5;

/// Longest clip accepted; challenge phrases are a few seconds of speech.
pub const MAX_DURATION_SECONDS: f64 = 15.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("malformed audio: {0}")]
    Malformed(&'static str),
    #[error("unsupported audio encoding: {0}")]
    Unsupported(&'static str),
    #[error("audio too short: minimum {MIN_DURATION_SECONDS} seconds")]
    TooShort,
    #[error("audio too long: maximum {MAX_DURATION_SECONDS} seconds")]
    TooLong,
}

struct WavFormat {
    channels: u16,
    sample_rate: u32,
}

/// Decode a WAV upload to canonical 16 kHz mono f32 samples.
///
/// # Errors
/// Returns [`AudioError`] if the container or sample format cannot be
/// decoded or the clip duration is out of bounds.
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(AudioError::Malformed("not a RIFF/WAVE container"));
    }

    let mut format: Option<WavFormat> = None;
    let mut data: Option<&[u8]> = None;

    // Walk the chunk list; chunks are word-aligned with a pad byte on odd sizes.
    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32_le(bytes, offset + 4)? as usize;
        let body_start = offset + 8;
        let body_end = body_start
            .checked_add(size)
            .ok_or(AudioError::Malformed("chunk size overflow"))?;
        if body_end > bytes.len() {
            return Err(AudioError::Malformed("truncated chunk"));
        }
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => format = Some(parse_fmt(body)?),
            b"data" => data = Some(body),
            _ => {}
        }

        offset = body_end + (size & 1);
    }

    let format = format.ok_or(AudioError::Malformed("missing fmt chunk"))?;
    let data = data.ok_or(AudioError::Malformed("missing data chunk"))?;

    let samples = decode_pcm16(data, format.channels)?;
    let frames = samples.len();
    let seconds = frames as f64 / f64::from(format.sample_rate);
    if seconds < MIN_DURATION_SECONDS {
        return Err(AudioError::TooShort);
    }
    if seconds > MAX_DURATION_SECONDS {
        return Err(AudioError::TooLong);
    }

    Ok(resample(&samples, format.sample_rate, CANONICAL_SAMPLE_RATE))
}

fn parse_fmt(body: &[u8]) -> Result<WavFormat, AudioError> {
    if body.len() < 16 {
        return Err(AudioError::Malformed("fmt chunk too small"));
    }
    let audio_format = read_u16_le(body, 0)?;
    if audio_format != 1 {
        return Err(AudioError::Unsupported("only PCM is accepted"));
    }
    let channels = read_u16_le(body, 2)?;
    if channels == 0 || channels > 2 {
        return Err(AudioError::Unsupported("only mono or stereo is accepted"));
    }
    let sample_rate = read_u32_le(body, 4)?;
    if !(8_000..=48_000).contains(&sample_rate) {
        return Err(AudioError::Unsupported("sample rate out of range"));
    }
    let bits_per_sample = read_u16_le(body, 14)?;
    if bits_per_sample != 16 {
        return Err(AudioError::Unsupported("only 16-bit samples are accepted"));
    }
    Ok(WavFormat {
        channels,
        sample_rate,
    })
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Result<u16, AudioError> {
    bytes
        .get(offset..offset + 2)
        .and_then(|slice| slice.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or(AudioError::Malformed("unexpected end of input"))
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Result<u32, AudioError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(AudioError::Malformed("unexpected end of input"))
}

/// Interleaved 16-bit PCM to mono f32, averaging channels.
fn decode_pcm16(data: &[u8], channels: u16) -> Result<Vec<f32>, AudioError> {
    let bytes_per_frame = usize::from(channels) * 2;
    if data.is_empty() || data.len() % bytes_per_frame != 0 {
        return Err(AudioError::Malformed("data chunk is not whole frames"));
    }

    let mut samples = Vec::with_capacity(data.len() / bytes_per_frame);
    for frame in data.chunks_exact(bytes_per_frame) {
        let mut acc = 0f32;
        for sample in frame.chunks_exact(2) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            acc += f32::from(value) / 32_768.0;
        }
        samples.push(acc / f32::from(channels));
    }
    Ok(samples)
}

/// Linear-interpolation resampler; sufficient for speech embeddings.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for index in 0..out_len {
        let position = index as f64 * ratio;
        let left = position.floor() as usize;
        let frac = (position - position.floor()) as f32;
        let a = samples[left.min(samples.len() - 1)];
        let b = samples[(left + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a minimal PCM16 WAV from raw frames.
    fn wav_bytes(sample_rate: u32, channels: u16, frames: &[i16]) -> Vec<u8> {
        let data_len = frames.len() * 2;
        let byte_rate = sample_rate * u32::from(channels) * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        for frame in frames {
            out.extend_from_slice(&frame.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_canonical_mono() {
        let frames: Vec<i16> = vec![0; 16_000];
        let samples = decode_wav(&wav_bytes(16_000, 1, &frames));
        assert_eq!(samples.map(|s| s.len()), Ok(16_000));
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        // One second of stereo where left = 16384 and right = -16384.
        let mut frames = Vec::new();
        for _ in 0..16_000 {
            frames.push(16_384i16);
            frames.push(-16_384i16);
        }
        let samples = decode_wav(&wav_bytes(16_000, 2, &frames)).expect("decode");
        assert_eq!(samples.len(), 16_000);
        assert!(samples.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn resamples_to_canonical_rate() {
        let frames: Vec<i16> = vec![0; 8_000];
        let samples = decode_wav(&wav_bytes(8_000, 1, &frames)).expect("decode");
        assert_eq!(samples.len(), 16_000);
    }

    #[test]
    fn rejects_non_wav_bytes() {
        assert_eq!(
            decode_wav(b"OggS this is not a wav"),
            Err(AudioError::Malformed("not a RIFF/WAVE container"))
        );
    }

    #[test]
    fn rejects_truncated_data_chunk() {
        let mut bytes = wav_bytes(16_000, 1, &vec![0i16; 16_000]);
        bytes.truncate(bytes.len() - 10);
        assert_eq!(
            decode_wav(&bytes),
            Err(AudioError::Malformed("truncated chunk"))
        );
    }

    #[test]
    fn rejects_unsupported_format_code() {
        let mut bytes = wav_bytes(16_000, 1, &vec![0i16; 16_000]);
        // Patch the fmt audio-format field (offset 20) to IEEE float.
        bytes[20] = 3;
        assert_eq!(
            decode_wav(&bytes),
            Err(AudioError::Unsupported("only PCM is accepted"))
        );
    }

    #[test]
    fn rejects_too_short_clip() {
        let frames: Vec<i16> = vec![0; 1_000];
        assert_eq!(
            decode_wav(&wav_bytes(16_000, 1, &frames)),
            Err(AudioError::TooShort)
        );
    }

    #[test]
    fn rejects_too_long_clip() {
        let frames: Vec<i16> = vec![0; 16_000 * 16];
        assert_eq!(
            decode_wav(&wav_bytes(16_000, 1, &frames)),
            Err(AudioError::TooLong)
        );
    }

    #[test]
    fn interpolation_preserves_constant_signal() {
        let samples = vec![0.5f32; 8_000];
        let out = resample(&samples, 8_000, 16_000);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }
}
