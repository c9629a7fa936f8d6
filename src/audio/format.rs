//! Format normalization: device-native PCM in, target-format PCM out.

use super::resample::to_target_rate;
use super::{BYTES_PER_SAMPLE, TARGET_CHANNELS, TARGET_RATE};
use crate::error::PipelineError;

/// PCM format descriptor for a capture device. Immutable once enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub signed: bool,
    pub big_endian: bool,
}

impl DeviceFormat {
    /// The fixed format the detector and recognizer consume.
    pub fn target() -> Self {
        Self {
            sample_rate: TARGET_RATE,
            channels: TARGET_CHANNELS,
            bits_per_sample: 16,
            signed: true,
            big_endian: false,
        }
    }

    /// Bytes per interleaved frame (one sample for each channel).
    pub fn frame_stride(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample) / 8
    }
}

/// A raw byte chunk straight from the capture provider, tagged with the
/// producing device's format. Created per capture tick and consumed by
/// [`normalize`].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,
    pub format: DeviceFormat,
}

/// A byte chunk guaranteed to be in the target format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedChunk {
    bytes: Vec<u8>,
}

impl NormalizedChunk {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Convert a device-native chunk to 16 kHz 16-bit signed little-endian mono.
///
/// Pure with respect to the input. Rejects chunks whose declared format is
/// internally inconsistent; such chunks are dropped by the session without
/// stopping capture.
pub fn normalize(chunk: &AudioChunk) -> Result<NormalizedChunk, PipelineError> {
    let fmt = &chunk.format;
    validate_format(fmt)?;

    let stride = fmt.frame_stride();
    if chunk.bytes.len() % stride != 0 {
        return Err(PipelineError::Format(format!(
            "chunk of {} bytes is not a multiple of the {stride}-byte frame stride",
            chunk.bytes.len()
        )));
    }

    if *fmt == DeviceFormat::target() {
        return Ok(NormalizedChunk {
            bytes: chunk.bytes.clone(),
        });
    }

    let mono = decode_downmixed(&chunk.bytes, fmt);
    let resampled = to_target_rate(&mono, fmt.sample_rate);
    Ok(NormalizedChunk {
        bytes: encode_target(&resampled),
    })
}

fn validate_format(fmt: &DeviceFormat) -> Result<(), PipelineError> {
    if fmt.sample_rate == 0 {
        return Err(PipelineError::Format(
            "device format declares a zero sample rate".into(),
        ));
    }
    if fmt.channels == 0 {
        return Err(PipelineError::Format(
            "device format declares zero channels".into(),
        ));
    }
    if !matches!(fmt.bits_per_sample, 8 | 16 | 32) {
        return Err(PipelineError::Format(format!(
            "unsupported bit depth {}",
            fmt.bits_per_sample
        )));
    }
    Ok(())
}

/// Decode interleaved PCM to f32 and average each frame down to mono.
fn decode_downmixed(bytes: &[u8], fmt: &DeviceFormat) -> Vec<f32> {
    let sample_bytes = usize::from(fmt.bits_per_sample) / 8;
    let channels = usize::from(fmt.channels);
    let frames = bytes.len() / (sample_bytes * channels);
    let mut mono = Vec::with_capacity(frames);

    for frame in bytes.chunks_exact(sample_bytes * channels) {
        let mut acc = 0.0f32;
        for raw in frame.chunks_exact(sample_bytes) {
            acc += decode_sample(raw, fmt);
        }
        mono.push(acc / channels as f32);
    }
    mono
}

fn decode_sample(raw: &[u8], fmt: &DeviceFormat) -> f32 {
    match (fmt.bits_per_sample, fmt.signed) {
        (8, true) => f32::from(raw[0] as i8) / 128.0,
        (8, false) => (f32::from(raw[0]) - 128.0) / 128.0,
        (16, true) => {
            let v = if fmt.big_endian {
                i16::from_be_bytes([raw[0], raw[1]])
            } else {
                i16::from_le_bytes([raw[0], raw[1]])
            };
            f32::from(v) / 32_768.0
        }
        (16, false) => {
            let v = if fmt.big_endian {
                u16::from_be_bytes([raw[0], raw[1]])
            } else {
                u16::from_le_bytes([raw[0], raw[1]])
            };
            (f32::from(v) - 32_768.0) / 32_768.0
        }
        (32, true) => {
            let v = if fmt.big_endian {
                i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
            } else {
                i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
            };
            (v as f64 / 2_147_483_648.0) as f32
        }
        (32, false) => {
            let v = if fmt.big_endian {
                u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
            } else {
                u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
            };
            ((f64::from(v) - 2_147_483_648.0) / 2_147_483_648.0) as f32
        }
        // validate_format admits only the arms above
        _ => 0.0,
    }
}

fn encode_target(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        let v = (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
