//! PCM format normalization and utterance buffering.
//!
//! Every chunk leaving this module is in the fixed target format the detector
//! and recognizer require: 16 kHz, 16-bit signed little-endian, mono.

/// Target sample rate for detection and recognition.
pub const TARGET_RATE: u32 = 16_000;

/// Target channel count for detection and recognition.
pub const TARGET_CHANNELS: u16 = 1;

/// Bytes per sample in the target format (16-bit).
pub const BYTES_PER_SAMPLE: usize = 2;

mod buffer;
mod format;
mod resample;

pub use buffer::UtteranceBuffer;
pub use format::{normalize, AudioChunk, DeviceFormat, NormalizedChunk};
