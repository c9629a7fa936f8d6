use super::VadEngineKind;

/// Detector window requested from the capture provider, in samples.
pub const DEFAULT_FRAME_SAMPLES: usize = 512;

/// One second of buffered speech before a silence frame triggers recognition.
pub const DEFAULT_FLUSH_THRESHOLD_MS: u64 = 1_000;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_VAD_THRESHOLD_DB: f32 = -55.0;

pub const DEFAULT_RUN_SECONDS: u64 = 30;

pub(super) const MIN_FRAME_SAMPLES: usize = 64;
pub(super) const MAX_FRAME_SAMPLES: usize = 8_192;
pub(super) const MIN_FLUSH_THRESHOLD_MS: u64 = 100;
pub(super) const MAX_FLUSH_THRESHOLD_MS: u64 = 10_000;
pub(super) const MIN_CHANNEL_CAPACITY: usize = 8;
pub(super) const MAX_CHANNEL_CAPACITY: usize = 1_024;
pub(super) const MAX_RUN_SECONDS: u64 = 600;

pub fn default_vad_engine() -> VadEngineKind {
    #[cfg(feature = "vad_earshot")]
    {
        VadEngineKind::Earshot
    }
    #[cfg(not(feature = "vad_earshot"))]
    {
        VadEngineKind::Energy
    }
}
