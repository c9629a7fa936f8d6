//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use defaults::{
    default_vad_engine, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FLUSH_THRESHOLD_MS,
    DEFAULT_FRAME_SAMPLES, DEFAULT_RUN_SECONDS, DEFAULT_VAD_THRESHOLD_DB,
};

use crate::audio::TARGET_RATE;

/// CLI options for the voxgate transcription controller.
#[derive(Debug, Parser, Clone)]
#[command(about = "voxgate: voice-activity-gated streaming transcription", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Path to the Whisper GGML model file
    #[arg(long = "model-path", env = "VOXGATE_MODEL")]
    pub model_path: Option<PathBuf>,

    /// Language passed to Whisper ("auto" for detection)
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Whisper beam size (>1 enables beam search)
    #[arg(long = "whisper-beam-size", default_value_t = 0)]
    pub whisper_beam_size: u32,

    /// Whisper temperature
    #[arg(long = "whisper-temperature", default_value_t = 0.0)]
    pub whisper_temperature: f32,

    /// How long to run the capture session before shutting down (seconds)
    #[arg(long, default_value_t = DEFAULT_RUN_SECONDS)]
    pub seconds: u64,

    /// Detector frame width requested from the capture provider (samples)
    #[arg(long = "frame-samples", default_value_t = DEFAULT_FRAME_SAMPLES)]
    pub frame_samples: usize,

    /// Buffered speech required before a silence frame triggers a flush (milliseconds)
    #[arg(long = "flush-threshold-ms", default_value_t = DEFAULT_FLUSH_THRESHOLD_MS)]
    pub flush_threshold_ms: u64,

    /// Frame channel capacity between the capture callback and the session worker
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Voice activity detector implementation to use
    #[arg(long = "vad-engine", value_enum, default_value_t = default_vad_engine())]
    pub vad_engine: VadEngineKind,

    /// Voice activity detection threshold (decibels, energy detector)
    #[arg(long = "vad-threshold-db", default_value_t = DEFAULT_VAD_THRESHOLD_DB)]
    pub vad_threshold_db: f32,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VOXGATE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VOXGATE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "VOXGATE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

impl AppConfig {
    /// Derive the validated tunables the pipeline components consume.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            frame_samples: self.frame_samples,
            flush_threshold_bytes: flush_threshold_bytes(self.flush_threshold_ms),
            channel_capacity: self.channel_capacity,
            vad_engine: self.vad_engine,
            vad_threshold_db: self.vad_threshold_db,
        }
    }
}

/// Convert a flush threshold in milliseconds to target-format bytes
/// (16-bit mono, so two bytes per sample).
pub fn flush_threshold_bytes(threshold_ms: u64) -> usize {
    ((u64::from(TARGET_RATE) * 2 * threshold_ms) / 1000) as usize
}

/// Tunable parameters for the capture + classify + flush pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub frame_samples: usize,
    pub flush_threshold_bytes: usize,
    pub channel_capacity: usize,
    pub vad_engine: VadEngineKind,
    pub vad_threshold_db: f32,
}

/// Available runtime-selectable VAD implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VadEngineKind {
    Earshot,
    Energy,
}

impl VadEngineKind {
    pub fn label(self) -> &'static str {
        match self {
            VadEngineKind::Earshot => "earshot",
            VadEngineKind::Energy => "energy",
        }
    }
}
