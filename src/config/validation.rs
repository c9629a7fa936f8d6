use super::defaults::{
    MAX_CHANNEL_CAPACITY, MAX_FLUSH_THRESHOLD_MS, MAX_FRAME_SAMPLES, MAX_RUN_SECONDS,
    MIN_CHANNEL_CAPACITY, MIN_FLUSH_THRESHOLD_MS, MIN_FRAME_SAMPLES,
};
use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before any component consumes them.
    pub fn validate(&self) -> Result<()> {
        if self.seconds == 0 || self.seconds > MAX_RUN_SECONDS {
            bail!(
                "--seconds must be between 1 and {MAX_RUN_SECONDS}, got {}",
                self.seconds
            );
        }
        if !(MIN_FRAME_SAMPLES..=MAX_FRAME_SAMPLES).contains(&self.frame_samples) {
            bail!(
                "--frame-samples must be between {MIN_FRAME_SAMPLES} and {MAX_FRAME_SAMPLES}, got {}",
                self.frame_samples
            );
        }
        if !(MIN_FLUSH_THRESHOLD_MS..=MAX_FLUSH_THRESHOLD_MS).contains(&self.flush_threshold_ms) {
            bail!(
                "--flush-threshold-ms must be between {MIN_FLUSH_THRESHOLD_MS} and {MAX_FLUSH_THRESHOLD_MS}, got {}",
                self.flush_threshold_ms
            );
        }
        if !(MIN_CHANNEL_CAPACITY..=MAX_CHANNEL_CAPACITY).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between {MIN_CHANNEL_CAPACITY} and {MAX_CHANNEL_CAPACITY}, got {}",
                self.channel_capacity
            );
        }
        if !(-120.0..=0.0).contains(&self.vad_threshold_db) {
            bail!(
                "--vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.vad_threshold_db
            );
        }
        if self.whisper_beam_size > 10 {
            bail!(
                "--whisper-beam-size must be between 0 and 10, got {}",
                self.whisper_beam_size
            );
        }
        if !(0.0..=5.0).contains(&self.whisper_temperature) {
            bail!(
                "--whisper-temperature must be between 0.0 and 5.0, got {}",
                self.whisper_temperature
            );
        }
        if !self.lang.eq_ignore_ascii_case("auto")
            && !(self.lang.len() == 2 && self.lang.chars().all(|c| c.is_ascii_lowercase()))
        {
            bail!(
                "--lang must be a two-letter language code or 'auto', got {:?}",
                self.lang
            );
        }
        if let Some(path) = &self.model_path {
            if !path.is_file() {
                bail!("--model-path does not point to a file: {}", path.display());
            }
        }

        #[cfg(not(feature = "vad_earshot"))]
        if matches!(self.vad_engine, super::VadEngineKind::Earshot) {
            bail!("--vad-engine earshot requires building with the 'vad_earshot' feature");
        }

        Ok(())
    }
}
