//! Voice activity detection: the per-frame speech/silence verdict.
//!
//! Classification always happens after normalization so every detector sees
//! the target format. A detector failure is never mapped to a default verdict:
//! treating it as silence could erase an in-progress utterance and treating it
//! as speech would never flush, so the error propagates to the session.

use crate::config::{PipelineConfig, VadEngineKind};
use crate::error::PipelineError;

/// Per-frame speech classifier over target-format PCM bytes.
pub trait SpeechDetector: Send {
    /// Returns `true` when the frame contains speech.
    fn classify(
        &mut self,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
    ) -> Result<bool, PipelineError>;

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "unknown_detector"
    }
}

// Lets a boxed detector from `create_detector` sit behind the same
// `Arc<Mutex<dyn SpeechDetector>>` handle as a concrete one.
impl SpeechDetector for Box<dyn SpeechDetector> {
    fn classify(
        &mut self,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
    ) -> Result<bool, PipelineError> {
        (**self).classify(pcm, sample_rate, channels)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// RMS energy detector. Used when earshot is disabled or unavailable.
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    threshold_db: f32,
}

impl EnergyDetector {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }
}

impl SpeechDetector for EnergyDetector {
    fn classify(
        &mut self,
        pcm: &[u8],
        _sample_rate: u32,
        channels: u16,
    ) -> Result<bool, PipelineError> {
        if channels != 1 {
            return Err(PipelineError::Detection(format!(
                "energy detector expects mono frames, got {channels} channels"
            )));
        }
        if pcm.is_empty() || pcm.len() % 2 != 0 {
            return Err(PipelineError::Detection(format!(
                "frame of {} bytes is not valid 16-bit PCM",
                pcm.len()
            )));
        }

        let mut energy = 0.0f32;
        let mut count = 0usize;
        for raw in pcm.chunks_exact(2) {
            let sample = f32::from(i16::from_le_bytes([raw[0], raw[1]])) / 32_768.0;
            energy += sample * sample;
            count += 1;
        }
        let rms = (energy / count as f32).sqrt().max(1e-6);
        let db = 20.0 * rms.log10();
        Ok(db >= self.threshold_db)
    }

    fn name(&self) -> &'static str {
        "energy_detector"
    }
}

/// Build the configured detector implementation.
pub fn create_detector(cfg: &PipelineConfig) -> Box<dyn SpeechDetector> {
    match cfg.vad_engine {
        VadEngineKind::Energy => Box::new(EnergyDetector::new(cfg.vad_threshold_db)),
        VadEngineKind::Earshot => {
            #[cfg(feature = "vad_earshot")]
            {
                Box::new(crate::vad_earshot::EarshotDetector::from_config(cfg))
            }
            #[cfg(not(feature = "vad_earshot"))]
            {
                unreachable!("earshot detector requested without 'vad_earshot' feature")
            }
        }
    }
}
