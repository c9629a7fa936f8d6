//! Earshot-powered speech detector implementing `SpeechDetector`.

use crate::audio::TARGET_RATE;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::vad::SpeechDetector;
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

// Earshot consumes 10/20/30 ms windows at 16 kHz; we feed it the largest one
// and pad or truncate the incoming frame to fit.
const EARSHOT_FRAME_SAMPLES: usize = 480;

pub struct EarshotDetector {
    detector: VoiceActivityDetector,
    scratch: Vec<i16>,
}

impl EarshotDetector {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let profile = match cfg.vad_threshold_db {
            t if t <= -50.0 => VoiceActivityProfile::VERY_AGGRESSIVE,
            t if t <= -40.0 => VoiceActivityProfile::AGGRESSIVE,
            t if t <= -30.0 => VoiceActivityProfile::LBR,
            _ => VoiceActivityProfile::QUALITY,
        };
        Self {
            detector: VoiceActivityDetector::new(profile),
            scratch: Vec::new(),
        }
    }
}

impl SpeechDetector for EarshotDetector {
    fn classify(
        &mut self,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
    ) -> Result<bool, PipelineError> {
        if sample_rate != TARGET_RATE || channels != 1 {
            return Err(PipelineError::Detection(format!(
                "earshot expects {TARGET_RATE}Hz mono, got {sample_rate}Hz/{channels}ch"
            )));
        }
        if pcm.is_empty() || pcm.len() % 2 != 0 {
            return Err(PipelineError::Detection(format!(
                "frame of {} bytes is not valid 16-bit PCM",
                pcm.len()
            )));
        }

        self.scratch.clear();
        self.scratch.reserve(EARSHOT_FRAME_SAMPLES);
        for raw in pcm.chunks_exact(2) {
            self.scratch.push(i16::from_le_bytes([raw[0], raw[1]]));
        }
        self.scratch.resize(EARSHOT_FRAME_SAMPLES, 0);

        self.detector
            .predict_16khz(&self.scratch)
            .map_err(|err| PipelineError::Detection(format!("earshot prediction failed: {err:?}")))
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_detector"
    }
}
