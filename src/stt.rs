//! Speech recognition seam and the Whisper-backed implementation.
//!
//! The pipeline only needs `recognize(bytes) -> text` over target-format PCM;
//! `WhisperRecognizer` adapts `whisper_rs` to that contract. The model is
//! loaded once and reused across utterances.

use crate::error::PipelineError;

/// Recognizes target-format PCM bytes (16 kHz, 16-bit signed LE, mono).
pub trait Recognizer: Send {
    fn recognize(&mut self, pcm: &[u8]) -> Result<String, PipelineError>;
}

/// Decoding options forwarded to Whisper.
#[derive(Debug, Clone)]
pub struct RecognizerParams {
    pub lang: String,
    pub beam_size: u32,
    pub temperature: f32,
}

impl Default for RecognizerParams {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            beam_size: 0,
            temperature: 0.0,
        }
    }
}

#[cfg(unix)]
mod platform {
    use super::{Recognizer, RecognizerParams};
    use crate::error::PipelineError;
    use crate::log_debug;
    use anyhow::{anyhow, Context, Result};
    use std::io;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::os::unix::io::AsRawFd;
    use std::sync::Once;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Whisper model context. Create once at startup and reuse for every
    /// flushed utterance to avoid repeated model loading.
    pub struct WhisperRecognizer {
        ctx: WhisperContext,
        params: RecognizerParams,
    }

    impl WhisperRecognizer {
        /// Loads the Whisper model from disk.
        ///
        /// Temporarily redirects stderr to `/dev/null` during loading because
        /// whisper.cpp emits verbose initialization messages.
        pub fn new(model_path: &str, params: RecognizerParams) -> Result<Self> {
            install_whisper_log_silencer();

            let null = std::fs::OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .context("failed to open /dev/null")?;
            let null_fd = null.as_raw_fd();

            // SAFETY: dup(2) duplicates the stderr file descriptor. We restore
            // it after model loading completes and hold the only reference.
            let orig_stderr = unsafe { libc::dup(2) };
            if orig_stderr < 0 {
                return Err(anyhow!(
                    "failed to dup stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let dup_result = unsafe { libc::dup2(null_fd, 2) };
            if dup_result < 0 {
                unsafe {
                    libc::close(orig_stderr);
                }
                return Err(anyhow!(
                    "failed to redirect stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let ctx_result =
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default());

            let restore_result = unsafe { libc::dup2(orig_stderr, 2) };
            unsafe {
                libc::close(orig_stderr);
            }
            if restore_result < 0 {
                return Err(anyhow!(
                    "failed to restore stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let ctx = ctx_result.context("failed to load whisper model")?;
            Ok(Self { ctx, params })
        }

        fn transcribe(&self, samples: &[f32]) -> Result<String> {
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;
            let mut params = if self.params.beam_size > 1 {
                FullParams::new(SamplingStrategy::BeamSearch {
                    beam_size: self.params.beam_size as i32,
                    patience: -1.0,
                })
            } else {
                FullParams::new(SamplingStrategy::Greedy { best_of: 1 })
            };
            if self.params.lang.eq_ignore_ascii_case("auto") {
                params.set_language(None);
                params.set_detect_language(true);
            } else {
                params.set_language(Some(&self.params.lang));
                params.set_detect_language(false);
            }
            params.set_temperature(self.params.temperature);
            // Cap thread use so laptops don't max out all cores.
            params.set_n_threads(num_cpus::get().min(8) as i32);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            params.set_token_timestamps(false);
            state.full(params, samples)?;

            let mut transcript = String::new();
            let num_segments = match state.full_n_segments() {
                Ok(count) => count,
                Err(err) => {
                    log_debug(&format!("whisper failed to read segment count: {err}"));
                    return Ok(transcript);
                }
            };
            if num_segments < 0 {
                log_debug("whisper returned a negative segment count");
                return Ok(transcript);
            }
            // Whisper splits output into small segments; stitch them together.
            for i in 0..num_segments {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => transcript.push_str(&text),
                    Err(err) => log_debug(&format!("failed to read whisper segment {i}: {err}")),
                }
            }
            Ok(transcript)
        }
    }

    impl Recognizer for WhisperRecognizer {
        fn recognize(&mut self, pcm: &[u8]) -> Result<String, PipelineError> {
            if pcm.len() % 2 != 0 {
                return Err(PipelineError::Recognition(format!(
                    "utterance of {} bytes is not valid 16-bit PCM",
                    pcm.len()
                )));
            }
            let samples: Vec<f32> = pcm
                .chunks_exact(2)
                .map(|raw| f32::from(i16::from_le_bytes([raw[0], raw[1]])) / 32_768.0)
                .collect();
            self.transcribe(&samples)
                .map_err(|err| PipelineError::Recognition(format!("{err:#}")))
        }
    }

    fn install_whisper_log_silencer() {
        static INSTALL_LOG_CALLBACK: Once = Once::new();
        INSTALL_LOG_CALLBACK.call_once(|| unsafe {
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    #[allow(unused_variables)]
    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
        // Silence the default whisper.cpp logger so it does not corrupt the
        // caller's terminal.
    }
}

#[cfg(unix)]
pub use platform::WhisperRecognizer;

#[cfg(not(unix))]
mod platform {
    use super::{Recognizer, RecognizerParams};
    use crate::error::PipelineError;
    use anyhow::{anyhow, Result};

    /// Stub implementation for unsupported targets such as Windows.
    pub struct WhisperRecognizer;

    impl WhisperRecognizer {
        pub fn new(_: &str, _: RecognizerParams) -> Result<Self> {
            Err(anyhow!(
                "Whisper recognition is currently supported only on Unix-like platforms"
            ))
        }
    }

    impl Recognizer for WhisperRecognizer {
        fn recognize(&mut self, _: &[u8]) -> Result<String, PipelineError> {
            Err(PipelineError::Recognition(
                "Whisper recognition is currently supported only on Unix-like platforms".into(),
            ))
        }
    }
}

#[cfg(not(unix))]
pub use platform::WhisperRecognizer;
