//! Per-frame flush policy and the caller-visible transcript log.

use crate::audio::{NormalizedChunk, UtteranceBuffer};
use crate::error::PipelineError;
use crate::log_debug_content;
use crate::stt::Recognizer;
use regex::Regex;
use std::sync::{Arc, Mutex, OnceLock};

/// Append-only sequence of recognized text, shared with the caller.
///
/// The capture worker appends while the caller snapshots for display; the
/// mutex makes both safe without exposing a mutable collection.
#[derive(Clone, Debug, Default)]
pub struct TranscriptLog {
    chunks: Arc<Mutex<Vec<String>>>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, text: String) {
        let mut chunks = self
            .chunks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        chunks.push(text);
    }

    /// Copy of the transcript so far, in append order.
    pub fn snapshot(&self) -> Vec<String> {
        self.chunks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.chunks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides, per classified frame, whether to buffer, flush-and-recognize, or
/// do nothing.
///
/// Policy: speech frames are appended; a silence frame flushes only once the
/// buffer holds at least the flush threshold, so an utterance spanning short
/// pauses is not fragmented while worst-case latency stays bounded at roughly
/// one second of audio. Silence below the threshold leaves the buffer intact;
/// only a flush resets it.
pub struct TranscriptionTrigger {
    buffer: UtteranceBuffer,
    log: TranscriptLog,
}

impl TranscriptionTrigger {
    pub fn new(flush_threshold_bytes: usize, log: TranscriptLog) -> Self {
        Self {
            buffer: UtteranceBuffer::new(flush_threshold_bytes),
            log,
        }
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Process one classified frame. Returns the transcript chunk appended to
    /// the log, if this frame triggered a successful recognition.
    ///
    /// The buffer is flushed before the recognizer runs, so a recognition
    /// error loses only the one utterance; the caller surfaces the error and
    /// keeps the session alive.
    pub fn on_frame(
        &mut self,
        frame: &NormalizedChunk,
        is_speech: bool,
        recognizer: &mut dyn Recognizer,
    ) -> Result<Option<String>, PipelineError> {
        if is_speech {
            self.buffer.append(frame.bytes());
            return Ok(None);
        }

        if !self.buffer.reached_threshold() {
            // Silence between speech bursts, or silence with an empty buffer.
            return Ok(None);
        }

        let utterance = self.buffer.flush_and_reset();
        let text = recognizer.recognize(&utterance)?;
        let cleaned = sanitize_transcript(&text);
        if cleaned.is_empty() {
            return Ok(None);
        }

        let chunk = cleaned.to_lowercase();
        log_debug_content(&format!("transcript chunk: {chunk}"));
        self.log.push(chunk.clone());
        Ok(Some(chunk))
    }
}

/// Strip whisper's non-speech markers and collapse whitespace. A result that
/// is empty after cleaning is discarded, never emitted.
fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background|wind blowing)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    let without_markers = re.replace_all(trimmed, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{normalize, AudioChunk, DeviceFormat};
    use std::collections::VecDeque;

    pub(crate) struct FakeRecognizer {
        pub script: VecDeque<Result<String, PipelineError>>,
        pub calls: Vec<Vec<u8>>,
    }

    impl FakeRecognizer {
        pub fn with(script: Vec<Result<String, PipelineError>>) -> Self {
            Self {
                script: script.into(),
                calls: Vec::new(),
            }
        }
    }

    impl Recognizer for FakeRecognizer {
        fn recognize(&mut self, pcm: &[u8]) -> Result<String, PipelineError> {
            self.calls.push(pcm.to_vec());
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn target_frame(len: usize) -> NormalizedChunk {
        let chunk = AudioChunk {
            bytes: vec![1u8; len],
            format: DeviceFormat::target(),
        };
        normalize(&chunk).expect("target-format frame")
    }

    fn trigger_with_threshold(threshold: usize) -> (TranscriptionTrigger, TranscriptLog) {
        let log = TranscriptLog::new();
        (TranscriptionTrigger::new(threshold, log.clone()), log)
    }

    #[test]
    fn speech_frames_accumulate_without_recognition() {
        let (mut trigger, log) = trigger_with_threshold(32_000);
        let mut recognizer = FakeRecognizer::with(vec![]);
        let frame = target_frame(1_024);

        for _ in 0..3 {
            let out = trigger.on_frame(&frame, true, &mut recognizer).unwrap();
            assert!(out.is_none());
        }
        assert_eq!(trigger.buffered_bytes(), 3_072);
        assert!(recognizer.calls.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn silence_below_threshold_keeps_buffer_intact() {
        let (mut trigger, _log) = trigger_with_threshold(32_000);
        let mut recognizer = FakeRecognizer::with(vec![]);

        // 31 000 bytes buffered, then silence: no flush.
        trigger
            .on_frame(&target_frame(31_000), true, &mut recognizer)
            .unwrap();
        let out = trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();
        assert!(out.is_none());
        assert_eq!(trigger.buffered_bytes(), 31_000);
        assert!(recognizer.calls.is_empty());
    }

    #[test]
    fn silence_at_threshold_flushes_and_resets() {
        let (mut trigger, log) = trigger_with_threshold(32_000);
        let mut recognizer = FakeRecognizer::with(vec![Ok("Hello World".into())]);

        // 32 500 bytes buffered, then silence: flush fires.
        trigger
            .on_frame(&target_frame(32_500), true, &mut recognizer)
            .unwrap();
        let out = trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();

        assert_eq!(out.as_deref(), Some("hello world"));
        assert_eq!(trigger.buffered_bytes(), 0);
        assert_eq!(recognizer.calls.len(), 1);
        assert_eq!(recognizer.calls[0].len(), 32_500);
        assert_eq!(log.snapshot(), vec!["hello world".to_string()]);
    }

    #[test]
    fn silence_with_empty_buffer_is_a_no_op() {
        let (mut trigger, log) = trigger_with_threshold(32_000);
        let mut recognizer = FakeRecognizer::with(vec![]);

        let out = trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();
        assert!(out.is_none());
        assert!(recognizer.calls.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn empty_recognition_result_is_discarded() {
        let (mut trigger, log) = trigger_with_threshold(1_000);
        let mut recognizer = FakeRecognizer::with(vec![Ok(String::new())]);

        trigger
            .on_frame(&target_frame(2_000), true, &mut recognizer)
            .unwrap();
        let out = trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();
        assert!(out.is_none());
        assert!(log.is_empty());
        // The flush still happened.
        assert_eq!(trigger.buffered_bytes(), 0);
    }

    #[test]
    fn non_speech_markers_are_discarded() {
        let (mut trigger, log) = trigger_with_threshold(1_000);
        let mut recognizer = FakeRecognizer::with(vec![Ok("[BLANK_AUDIO]".into())]);

        trigger
            .on_frame(&target_frame(2_000), true, &mut recognizer)
            .unwrap();
        let out = trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();
        assert!(out.is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn recognition_failure_propagates_after_the_buffer_reset() {
        let (mut trigger, log) = trigger_with_threshold(1_000);
        let mut recognizer =
            FakeRecognizer::with(vec![Err(PipelineError::Recognition("engine crashed".into()))]);

        trigger
            .on_frame(&target_frame(2_000), true, &mut recognizer)
            .unwrap();
        let err = trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap_err();
        assert_eq!(err.origin(), "recognition");
        // Only the one utterance is lost.
        assert_eq!(trigger.buffered_bytes(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn flushed_bytes_equal_sum_of_appended_speech() {
        let (mut trigger, _log) = trigger_with_threshold(4_000);
        let mut recognizer = FakeRecognizer::with(vec![Ok("ok".into())]);

        trigger
            .on_frame(&target_frame(1_500), true, &mut recognizer)
            .unwrap();
        // Sub-threshold silence does not disturb the buffer.
        trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();
        trigger
            .on_frame(&target_frame(2_500), true, &mut recognizer)
            .unwrap();
        trigger
            .on_frame(&target_frame(512), false, &mut recognizer)
            .unwrap();

        assert_eq!(recognizer.calls.len(), 1);
        assert_eq!(recognizer.calls[0].len(), 4_000);
    }

    #[test]
    fn sanitize_collapses_whitespace_and_markers() {
        assert_eq!(sanitize_transcript("  Hello   World  "), "Hello World");
        assert_eq!(sanitize_transcript("[noise] hi (laughter)"), "hi");
        assert_eq!(sanitize_transcript("   "), "");
    }
}
