//! Error taxonomy for the transcription pipeline.
//!
//! Every error carries an origin tag so caller-facing events can be filtered
//! by where they came from. Propagation rules differ per variant: format and
//! recognition errors are contained to a single chunk or utterance, detection
//! and capture errors tear the session down.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The chunk's declared PCM format is inconsistent or unsupported.
    /// The chunk is dropped; the session keeps running.
    Format(String),
    /// The voice activity detector failed. Fatal to the session: every chunk
    /// needs a verdict, and defaulting to either one corrupts the utterance.
    Detection(String),
    /// The recognizer failed on a flushed utterance. Non-fatal: the buffer
    /// was already reset, so only that utterance is lost.
    Recognition(String),
    /// Device enumeration failed. Non-fatal: refresh returns to idle.
    Enumeration(String),
    /// The capture provider failed or terminated the stream. Fatal to the
    /// session.
    Capture(String),
}

impl PipelineError {
    pub fn origin(&self) -> &'static str {
        match self {
            PipelineError::Format(_) => "format",
            PipelineError::Detection(_) => "detection",
            PipelineError::Recognition(_) => "recognition",
            PipelineError::Enumeration(_) => "enumeration",
            PipelineError::Capture(_) => "capture",
        }
    }

    fn message(&self) -> &str {
        match self {
            PipelineError::Format(msg)
            | PipelineError::Detection(msg)
            | PipelineError::Recognition(msg)
            | PipelineError::Enumeration(msg)
            | PipelineError::Capture(msg) => msg,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin(), self.message())
    }
}

impl std::error::Error for PipelineError {}
