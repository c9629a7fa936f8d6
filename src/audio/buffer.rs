//! Accumulates target-format speech bytes between flushes.

/// Growable byte buffer holding one in-progress utterance.
///
/// Invariant: only bytes classified as speech are ever appended; the
/// transcription trigger enforces this. Access is single-threaded — the
/// owning capture session processes frames strictly in order.
#[derive(Debug)]
pub struct UtteranceBuffer {
    bytes: Vec<u8>,
    flush_threshold: usize,
}

impl UtteranceBuffer {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            bytes: Vec::new(),
            flush_threshold: flush_threshold.max(1),
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether a silence frame arriving now should trigger recognition.
    pub fn reached_threshold(&self) -> bool {
        self.bytes.len() >= self.flush_threshold
    }

    /// Atomically return all accumulated bytes and reset to empty.
    pub fn flush_and_reset(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}
