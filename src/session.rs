//! Capture session lifecycle: one device, one worker, one utterance buffer.
//!
//! The controller owns at most one capture worker at a time. Selecting a
//! device tears the previous worker down (join, not detach) before the new
//! one starts, so no two captures ever run concurrently and no task leaks.
//! The worker processes chunks strictly in arrival order: normalize, classify,
//! then buffer-or-flush, with the recognizer on the ingestion path. While
//! recognition runs no new chunks are pulled, and the capture provider drops
//! frames at the source — an explicit backpressure boundary.

use crate::audio::{normalize, AudioChunk, DeviceFormat, TARGET_CHANNELS, TARGET_RATE};
use crate::config::PipelineConfig;
use crate::device::{CaptureProvider, ChunkRead, Device};
use crate::error::PipelineError;
use crate::log_debug;
use crate::stt::Recognizer;
use crate::trigger::{TranscriptLog, TranscriptionTrigger};
use crate::vad::SpeechDetector;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
        }
    }
}

/// Why a capture worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// External teardown: deselection, device change, or shutdown.
    Cancelled,
    /// The provider terminated the stream.
    StreamEnded,
    /// The provider refused to open a stream.
    ProviderFailed,
    /// The detector failed; classification is required for every chunk.
    DetectorFailed,
}

impl StopCause {
    pub fn label(self) -> &'static str {
        match self {
            StopCause::Cancelled => "cancelled",
            StopCause::StreamEnded => "stream_ended",
            StopCause::ProviderFailed => "provider_failed",
            StopCause::DetectorFailed => "detector_failed",
        }
    }
}

/// Events delivered to the caller, in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started { device: String },
    Transcript(String),
    Error(PipelineError),
    DevicesUpdated(Vec<Device>),
    Stopped(StopCause),
}

struct Worker {
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the lifecycle of one active capture stream bound to one device.
pub struct CaptureSessionController {
    provider: Arc<dyn CaptureProvider>,
    detector: Arc<Mutex<dyn SpeechDetector>>,
    recognizer: Arc<Mutex<dyn Recognizer>>,
    transcript: TranscriptLog,
    events: Sender<PipelineEvent>,
    state: Arc<Mutex<SessionState>>,
    frame_samples: usize,
    flush_threshold_bytes: usize,
    selected: Option<Device>,
    worker: Option<Worker>,
}

impl CaptureSessionController {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        detector: Arc<Mutex<dyn SpeechDetector>>,
        recognizer: Arc<Mutex<dyn Recognizer>>,
        cfg: &PipelineConfig,
        events: Sender<PipelineEvent>,
    ) -> Self {
        Self {
            provider,
            detector,
            recognizer,
            transcript: TranscriptLog::new(),
            events,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            frame_samples: cfg.frame_samples,
            flush_threshold_bytes: cfg.flush_threshold_bytes,
            selected: None,
            worker: None,
        }
    }

    /// Handle to the append-only transcript, safe to read concurrently.
    pub fn transcript(&self) -> TranscriptLog {
        self.transcript.clone()
    }

    pub fn state(&self) -> SessionState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.selected.as_ref()
    }

    /// Bind the session to a device, or unbind with `None`.
    ///
    /// A different device (or `None`) first cancels and joins the running
    /// worker; buffered speech is discarded, never flushed. Re-selecting the
    /// currently bound device is a no-op.
    pub fn select_device(&mut self, device: Option<Device>) {
        if device == self.selected {
            return;
        }
        self.stop_worker();
        self.selected = device;
        if let Some(device) = self.selected.clone() {
            self.start_worker(device);
        }
    }

    /// Tear down the session for good. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_worker();
        self.selected = None;
    }

    fn start_worker(&mut self, device: Device) {
        set_state(&self.state, SessionState::Starting);
        tracing::info!(device = %device.name, "starting capture session");

        let stop_flag = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            provider: self.provider.clone(),
            device,
            frame_samples: self.frame_samples,
            flush_threshold_bytes: self.flush_threshold_bytes,
            detector: self.detector.clone(),
            recognizer: self.recognizer.clone(),
            transcript: self.transcript.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            stop_flag: stop_flag.clone(),
        };
        let handle = thread::spawn(move || run_worker(ctx));
        self.worker = Some(Worker { stop_flag, handle });
    }

    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        set_state(&self.state, SessionState::Stopping);
        worker.stop_flag.store(true, Ordering::Relaxed);
        if worker.handle.join().is_err() {
            log_debug("capture worker panicked during teardown");
        }
        // The worker writes Idle on exit, but when it already finished on its
        // own the Stopping write above lands after it. Settle on Idle.
        set_state(&self.state, SessionState::Idle);
    }
}

impl Drop for CaptureSessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn set_state(state: &Arc<Mutex<SessionState>>, next: SessionState) {
    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = next;
}

struct WorkerContext {
    provider: Arc<dyn CaptureProvider>,
    device: Device,
    frame_samples: usize,
    flush_threshold_bytes: usize,
    detector: Arc<Mutex<dyn SpeechDetector>>,
    recognizer: Arc<Mutex<dyn Recognizer>>,
    transcript: TranscriptLog,
    events: Sender<PipelineEvent>,
    state: Arc<Mutex<SessionState>>,
    stop_flag: Arc<AtomicBool>,
}

fn run_worker(ctx: WorkerContext) {
    let cause = run_capture_loop(&ctx);
    set_state(&ctx.state, SessionState::Idle);
    tracing::info!(
        device = %ctx.device.name,
        cause = cause.label(),
        "capture session stopped"
    );
    let _ = ctx.events.send(PipelineEvent::Stopped(cause));
}

fn run_capture_loop(ctx: &WorkerContext) -> StopCause {
    let mut stream = match ctx.provider.open(&ctx.device, ctx.frame_samples) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ctx.events.send(PipelineEvent::Error(err));
            return StopCause::ProviderFailed;
        }
    };

    set_state(&ctx.state, SessionState::Active);
    let _ = ctx.events.send(PipelineEvent::Started {
        device: ctx.device.name.clone(),
    });

    let mut trigger = TranscriptionTrigger::new(ctx.flush_threshold_bytes, ctx.transcript.clone());
    let format = ctx.device.format();
    let wait = chunk_wait(ctx.frame_samples, ctx.device.sample_rate);

    loop {
        // Cancellation is observed only between chunk-processing steps, so a
        // teardown never interrupts a half-applied normalize/classify/flush.
        if ctx.stop_flag.load(Ordering::Relaxed) {
            log_debug(&format!(
                "capture cancelled: {} buffered bytes discarded, {} chunks dropped at source",
                trigger.buffered_bytes(),
                stream.dropped_chunks()
            ));
            return StopCause::Cancelled;
        }

        match stream.read_chunk(wait) {
            Ok(ChunkRead::Chunk(bytes)) => {
                if let Some(cause) = process_chunk(ctx, &mut trigger, bytes, format) {
                    return cause;
                }
            }
            Ok(ChunkRead::Idle) => continue,
            Ok(ChunkRead::Closed) => {
                let _ = ctx.events.send(PipelineEvent::Error(PipelineError::Capture(
                    "capture stream ended unexpectedly".into(),
                )));
                return StopCause::StreamEnded;
            }
            Err(err) => {
                let _ = ctx.events.send(PipelineEvent::Error(err));
                return StopCause::StreamEnded;
            }
        }
    }
}

/// Normalize, classify, and disposition one chunk. Returns a stop cause only
/// for failures that break the session contract.
fn process_chunk(
    ctx: &WorkerContext,
    trigger: &mut TranscriptionTrigger,
    bytes: Vec<u8>,
    format: DeviceFormat,
) -> Option<StopCause> {
    let chunk = AudioChunk { bytes, format };
    let frame = match normalize(&chunk) {
        Ok(frame) => frame,
        Err(err) => {
            // Malformed chunk: drop it, keep the session running.
            let _ = ctx.events.send(PipelineEvent::Error(err));
            return None;
        }
    };

    let verdict = {
        let mut detector = ctx
            .detector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        detector.classify(frame.bytes(), TARGET_RATE, TARGET_CHANNELS)
    };
    let is_speech = match verdict {
        Ok(verdict) => verdict,
        Err(err) => {
            // No verdict means no safe disposition for this or any later
            // chunk; tear the session down.
            let _ = ctx.events.send(PipelineEvent::Error(err));
            return Some(StopCause::DetectorFailed);
        }
    };

    let outcome = {
        let mut recognizer = ctx
            .recognizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trigger.on_frame(&frame, is_speech, &mut *recognizer)
    };
    match outcome {
        Ok(Some(text)) => {
            let _ = ctx.events.send(PipelineEvent::Transcript(text));
        }
        Ok(None) => {}
        Err(err) => {
            // The utterance is already lost; capture continues.
            let _ = ctx.events.send(PipelineEvent::Error(err));
        }
    }
    None
}

/// How long one read waits for a chunk: roughly one frame at the device rate,
/// clamped so cancellation stays responsive.
fn chunk_wait(frame_samples: usize, sample_rate: u32) -> Duration {
    let ms = (frame_samples as u64 * 1_000) / u64::from(sample_rate.max(1));
    Duration::from_millis(ms.clamp(5, 100))
}
