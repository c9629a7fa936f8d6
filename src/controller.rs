//! Top-level pipeline facade: one capture session plus the device refresh.
//!
//! Ties the two controllers together at the one point where they interact:
//! when a refresh reports an updated list, a selected device that is no
//! longer present (or whose native format changed) is deselected, which tears
//! the capture session down before anything captures from a stale descriptor.

use crate::config::PipelineConfig;
use crate::device::{CaptureProvider, Device, DeviceDirectory};
use crate::refresh::{DeviceRefreshController, RefreshOutcome};
use crate::session::{CaptureSessionController, PipelineEvent, SessionState};
use crate::stt::Recognizer;
use crate::trigger::TranscriptLog;
use crate::vad::SpeechDetector;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

pub struct TranscriptionController {
    session: CaptureSessionController,
    refresh: DeviceRefreshController,
    events_tx: Sender<PipelineEvent>,
    events_rx: Receiver<PipelineEvent>,
}

impl TranscriptionController {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        directory: Arc<dyn DeviceDirectory>,
        detector: Arc<Mutex<dyn SpeechDetector>>,
        recognizer: Arc<Mutex<dyn Recognizer>>,
        cfg: &PipelineConfig,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        let session =
            CaptureSessionController::new(provider, detector, recognizer, cfg, events_tx.clone());
        Self {
            session,
            refresh: DeviceRefreshController::new(directory),
            events_tx,
            events_rx,
        }
    }

    /// Events from the capture worker and refresh handling, in order.
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events_rx
    }

    pub fn select_device(&mut self, device: Option<Device>) {
        self.session.select_device(device);
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.session.selected_device()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn transcript(&self) -> TranscriptLog {
        self.session.transcript()
    }

    pub fn devices(&self) -> &[Device] {
        self.refresh.devices()
    }

    pub fn request_device_refresh(&mut self) -> bool {
        self.refresh.request_refresh()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.refresh.refresh_in_flight()
    }

    /// Collect a finished refresh, emit the matching event, and drop a
    /// selection that the new list no longer backs.
    pub fn poll_device_refresh(&mut self) -> Option<RefreshOutcome> {
        let outcome = self.refresh.poll()?;
        match &outcome {
            RefreshOutcome::Updated(devices) => {
                let selection_vanished = self
                    .session
                    .selected_device()
                    .is_some_and(|selected| !devices.contains(selected));
                if selection_vanished {
                    tracing::info!("selected device disappeared; stopping capture");
                    self.session.select_device(None);
                }
                let _ = self
                    .events_tx
                    .send(PipelineEvent::DevicesUpdated(devices.clone()));
            }
            RefreshOutcome::Unchanged => {}
            RefreshOutcome::Failed(err) => {
                let _ = self.events_tx.send(PipelineEvent::Error(err.clone()));
            }
        }
        Some(outcome)
    }

    pub fn shutdown(&mut self) {
        self.session.shutdown();
    }
}
