//! Device list refresh with single-flight debounce.
//!
//! Enumeration can block on platform audio services, so it runs on its own
//! short-lived thread. At most one refresh is in flight at a time: requests
//! made while one is running are coalesced into it rather than queued, which
//! keeps a burst of hotplug notifications from stacking up enumeration work.

use crate::device::{Device, DeviceDirectory};
use crate::error::PipelineError;
use crate::log_debug;
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Result of one completed refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The device list changed; this is the new list.
    Updated(Vec<Device>),
    /// Enumeration succeeded but nothing changed.
    Unchanged,
    /// Enumeration failed; the cached list is kept as-is.
    Failed(PipelineError),
}

struct RefreshJob {
    receiver: Receiver<Result<Vec<Device>, PipelineError>>,
    handle: JoinHandle<()>,
}

/// Owns the cached device list and the in-flight refresh, if any.
///
/// Not itself thread-safe: one owner calls `request_refresh` and `poll`, and
/// only the enumeration work runs off-thread.
pub struct DeviceRefreshController {
    directory: Arc<dyn DeviceDirectory>,
    devices: Vec<Device>,
    job: Option<RefreshJob>,
}

impl DeviceRefreshController {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self {
            directory,
            devices: Vec::new(),
            job: None,
        }
    }

    /// Last successfully enumerated device list.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.job.is_some()
    }

    /// Kick off a refresh unless one is already running. Returns whether a
    /// new enumeration was started.
    pub fn request_refresh(&mut self) -> bool {
        if self.job.is_some() {
            log_debug("device refresh already in flight; request coalesced");
            return false;
        }
        tracing::info!("starting device refresh");
        let directory = self.directory.clone();
        let (sender, receiver) = bounded(1);
        let handle = thread::spawn(move || {
            let _ = sender.send(directory.list());
        });
        self.job = Some(RefreshJob { receiver, handle });
        true
    }

    /// Collect the in-flight refresh if it finished. Non-blocking; returns
    /// `None` while enumeration is still running (or none was requested).
    pub fn poll(&mut self) -> Option<RefreshOutcome> {
        let job = self.job.as_ref()?;
        let result = match job.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(PipelineError::Enumeration("refresh worker died".into()))
            }
        };

        let job = self.job.take()?;
        if job.handle.join().is_err() {
            log_debug("device refresh worker panicked");
        }

        let outcome = match result {
            Ok(devices) if devices == self.devices => RefreshOutcome::Unchanged,
            Ok(devices) => {
                tracing::info!(count = devices.len(), "device list updated");
                self.devices = devices.clone();
                RefreshOutcome::Updated(devices)
            }
            Err(err) => {
                tracing::warn!(error = %err, "device refresh failed");
                RefreshOutcome::Failed(err)
            }
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    fn device(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sample_rate: 48_000,
            channels: 2,
            bits_per_sample: 16,
            signed: true,
            big_endian: false,
        }
    }

    /// Directory whose `list` blocks until the test releases it.
    struct GatedDirectory {
        gate: Mutex<bool>,
        released: Condvar,
        lists: AtomicUsize,
        devices: Vec<Device>,
    }

    impl GatedDirectory {
        fn new(devices: Vec<Device>) -> Arc<Self> {
            Arc::new(Self {
                gate: Mutex::new(false),
                released: Condvar::new(),
                lists: AtomicUsize::new(0),
                devices,
            })
        }

        fn release(&self) {
            let mut open = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            *open = true;
            self.released.notify_all();
        }
    }

    impl DeviceDirectory for GatedDirectory {
        fn list(&self) -> Result<Vec<Device>, PipelineError> {
            let mut open = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            while !*open {
                let (guard, timeout) = self
                    .released
                    .wait_timeout(open, Duration::from_secs(5))
                    .unwrap_or_else(|p| p.into_inner());
                open = guard;
                if timeout.timed_out() {
                    return Err(PipelineError::Enumeration("test gate timed out".into()));
                }
            }
            self.lists.fetch_add(1, Ordering::Relaxed);
            Ok(self.devices.clone())
        }
    }

    struct FixedDirectory {
        result: Mutex<Result<Vec<Device>, PipelineError>>,
    }

    impl DeviceDirectory for FixedDirectory {
        fn list(&self) -> Result<Vec<Device>, PipelineError> {
            self.result
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone()
        }
    }

    fn poll_until_done(ctrl: &mut DeviceRefreshController) -> RefreshOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(outcome) = ctrl.poll() {
                return outcome;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("refresh did not complete within 5s");
    }

    #[test]
    fn requests_during_a_refresh_are_coalesced() {
        let directory = GatedDirectory::new(vec![device("mic-a")]);
        let mut ctrl = DeviceRefreshController::new(directory.clone());

        assert!(ctrl.request_refresh());
        assert!(ctrl.refresh_in_flight());
        // While the first enumeration is blocked, further requests are no-ops.
        assert!(!ctrl.request_refresh());
        assert!(!ctrl.request_refresh());
        assert!(ctrl.poll().is_none());

        directory.release();
        let outcome = poll_until_done(&mut ctrl);
        assert_eq!(outcome, RefreshOutcome::Updated(vec![device("mic-a")]));
        assert!(!ctrl.refresh_in_flight());
        // Exactly one enumeration ran for the three requests.
        assert_eq!(directory.lists.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn identical_list_reports_unchanged() {
        let directory = Arc::new(FixedDirectory {
            result: Mutex::new(Ok(vec![device("mic-a"), device("mic-b")])),
        });
        let mut ctrl = DeviceRefreshController::new(directory);

        assert!(ctrl.request_refresh());
        let first = poll_until_done(&mut ctrl);
        assert!(matches!(first, RefreshOutcome::Updated(_)));

        assert!(ctrl.request_refresh());
        let second = poll_until_done(&mut ctrl);
        assert_eq!(second, RefreshOutcome::Unchanged);
        assert_eq!(ctrl.devices().len(), 2);
    }

    #[test]
    fn format_change_counts_as_an_update() {
        let directory = Arc::new(FixedDirectory {
            result: Mutex::new(Ok(vec![device("mic-a")])),
        });
        let mut ctrl = DeviceRefreshController::new(directory.clone());

        ctrl.request_refresh();
        poll_until_done(&mut ctrl);

        // Same name, different native rate: a different device.
        let mut changed = device("mic-a");
        changed.sample_rate = 44_100;
        *directory.result.lock().unwrap() = Ok(vec![changed.clone()]);

        ctrl.request_refresh();
        let outcome = poll_until_done(&mut ctrl);
        assert_eq!(outcome, RefreshOutcome::Updated(vec![changed]));
    }

    #[test]
    fn failure_keeps_the_cached_list_and_returns_to_idle() {
        let directory = Arc::new(FixedDirectory {
            result: Mutex::new(Ok(vec![device("mic-a")])),
        });
        let mut ctrl = DeviceRefreshController::new(directory.clone());

        ctrl.request_refresh();
        poll_until_done(&mut ctrl);
        assert_eq!(ctrl.devices().len(), 1);

        *directory.result.lock().unwrap() =
            Err(PipelineError::Enumeration("audio service down".into()));
        ctrl.request_refresh();
        let outcome = poll_until_done(&mut ctrl);
        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        // Cached list survives; a new refresh can start immediately.
        assert_eq!(ctrl.devices(), &[device("mic-a")]);
        assert!(ctrl.request_refresh());
        poll_until_done(&mut ctrl);
    }

    #[test]
    fn poll_without_a_request_is_a_no_op() {
        let directory = GatedDirectory::new(vec![]);
        let mut ctrl = DeviceRefreshController::new(directory);
        assert!(ctrl.poll().is_none());
        assert!(!ctrl.refresh_in_flight());
    }
}
