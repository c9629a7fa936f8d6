use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use voxgate::config::AppConfig;
use voxgate::device::{CpalCaptureProvider, CpalDeviceDirectory, Device, DeviceDirectory};
use voxgate::stt::{Recognizer, RecognizerParams, WhisperRecognizer};
use voxgate::vad::{create_detector, SpeechDetector};
use voxgate::{
    init_logging, init_tracing, log_debug, log_file_path, PipelineEvent, TranscriptionController,
};

#[cfg(not(test))]
fn main() -> Result<()> {
    run_with_args(env::args_os())
}

#[cfg_attr(test, allow(dead_code))]
fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let config = AppConfig::parse_from(args);

    if config.list_input_devices {
        let output = list_input_devices()?;
        print!("{output}");
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(&config);
    log_debug("=== voxgate started ===");
    log_debug(&format!("log file: {:?}", log_file_path()));

    let Some(model_path) = config.model_path.clone() else {
        bail!("a Whisper model is required: pass --model-path or set VOXGATE_MODEL");
    };
    let model_path = model_path
        .to_str()
        .context("model path is not valid UTF-8")?
        .to_string();

    let pipeline = config.pipeline_config();
    let detector: Arc<Mutex<dyn SpeechDetector>> = Arc::new(Mutex::new(create_detector(&pipeline)));
    let recognizer = WhisperRecognizer::new(
        &model_path,
        RecognizerParams {
            lang: config.lang.clone(),
            beam_size: config.whisper_beam_size,
            temperature: config.whisper_temperature,
        },
    )?;
    let recognizer: Arc<Mutex<dyn Recognizer>> = Arc::new(Mutex::new(recognizer));

    let mut controller = TranscriptionController::new(
        Arc::new(CpalCaptureProvider::new(pipeline.channel_capacity)),
        Arc::new(CpalDeviceDirectory),
        detector,
        recognizer,
        &pipeline,
    );

    let device = wait_for_device(&mut controller, config.input_device.as_deref())?;
    eprintln!("capturing from '{}' for {}s", device.name, config.seconds);
    controller.select_device(Some(device));

    run_event_loop(&mut controller, Duration::from_secs(config.seconds));
    controller.shutdown();
    log_debug("=== voxgate exiting ===");
    Ok(())
}

/// Enumerate devices through the refresh controller and pick the requested
/// one, or the first available.
fn wait_for_device(
    controller: &mut TranscriptionController,
    requested: Option<&str>,
) -> Result<Device> {
    controller.request_device_refresh();
    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.poll_device_refresh().is_none() {
        if Instant::now() >= deadline {
            bail!("device enumeration did not finish within 10s");
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let devices = controller.devices();
    if devices.is_empty() {
        bail!("no audio input devices detected");
    }
    let device = match requested {
        Some(name) => devices
            .iter()
            .find(|d| d.name == name)
            .with_context(|| format!("input device '{name}' not found"))?,
        None => &devices[0],
    };
    Ok(device.clone())
}

fn run_event_loop(controller: &mut TranscriptionController, run_for: Duration) {
    let events = controller.events().clone();
    let deadline = Instant::now() + run_for;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        controller.poll_device_refresh();
        match events.recv_timeout((deadline - now).min(Duration::from_millis(100))) {
            Ok(PipelineEvent::Transcript(text)) => println!("{text}"),
            Ok(PipelineEvent::Error(err)) => eprintln!("error: {err}"),
            Ok(PipelineEvent::Started { device }) => log_debug(&format!("capturing: {device}")),
            Ok(PipelineEvent::Stopped(cause)) => {
                log_debug(&format!("session stopped: {}", cause.label()));
                return;
            }
            Ok(PipelineEvent::DevicesUpdated(_)) => {}
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn list_input_devices() -> Result<String> {
    let devices = if let Ok(raw) = env::var("VOXGATE_TEST_DEVICES") {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        }
    } else {
        CpalDeviceDirectory
            .list()?
            .into_iter()
            .map(|device| device.name)
            .collect()
    };
    let mut output = String::new();
    if devices.is_empty() {
        output.push_str("No audio input devices detected.\n");
    } else {
        output.push_str("Available audio input devices:\n");
        for name in devices {
            output.push_str(&format!("  - {name}\n"));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn with_test_devices(value: Option<&str>, action: impl FnOnce() -> Result<String>) -> String {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let previous = env::var("VOXGATE_TEST_DEVICES").ok();
        if let Some(value) = value {
            env::set_var("VOXGATE_TEST_DEVICES", value);
        } else {
            env::remove_var("VOXGATE_TEST_DEVICES");
        }

        let output = action().expect("action should succeed");

        if let Some(previous) = previous {
            env::set_var("VOXGATE_TEST_DEVICES", previous);
        } else {
            env::remove_var("VOXGATE_TEST_DEVICES");
        }

        output
    }

    #[test]
    fn list_input_devices_outputs_devices() {
        let output = with_test_devices(Some("Mic A,Mic B"), list_input_devices);
        assert!(output.contains("Available audio input devices:"));
        assert!(output.contains("Mic A"));
        assert!(output.contains("Mic B"));
    }

    #[test]
    fn list_input_devices_handles_empty_list() {
        let output = with_test_devices(Some(""), list_input_devices);
        assert!(output.contains("No audio input devices detected."));
    }
}
