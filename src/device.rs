//! Capture devices: enumeration and raw chunk streams.
//!
//! The session controller only sees the `DeviceDirectory` and
//! `CaptureProvider` seams; the cpal-backed implementations live here. The
//! cpal callback runs on an audio thread and hands fixed-size byte chunks to
//! the session worker over a bounded channel — when the worker falls behind
//! (recognition runs on the ingestion path), chunks are dropped at the source
//! and counted.

use crate::audio::DeviceFormat;
use crate::error::PipelineError;
use crate::log_debug;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A capture device as enumerated by the directory. Equality covers identity
/// and format attributes, so a device whose native format changed between
/// refreshes counts as a different device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub signed: bool,
    pub big_endian: bool,
}

impl Device {
    pub fn format(&self) -> DeviceFormat {
        DeviceFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            signed: self.signed,
            big_endian: self.big_endian,
        }
    }
}

/// Enumerates available capture devices.
pub trait DeviceDirectory: Send + Sync {
    fn list(&self) -> Result<Vec<Device>, PipelineError>;
}

/// One read from a capture stream.
#[derive(Debug)]
pub enum ChunkRead {
    /// A chunk of raw PCM bytes in the device's native format.
    Chunk(Vec<u8>),
    /// Nothing arrived within the wait window; the caller should re-check its
    /// stop flag and try again.
    Idle,
    /// The provider terminated the stream.
    Closed,
}

/// An open capture stream bound to one device. Created and consumed entirely
/// on the session worker thread, so no `Send` bound is required (cpal streams
/// are not `Send` on every platform).
pub trait CaptureStream {
    fn read_chunk(&mut self, wait: Duration) -> Result<ChunkRead, PipelineError>;

    /// Chunks dropped because the worker could not keep up.
    fn dropped_chunks(&self) -> usize {
        0
    }
}

/// Opens capture streams. Shared across session restarts.
pub trait CaptureProvider: Send + Sync {
    fn open(
        &self,
        device: &Device,
        chunk_size_samples: usize,
    ) -> Result<Box<dyn CaptureStream>, PipelineError>;
}

/// Device enumeration backed by the default cpal host.
pub struct CpalDeviceDirectory;

impl DeviceDirectory for CpalDeviceDirectory {
    fn list(&self) -> Result<Vec<Device>, PipelineError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| PipelineError::Enumeration(format!("no input devices: {err}")))?;

        let mut out = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let Ok(config) = device.default_input_config() else {
                continue;
            };
            let Some((bits_per_sample, signed)) = pcm_layout(config.sample_format()) else {
                log_debug(&format!(
                    "skipping '{name}': unsupported sample format {:?}",
                    config.sample_format()
                ));
                continue;
            };
            out.push(Device {
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
                bits_per_sample,
                signed,
                big_endian: false,
            });
        }
        Ok(out)
    }
}

/// Byte layout a cpal sample format maps to on the wire. `F32` is converted
/// to 16-bit signed at the capture edge, so it advertises that layout.
fn pcm_layout(format: SampleFormat) -> Option<(u16, bool)> {
    match format {
        SampleFormat::I16 => Some((16, true)),
        SampleFormat::U16 => Some((16, false)),
        SampleFormat::F32 => Some((16, true)),
        _ => None,
    }
}

/// Capture provider backed by cpal input streams.
pub struct CpalCaptureProvider {
    channel_capacity: usize,
}

impl CpalCaptureProvider {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl CaptureProvider for CpalCaptureProvider {
    fn open(
        &self,
        device: &Device,
        chunk_size_samples: usize,
    ) -> Result<Box<dyn CaptureStream>, PipelineError> {
        let host = cpal::default_host();
        let mut devices = host
            .input_devices()
            .map_err(|err| PipelineError::Capture(format!("no input devices: {err}")))?;
        let cpal_device = devices
            .find(|d| d.name().map(|n| n == device.name).unwrap_or(false))
            .ok_or_else(|| {
                PipelineError::Capture(format!("input device '{}' not found", device.name))
            })?;

        let default_config = cpal_device
            .default_input_config()
            .map_err(|err| PipelineError::Capture(format!("no default input config: {err}")))?;
        let sample_format = default_config.sample_format();
        let stream_config: cpal::StreamConfig = default_config.into();

        // The enumerated descriptor travels with every chunk; refuse to
        // capture if the live config no longer matches it.
        let live = Device {
            name: device.name.clone(),
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
            bits_per_sample: pcm_layout(sample_format).map(|(bits, _)| bits).unwrap_or(0),
            signed: pcm_layout(sample_format).map(|(_, signed)| signed).unwrap_or(true),
            big_endian: false,
        };
        if live != *device {
            return Err(PipelineError::Capture(format!(
                "device '{}' changed format since enumeration; refresh the device list",
                device.name
            )));
        }

        let stride = device.format().frame_stride();
        let chunk_bytes = chunk_size_samples.max(1) * stride;
        let (sender, receiver) = bounded::<Vec<u8>>(self.channel_capacity);
        let dropped = Arc::new(AtomicUsize::new(0));
        let chunker = Arc::new(Mutex::new(ByteChunker::new(
            chunk_bytes,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match sample_format {
            SampleFormat::I16 => {
                let chunker = chunker.clone();
                let dropped = dropped.clone();
                cpal_device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = chunker.try_lock() {
                            pump.push_samples(data, |sample: i16| sample.to_le_bytes());
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let chunker = chunker.clone();
                let dropped = dropped.clone();
                cpal_device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = chunker.try_lock() {
                            pump.push_samples(data, |sample: u16| sample.to_le_bytes());
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::F32 => {
                let chunker = chunker.clone();
                let dropped = dropped.clone();
                cpal_device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = chunker.try_lock() {
                            pump.push_samples(data, |sample: f32| {
                                ((sample.clamp(-1.0, 1.0) * 32_767.0) as i16).to_le_bytes()
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(PipelineError::Capture(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| PipelineError::Capture(format!("failed to build input stream: {err}")))?;

        stream
            .play()
            .map_err(|err| PipelineError::Capture(format!("failed to start capture: {err}")))?;

        Ok(Box::new(CpalCaptureStream {
            receiver,
            dropped,
            _stream: stream,
        }))
    }
}

/// Reassembles the cpal callback's arbitrary-size buffers into fixed-size
/// byte chunks and pushes them over the bounded channel.
struct ByteChunker {
    chunk_bytes: usize,
    pending: Vec<u8>,
    sender: Sender<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
}

impl ByteChunker {
    fn new(chunk_bytes: usize, sender: Sender<Vec<u8>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            chunk_bytes: chunk_bytes.max(1),
            pending: Vec::with_capacity(chunk_bytes),
            sender,
            dropped,
        }
    }

    fn push_samples<T, F>(&mut self, data: &[T], convert: F)
    where
        T: Copy,
        F: Fn(T) -> [u8; 2],
    {
        for sample in data.iter().copied() {
            self.pending.extend_from_slice(&convert(sample));
        }
        while self.pending.len() >= self.chunk_bytes {
            let chunk: Vec<u8> = self.pending.drain(..self.chunk_bytes).collect();
            match self.sender.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

struct CpalCaptureStream {
    receiver: Receiver<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
    // Dropping the stream stops the callback; keep it alive with the reader.
    _stream: cpal::Stream,
}

impl CaptureStream for CpalCaptureStream {
    fn read_chunk(&mut self, wait: Duration) -> Result<ChunkRead, PipelineError> {
        match self.receiver.recv_timeout(wait) {
            Ok(bytes) => Ok(ChunkRead::Chunk(bytes)),
            Err(RecvTimeoutError::Timeout) => Ok(ChunkRead::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(ChunkRead::Closed),
        }
    }

    fn dropped_chunks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn chunker_emits_fixed_size_chunks() {
        let (tx, rx) = bounded(8);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut chunker = ByteChunker::new(4, tx, dropped.clone());

        chunker.push_samples(&[1i16, 2, 3], i16::to_le_bytes);
        let first = rx.try_recv().expect("first chunk");
        assert_eq!(first.len(), 4);
        assert_eq!(first, [1, 0, 2, 0]);
        // One sample (two bytes) still pending.
        assert!(rx.try_recv().is_err());

        chunker.push_samples(&[4i16], i16::to_le_bytes);
        let second = rx.try_recv().expect("second chunk");
        assert_eq!(second, [3, 0, 4, 0]);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn chunker_counts_drops_when_channel_is_full() {
        let (tx, rx) = bounded(1);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut chunker = ByteChunker::new(2, tx, dropped.clone());

        chunker.push_samples(&[1i16, 2, 3], i16::to_le_bytes);
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(rx.try_recv().expect("kept chunk"), [1, 0]);
    }

    #[test]
    fn f32_layout_advertises_signed_sixteen_bit() {
        assert_eq!(pcm_layout(SampleFormat::F32), Some((16, true)));
        assert_eq!(pcm_layout(SampleFormat::U16), Some((16, false)));
    }
}
