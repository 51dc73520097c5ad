//! Microphone capture via CPAL.
//!
//! Opens the input device at the configured sample rate and feeds exact
//! chunk-sized 16-bit mono PCM frames into a bounded channel. Everything
//! downstream of the channel is device-agnostic.

use super::dispatch::FrameDispatcher;
use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

/// Live capture handle: frames arrive on `frames()` while the handle is kept
/// alive. Dropping it pauses and closes the device stream.
pub struct FrameStream {
    stream: cpal::Stream,
    receiver: Receiver<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
}

impl FrameStream {
    pub fn frames(&self) -> &Receiver<Vec<u8>> {
        &self.receiver
    }

    /// Frames discarded because the session loop fell behind.
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Err(err) = self.stream.pause() {
            debug!("failed to pause audio stream: {err}");
        }
    }
}

impl Recorder {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a recorder, optionally forcing a specific device so users can
    /// pick the right microphone when a machine exposes multiple inputs.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    /// Get the name of the active recording device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Open an input stream at the pipeline's sample rate, delivering exact
    /// chunk-sized frames over a bounded channel.
    ///
    /// The stream is requested at the target rate directly, so no resampling
    /// stage exists between the device and the segmenter. Devices that reject
    /// the rate fail here, before any capture starts.
    pub(crate) fn open_frame_stream(&self, cfg: &PipelineConfig) -> Result<FrameStream> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let channels = usize::from(default_config.channels().max(1));
        let stream_config = StreamConfig {
            channels: default_config.channels().max(1),
            sample_rate: SampleRate(cfg.sample_rate),
            buffer_size: BufferSize::Default,
        };
        let chunk_samples =
            ((u64::from(cfg.sample_rate) * u64::from(cfg.chunk_ms)) / 1000).max(1) as usize;

        debug!(
            "capture config: format={format:?} rate={}Hz channels={channels} chunk_samples={chunk_samples}",
            cfg.sample_rate
        );

        let (sender, receiver) = bounded::<Vec<u8>>(cfg.channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            chunk_samples,
            sender,
            dropped.clone(),
        )));

        // Keep the error callback quiet on stdout and mirror issues into the log.
        let err_fn = |err| debug!("audio_stream_error: {err}");

        // Convert every supported sample type to f32 up front so the rest of
        // the pipeline stays format-agnostic. The callback must never block;
        // a contended dispatcher lock counts the frame as dropped instead.
        let stream = match format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        }
        .with_context(|| {
            format!(
                "failed to open input stream at {} Hz on '{}'",
                cfg.sample_rate,
                self.device_name()
            )
        })?;

        stream.play()?;

        Ok(FrameStream {
            stream,
            receiver,
            dropped,
        })
    }
}
