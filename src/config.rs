//! Command-line parsing and validation helpers.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::audio::SUPPORTED_CHUNK_MS;

const DEFAULT_SAMPLE_RATE: u32 = 16_000;
const DEFAULT_CHUNK_MS: u32 = 30;
const DEFAULT_WINDOW_MS: u32 = 240;
const DEFAULT_PADDING_MS: u32 = 1_000;
const DEFAULT_TRIGGER_RATIO: f32 = 0.5;
const DEFAULT_RELEASE_RATIO: f32 = 0.9;
const DEFAULT_VAD_THRESHOLD_DB: f32 = -40.0;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
// Rates the WebRTC-style detector path understands.
const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// CLI options for the voxbridge capture loop. Validated values keep the
/// downstream pipeline and serial writes safe.
#[derive(Debug, Parser, Clone)]
#[command(about = "Voice-activated command bridge", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Capture sample rate (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Frame duration fed to the detector (milliseconds; 10, 20 or 30)
    #[arg(long = "chunk-ms", default_value_t = DEFAULT_CHUNK_MS)]
    pub chunk_ms: u32,

    /// Trailing decision window driving trigger/release (milliseconds)
    #[arg(long = "window-ms", default_value_t = DEFAULT_WINDOW_MS)]
    pub window_ms: u32,

    /// Audio retained ahead of speech onset (milliseconds)
    #[arg(long = "padding-ms", default_value_t = DEFAULT_PADDING_MS)]
    pub padding_ms: u32,

    /// Fraction of the window that must be speech to start an utterance
    #[arg(long = "trigger-ratio", default_value_t = DEFAULT_TRIGGER_RATIO)]
    pub trigger_ratio: f32,

    /// Fraction of the window that must be silence to end an utterance
    #[arg(long = "release-ratio", default_value_t = DEFAULT_RELEASE_RATIO)]
    pub release_ratio: f32,

    /// Energy detector threshold (dBFS), used when Earshot is disabled
    #[arg(
        long = "vad-threshold-db",
        default_value_t = DEFAULT_VAD_THRESHOLD_DB,
        allow_negative_numbers = true
    )]
    pub vad_threshold_db: f32,

    /// Frame channel capacity between the capture callback and the session loop
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Serial device that receives matched commands
    #[arg(long = "serial-device")]
    pub serial_device: Option<PathBuf>,

    /// Language passed to the transcriber
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Whisper ggml model path (used with the stt-whisper feature)
    #[arg(long = "whisper-model-path")]
    pub whisper_model_path: Option<PathBuf>,

    /// Enable JSON trace logging
    #[arg(long)]
    pub logs: bool,
}

/// Tunable parameters for the capture + segmentation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub chunk_ms: u32,
    pub window_ms: u32,
    pub padding_ms: u32,
    pub trigger_ratio: f32,
    pub release_ratio: f32,
    pub vad_threshold_db: f32,
    pub channel_capacity: usize,
}

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before any device or model is touched.
    pub fn validate(&mut self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be one of {SUPPORTED_SAMPLE_RATES:?} Hz, got {}",
                self.sample_rate
            );
        }
        if !SUPPORTED_CHUNK_MS.contains(&self.chunk_ms) {
            bail!("--chunk-ms must be 10, 20 or 30, got {}", self.chunk_ms);
        }
        if self.window_ms < self.chunk_ms {
            bail!(
                "--window-ms ({}) must hold at least one {} ms chunk",
                self.window_ms,
                self.chunk_ms
            );
        }
        if self.padding_ms < self.chunk_ms {
            bail!(
                "--padding-ms ({}) must hold at least one {} ms chunk",
                self.padding_ms,
                self.chunk_ms
            );
        }
        for (flag, ratio) in [
            ("--trigger-ratio", self.trigger_ratio),
            ("--release-ratio", self.release_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                bail!("{flag} must be within (0.0, 1.0], got {ratio}");
            }
        }
        if !(-120.0..=0.0).contains(&self.vad_threshold_db) {
            bail!(
                "--vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.vad_threshold_db
            );
        }
        if !(8..=1024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 1024, got {}",
                self.channel_capacity
            );
        }
        if self.lang.trim().is_empty()
            || !self
                .lang
                .chars()
                .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
        {
            bail!("--lang must contain only alphabetic characters or '-'/'_' separators");
        }
        Ok(())
    }

    /// Snapshot the capture/segmentation settings for downstream consumers.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.sample_rate,
            chunk_ms: self.chunk_ms,
            window_ms: self.window_ms,
            padding_ms: self.padding_ms,
            trigger_ratio: self.trigger_ratio,
            release_ratio: self.release_ratio,
            vad_threshold_db: self.vad_threshold_db,
            channel_capacity: self.channel_capacity,
        }
    }
}
