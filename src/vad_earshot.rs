//! Earshot-powered voice activity detector implementing `VadEngine`.

use crate::audio::VadEngine;
use crate::config::PipelineConfig;
use anyhow::{bail, Result};
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

/// Thin wrapper that adapts the `earshot` WebRTC VAD port to the crate's
/// `VadEngine` trait.
pub struct EarshotVad {
    detector: VoiceActivityDetector,
    scratch: Vec<i16>,
}

impl EarshotVad {
    /// Build a detector for the pipeline's capture rate. The prediction path
    /// used here is 16 kHz only.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        if cfg.sample_rate != 16_000 {
            bail!(
                "earshot detector requires a 16000 Hz capture rate, got {}",
                cfg.sample_rate
            );
        }
        let profile = match cfg.vad_threshold_db {
            t if t <= -50.0 => VoiceActivityProfile::VERY_AGGRESSIVE,
            t if t <= -40.0 => VoiceActivityProfile::AGGRESSIVE,
            t if t <= -30.0 => VoiceActivityProfile::LBR,
            _ => VoiceActivityProfile::QUALITY,
        };
        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            scratch: Vec::new(),
        })
    }
}

impl VadEngine for EarshotVad {
    fn is_speech(&mut self, frame: &[u8], _sample_rate: u32) -> bool {
        if frame.is_empty() {
            return false;
        }
        self.scratch.clear();
        self.scratch.reserve(frame.len() / 2);
        for pair in frame.chunks_exact(2) {
            self.scratch.push(i16::from_le_bytes([pair[0], pair[1]]));
        }
        self.detector.predict_16khz(&self.scratch).unwrap_or(false)
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}
