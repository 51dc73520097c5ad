//! Speech/non-speech classification over raw PCM frames.
//!
//! The segmenter never classifies audio itself; it consumes one boolean
//! decision per frame from an injected detector so alternative
//! implementations (energy-based, model-based) can be swapped in freely.

/// Per-frame speech detector.
///
/// # Frame Contract
/// Frames are 16-bit little-endian mono PCM, exactly one configured chunk
/// (10, 20 or 30 ms) long. Implementations may require specific sample
/// rates; callers pass the capture rate with every frame. Decisions must be
/// deterministic for a given frame.
pub trait VadEngine {
    fn is_speech(&mut self, frame: &[u8], sample_rate: u32) -> bool;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

/// Lightweight detector that thresholds RMS energy in dBFS. Used when the
/// Earshot detector is disabled or unavailable.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold_db: f32,
}

impl EnergyVad {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }
}

impl VadEngine for EnergyVad {
    fn is_speech(&mut self, frame: &[u8], _sample_rate: u32) -> bool {
        let mut energy = 0.0f32;
        let mut count = 0usize;
        for pair in frame.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0;
            energy += sample * sample;
            count += 1;
        }
        if count == 0 {
            return false;
        }
        let rms = (energy / count as f32).sqrt().max(1e-6);
        let db = 20.0 * rms.log10();
        db >= self.threshold_db
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "energy_vad"
    }
}
