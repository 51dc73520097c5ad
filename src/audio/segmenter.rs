//! Utterance segmentation driven by per-frame speech decisions.
//!
//! The segmenter consumes fixed-size PCM frames together with a
//! speech/non-speech decision for each and groups them into utterances.
//! Triggering and releasing use separate thresholds over a trailing decision
//! window, so a single misclassified frame neither starts an utterance nor
//! splits one. A bounded pre-roll buffer keeps the audio immediately ahead of
//! speech onset so the emitted utterance is not missing its leading edge.

use std::collections::VecDeque;

use thiserror::Error;

use crate::config::PipelineConfig;

/// Chunk durations the segmenter accepts, in milliseconds.
pub const SUPPORTED_CHUNK_MS: [u32; 3] = [10, 20, 30];

/// Parameters fixed at segmenter construction.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    pub chunk_ms: u32,
    pub window_ms: u32,
    pub padding_ms: u32,
    pub trigger_ratio: f32,
    pub release_ratio: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_ms: 30,
            window_ms: 240,
            padding_ms: 1_000,
            trigger_ratio: 0.5,
            release_ratio: 0.9,
        }
    }
}

impl SegmenterConfig {
    /// Samples per chunk at the configured rate.
    pub fn chunk_samples(&self) -> usize {
        ((u64::from(self.sample_rate) * u64::from(self.chunk_ms)) / 1000) as usize
    }

    /// Bytes per chunk (16-bit mono PCM).
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_samples() * 2
    }

    /// Whole chunks in the decision window. Truncates.
    pub fn window_chunks(&self) -> usize {
        (self.window_ms / self.chunk_ms) as usize
    }

    /// Whole chunks of pre-roll retained ahead of speech onset. Truncates.
    pub fn padding_chunks(&self) -> usize {
        (self.padding_ms / self.chunk_ms) as usize
    }
}

impl From<&PipelineConfig> for SegmenterConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            chunk_ms: cfg.chunk_ms,
            window_ms: cfg.window_ms,
            padding_ms: cfg.padding_ms,
            trigger_ratio: cfg.trigger_ratio,
            release_ratio: cfg.release_ratio,
        }
    }
}

/// Failures surfaced at the segmenter API boundary.
///
/// Both are deterministic caller errors: retrying with the same input cannot
/// succeed, so they are reported immediately and never mid-stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmenterError {
    /// A pushed frame does not match the configured chunk size. Accepting it
    /// would desynchronize the decision window from the audio, so the frame
    /// is rejected rather than truncated or padded.
    #[error("frame length {got} bytes does not match the configured chunk size of {expected} bytes")]
    InvalidFrameLength { expected: usize, got: usize },

    /// Construction was attempted with parameters that cannot produce a
    /// working segmenter.
    #[error("segmenter not configured: {0}")]
    NotConfigured(String),
}

/// Fixed-capacity ring of the most recent per-frame decisions.
///
/// The slot array always has length N; each push overwrites the oldest entry
/// and advances the head. Slots start all-false, so the first N frames are
/// counted against an implicit silence prefix.
#[derive(Debug)]
pub(super) struct DecisionWindow {
    slots: Vec<bool>,
    head: usize,
}

impl DecisionWindow {
    pub(super) fn new(len: usize) -> Self {
        Self {
            slots: vec![false; len],
            head: 0,
        }
    }

    pub(super) fn push(&mut self, voiced: bool) {
        self.slots[self.head] = voiced;
        self.head = (self.head + 1) % self.slots.len();
    }

    pub(super) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(super) fn voiced(&self) -> usize {
        self.slots.iter().filter(|flag| **flag).count()
    }

    pub(super) fn clear(&mut self) {
        self.slots.fill(false);
        self.head = 0;
    }
}

/// Segmentation phase: waiting for speech onset, or accumulating an utterance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Triggered,
}

/// One finished utterance: contiguous 16-bit little-endian mono PCM covering
/// every accumulated frame, pre-roll included. No header, no framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub audio: Vec<u8>,
    pub frames: usize,
    pub duration_ms: u64,
}

/// Streaming trigger/release state machine over classified audio frames.
///
/// Pure and synchronous: no I/O, no locking, not reentrant. Frames must be
/// delivered strictly in capture order from a single caller.
pub struct UtteranceSegmenter {
    chunk_bytes: usize,
    chunk_ms: u32,
    padding_chunks: usize,
    trigger_votes: f32,
    release_votes: f32,
    window: DecisionWindow,
    pre_roll: VecDeque<Vec<u8>>,
    captured: Vec<Vec<u8>>,
    state: SegmenterState,
}

impl UtteranceSegmenter {
    /// Validate the configuration and derive the per-push constants.
    ///
    /// Inconsistent parameters are rejected here so they are never discovered
    /// mid-stream.
    pub fn new(cfg: &SegmenterConfig) -> Result<Self, SegmenterError> {
        if cfg.sample_rate == 0 {
            return Err(SegmenterError::NotConfigured(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if !SUPPORTED_CHUNK_MS.contains(&cfg.chunk_ms) {
            return Err(SegmenterError::NotConfigured(format!(
                "chunk duration {} ms is unsupported (expected 10, 20 or 30)",
                cfg.chunk_ms
            )));
        }
        let window_chunks = cfg.window_chunks();
        if window_chunks == 0 {
            return Err(SegmenterError::NotConfigured(format!(
                "window of {} ms holds no whole {} ms chunk",
                cfg.window_ms, cfg.chunk_ms
            )));
        }
        let padding_chunks = cfg.padding_chunks();
        if padding_chunks == 0 {
            return Err(SegmenterError::NotConfigured(format!(
                "padding of {} ms holds no whole {} ms chunk",
                cfg.padding_ms, cfg.chunk_ms
            )));
        }
        for (name, ratio) in [
            ("trigger", cfg.trigger_ratio),
            ("release", cfg.release_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(SegmenterError::NotConfigured(format!(
                    "{name} ratio {ratio} is outside (0.0, 1.0]"
                )));
            }
        }

        Ok(Self {
            chunk_bytes: cfg.chunk_bytes(),
            chunk_ms: cfg.chunk_ms,
            padding_chunks,
            trigger_votes: cfg.trigger_ratio * window_chunks as f32,
            release_votes: cfg.release_ratio * window_chunks as f32,
            window: DecisionWindow::new(window_chunks),
            pre_roll: VecDeque::with_capacity(padding_chunks),
            captured: Vec::new(),
            state: SegmenterState::Idle,
        })
    }

    /// Feed one frame and its speech decision.
    ///
    /// The frame must be exactly one chunk of 16-bit mono PCM and the caller
    /// must already have classified this same frame. Returns the finished
    /// utterance on the push that releases it, `None` on every other push.
    pub fn push(
        &mut self,
        frame: &[u8],
        is_speech: bool,
    ) -> Result<Option<Utterance>, SegmenterError> {
        if frame.len() != self.chunk_bytes {
            return Err(SegmenterError::InvalidFrameLength {
                expected: self.chunk_bytes,
                got: frame.len(),
            });
        }
        self.window.push(is_speech);

        match self.state {
            SegmenterState::Idle => {
                if self.pre_roll.len() == self.padding_chunks {
                    self.pre_roll.pop_front();
                }
                self.pre_roll.push_back(frame.to_vec());
                // Strict float compare against the precomputed ratio product,
                // so a window exactly at the ratio does not trigger.
                if self.window.voiced() as f32 > self.trigger_votes {
                    self.state = SegmenterState::Triggered;
                    self.captured.extend(self.pre_roll.drain(..));
                }
                Ok(None)
            }
            SegmenterState::Triggered => {
                self.captured.push(frame.to_vec());
                let unvoiced = self.window.len() - self.window.voiced();
                if unvoiced as f32 > self.release_votes {
                    Ok(Some(self.finish()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Current phase, mainly for observability.
    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Drop any in-progress utterance and re-arm from scratch.
    pub fn reset(&mut self) {
        self.window.clear();
        self.pre_roll.clear();
        self.captured.clear();
        self.state = SegmenterState::Idle;
    }

    fn finish(&mut self) -> Utterance {
        let frames = self.captured.len();
        let mut audio = Vec::with_capacity(frames * self.chunk_bytes);
        for frame in self.captured.drain(..) {
            audio.extend_from_slice(&frame);
        }
        self.window.clear();
        self.pre_roll.clear();
        self.state = SegmenterState::Idle;
        Utterance {
            audio,
            frames,
            duration_ms: frames as u64 * u64::from(self.chunk_ms),
        }
    }

    #[cfg(test)]
    pub(crate) fn pre_roll_len(&self) -> usize {
        self.pre_roll.len()
    }
}
