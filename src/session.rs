//! Capture session: frames in, utterances out.
//!
//! Pulls frames from the device stream, runs the detector and segmenter in a
//! strictly sequential per-frame pipeline, and hands each finished utterance
//! to the caller's handler. The loop owns no process-level signal handling;
//! cancellation arrives as an explicit stop flag.

use crate::audio::{
    Recorder, SegmenterConfig, SegmenterState, Utterance, UtteranceSegmenter, VadEngine,
};
use crate::config::PipelineConfig;
use anyhow::Result;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a capture session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    StreamClosed,
}

impl SessionEnd {
    pub fn label(&self) -> &'static str {
        match self {
            SessionEnd::Stopped => "stopped",
            SessionEnd::StreamClosed => "stream_closed",
        }
    }
}

/// Counters for one session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: usize,
    pub frames_dropped: usize,
    pub utterances: usize,
    pub end: SessionEnd,
}

/// Run capture, classification and segmentation until the stop flag is set or
/// the device stream closes.
///
/// Each finished utterance is passed to `on_utterance`; a handler error is
/// logged and the session moves on to the next cycle, so a failing
/// transcription or serial write never corrupts segmentation state. An
/// utterance still being accumulated when the stop flag fires is discarded.
pub fn run_capture_session<F>(
    recorder: &Recorder,
    cfg: &PipelineConfig,
    vad: &mut dyn VadEngine,
    stop: &AtomicBool,
    mut on_utterance: F,
) -> Result<SessionStats>
where
    F: FnMut(Utterance) -> Result<()>,
{
    let mut segmenter = UtteranceSegmenter::new(&SegmenterConfig::from(cfg))?;
    let stream = recorder.open_frame_stream(cfg)?;
    let wait = Duration::from_millis(u64::from(cfg.chunk_ms));

    let mut frames_processed = 0usize;
    let mut utterances = 0usize;

    info!(
        device = %recorder.device_name(),
        vad = vad.name(),
        rate = cfg.sample_rate,
        chunk_ms = cfg.chunk_ms,
        "capture session started"
    );

    let end = loop {
        if stop.load(Ordering::Relaxed) {
            break SessionEnd::Stopped;
        }
        match stream.frames().recv_timeout(wait) {
            Ok(frame) => {
                let voiced = vad.is_speech(&frame, cfg.sample_rate);
                frames_processed += 1;
                let was_idle = segmenter.state() == SegmenterState::Idle;
                if let Some(utterance) = segmenter.push(&frame, voiced)? {
                    utterances += 1;
                    vad.reset();
                    info!(
                        frames = utterance.frames,
                        duration_ms = utterance.duration_ms,
                        "utterance complete"
                    );
                    if let Err(err) = on_utterance(utterance) {
                        warn!("utterance handler failed: {err:#}");
                    }
                } else if was_idle && segmenter.state() == SegmenterState::Triggered {
                    debug!(frame = frames_processed, "speech onset");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break SessionEnd::StreamClosed,
        }
    };

    Ok(SessionStats {
        frames_processed,
        frames_dropped: stream.dropped_frames(),
        utterances,
        end,
    })
}

/// Run the segmentation pipeline over an in-memory PCM buffer.
///
/// Frames are cut sequentially from `pcm`; a trailing partial chunk is
/// discarded. No audio device is required, which makes this the entry point
/// for tests and offline tooling.
pub fn segment_pcm(
    pcm: &[u8],
    cfg: &SegmenterConfig,
    vad: &mut dyn VadEngine,
) -> Result<Vec<Utterance>, crate::audio::SegmenterError> {
    let mut segmenter = UtteranceSegmenter::new(cfg)?;
    let chunk_bytes = cfg.chunk_bytes();
    let mut utterances = Vec::new();
    for frame in pcm.chunks_exact(chunk_bytes) {
        let voiced = vad.is_speech(frame, cfg.sample_rate);
        if let Some(utterance) = segmenter.push(frame, voiced)? {
            vad.reset();
            utterances.push(utterance);
        }
    }
    Ok(utterances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VadEngine;

    /// Replays a fixed decision script regardless of frame content.
    struct ScriptedVad {
        decisions: Vec<bool>,
        cursor: usize,
        resets: usize,
    }

    impl ScriptedVad {
        fn new(decisions: Vec<bool>) -> Self {
            Self {
                decisions,
                cursor: 0,
                resets: 0,
            }
        }
    }

    impl VadEngine for ScriptedVad {
        fn is_speech(&mut self, _frame: &[u8], _sample_rate: u32) -> bool {
            let decision = self.decisions.get(self.cursor).copied().unwrap_or(false);
            self.cursor += 1;
            decision
        }

        fn reset(&mut self) {
            self.resets += 1;
        }

        fn name(&self) -> &'static str {
            "scripted_vad"
        }
    }

    fn decisions(groups: &[(usize, bool)]) -> Vec<bool> {
        let mut script = Vec::new();
        for &(count, value) in groups {
            script.extend(std::iter::repeat(value).take(count));
        }
        script
    }

    #[test]
    fn segments_two_utterances_from_one_stream() {
        let cfg = SegmenterConfig::default();
        // Two onset/offset cycles with enough trailing silence to release.
        let script = decisions(&[
            (40, false),
            (20, true),
            (12, false),
            (20, true),
            (12, false),
        ]);
        let total = script.len();
        let pcm = vec![0u8; total * cfg.chunk_bytes()];
        let mut vad = ScriptedVad::new(script);

        let utterances = segment_pcm(&pcm, &cfg, &mut vad).expect("pipeline should run");
        assert_eq!(utterances.len(), 2);
        // Trigger fires on the 5th voiced frame; pre-roll holds up to 33
        // chunks; release takes 8 trailing silence frames.
        assert_eq!(utterances[0].frames, 56);
        assert_eq!(utterances[1].frames, 32);
        assert_eq!(vad.resets, 2);
    }

    #[test]
    fn trailing_partial_chunk_is_discarded() {
        let cfg = SegmenterConfig::default();
        let script = decisions(&[(10, false)]);
        let mut pcm = vec![0u8; 10 * cfg.chunk_bytes()];
        pcm.extend_from_slice(&[0u8; 5]);
        let mut vad = ScriptedVad::new(script);

        let utterances = segment_pcm(&pcm, &cfg, &mut vad).expect("pipeline should run");
        assert!(utterances.is_empty());
        assert_eq!(vad.cursor, 10);
    }

    #[test]
    fn all_silence_stream_emits_nothing() {
        let cfg = SegmenterConfig::default();
        let script = decisions(&[(100, false)]);
        let pcm = vec![0u8; 100 * cfg.chunk_bytes()];
        let mut vad = ScriptedVad::new(script);

        let utterances = segment_pcm(&pcm, &cfg, &mut vad).expect("pipeline should run");
        assert!(utterances.is_empty());
        assert_eq!(vad.resets, 0);
    }

    #[test]
    fn session_end_labels_are_stable() {
        assert_eq!(SessionEnd::Stopped.label(), "stopped");
        assert_eq!(SessionEnd::StreamClosed.label(), "stream_closed");
    }
}
