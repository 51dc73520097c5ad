//! Speech-to-text boundary.
//!
//! The session loop hands each finished utterance's raw PCM to a
//! `Transcriber`. The whisper-backed implementation is compiled in with the
//! `stt-whisper` feature; without it the binary runs segmentation-only.

use anyhow::Result;

/// Turns one utterance of 16-bit little-endian mono PCM into text.
pub trait Transcriber {
    fn transcribe(&self, pcm: &[u8], lang: &str) -> Result<String>;
}

#[cfg(feature = "stt-whisper")]
mod whisper {
    use super::Transcriber;
    use anyhow::{Context, Result};
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Owns a single Whisper context so successive utterances reuse the same
    /// memory-mapped model and stay fast.
    pub struct WhisperTranscriber {
        ctx: WhisperContext,
    }

    impl WhisperTranscriber {
        pub fn new(model_path: &str) -> Result<Self> {
            let ctx =
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
                    .context("failed to load whisper model")?;
            Ok(Self { ctx })
        }
    }

    fn decode_samples(pcm: &[u8]) -> Vec<f32> {
        pcm.chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
            .collect()
    }

    impl Transcriber for WhisperTranscriber {
        /// Run transcription for the utterance and return the stitched text.
        fn transcribe(&self, pcm: &[u8], lang: &str) -> Result<String> {
            let samples = decode_samples(pcm);
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(Some(lang));
            // Limit CPU usage so laptops don't max out all cores.
            params.set_n_threads(num_cpus::get().min(8) as i32);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            params.set_token_timestamps(false);
            state.full(params, &samples)?;

            let mut transcript = String::new();
            let num_segments = state.full_n_segments();
            if num_segments < 0 {
                return Ok(transcript);
            }
            // Whisper splits output into small segments; stitch them together.
            for i in 0..num_segments {
                let Some(segment) = state.get_segment(i) else {
                    continue;
                };
                if let Ok(text) = segment.to_str() {
                    transcript.push_str(text);
                }
            }
            Ok(transcript)
        }
    }

}

#[cfg(feature = "stt-whisper")]
pub use whisper::WhisperTranscriber;
