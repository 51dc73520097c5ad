//! Audio capture and utterance segmentation.
//!
//! Frames come off the microphone as 16-bit little-endian mono PCM at the
//! configured rate; the segmenter groups them into utterances using a
//! trailing window of per-frame speech decisions.

mod dispatch;
mod recorder;
mod segmenter;
#[cfg(test)]
mod tests;
mod vad;

pub use recorder::{FrameStream, Recorder};
pub use segmenter::{
    SegmenterConfig, SegmenterError, SegmenterState, Utterance, UtteranceSegmenter,
    SUPPORTED_CHUNK_MS,
};
pub use vad::{EnergyVad, VadEngine};
