pub mod audio;
pub mod command;
pub mod config;
pub mod session;
pub mod stt;
pub mod telemetry;
#[cfg(feature = "vad_earshot")]
pub mod vad_earshot;

pub use session::{run_capture_session, segment_pcm, SessionEnd, SessionStats};
