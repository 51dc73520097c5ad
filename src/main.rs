use anyhow::Result;
use clap::Parser;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use voxbridge::audio::{Recorder, Utterance, VadEngine};
use voxbridge::command::{CommandMatcher, CommandSink, SerialSink};
use voxbridge::config::{AppConfig, PipelineConfig};
use voxbridge::session::run_capture_session;
use voxbridge::stt::Transcriber;
use voxbridge::telemetry;

#[cfg_attr(test, allow(dead_code))]
static STOP: AtomicBool = AtomicBool::new(false);

#[cfg_attr(test, allow(dead_code))]
extern "C" fn handle_sigint(_signal: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

#[cfg(not(test))]
fn main() -> Result<()> {
    run_with_args(env::args_os())
}

#[cfg_attr(test, allow(dead_code))]
fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut config = AppConfig::parse_from(args);

    if config.list_input_devices {
        let output = list_input_devices()?;
        print!("{output}");
        return Ok(());
    }

    config.validate()?;
    telemetry::init_tracing(&config);

    let recorder = Recorder::new(config.input_device.as_deref())?;
    let pipeline = config.pipeline_config();
    let mut vad = create_vad_engine(&pipeline)?;
    let transcriber = load_transcriber(&config)?;
    let matcher = CommandMatcher::new()?;
    let mut sink: Option<SerialSink> = match &config.serial_device {
        Some(path) => Some(SerialSink::open(path)?),
        None => None,
    };

    // SIGINT flips the stop flag; the session loop notices it between frames.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
    }

    let lang = config.lang.clone();
    let stats = run_capture_session(&recorder, &pipeline, vad.as_mut(), &STOP, |utterance| {
        handle_utterance(
            utterance,
            transcriber.as_deref(),
            &matcher,
            sink.as_mut(),
            &lang,
        )
    })?;

    info!(
        frames = stats.frames_processed,
        dropped = stats.frames_dropped,
        utterances = stats.utterances,
        end = stats.end.label(),
        "session finished"
    );
    Ok(())
}

/// Transcribe one finished utterance, match a command, and forward it.
#[cfg_attr(test, allow(dead_code))]
fn handle_utterance(
    utterance: Utterance,
    transcriber: Option<&dyn Transcriber>,
    matcher: &CommandMatcher,
    sink: Option<&mut SerialSink>,
    lang: &str,
) -> Result<()> {
    let Some(transcriber) = transcriber else {
        info!(
            frames = utterance.frames,
            duration_ms = utterance.duration_ms,
            bytes = utterance.audio.len(),
            "utterance captured (no transcriber configured)"
        );
        return Ok(());
    };

    let transcript = transcriber.transcribe(&utterance.audio, lang)?;
    let text = transcript.trim().to_lowercase();
    info!(%text, "transcript");

    match matcher.extract(&text) {
        Some(command) => {
            info!(command, "matched command");
            if let Some(sink) = sink {
                sink.send(command)?;
            }
        }
        None => info!("no command matched"),
    }
    Ok(())
}

#[cfg_attr(test, allow(dead_code))]
fn create_vad_engine(cfg: &PipelineConfig) -> Result<Box<dyn VadEngine>> {
    #[cfg(feature = "vad_earshot")]
    {
        Ok(Box::new(voxbridge::vad_earshot::EarshotVad::from_config(
            cfg,
        )?))
    }

    #[cfg(not(feature = "vad_earshot"))]
    {
        Ok(Box::new(voxbridge::audio::EnergyVad::new(
            cfg.vad_threshold_db,
        )))
    }
}

#[cfg(feature = "stt-whisper")]
#[cfg_attr(test, allow(dead_code))]
fn load_transcriber(config: &AppConfig) -> Result<Option<Box<dyn Transcriber>>> {
    use anyhow::Context;
    use voxbridge::stt::WhisperTranscriber;

    let Some(path) = &config.whisper_model_path else {
        return Ok(None);
    };
    let path = path
        .to_str()
        .context("whisper model path must be valid UTF-8")?;
    Ok(Some(Box::new(WhisperTranscriber::new(path)?)))
}

#[cfg(not(feature = "stt-whisper"))]
#[cfg_attr(test, allow(dead_code))]
fn load_transcriber(config: &AppConfig) -> Result<Option<Box<dyn Transcriber>>> {
    if config.whisper_model_path.is_some() {
        tracing::warn!("--whisper-model-path ignored: built without the stt-whisper feature");
    }
    Ok(None)
}

fn list_input_devices() -> Result<String> {
    let devices = if let Ok(raw) = env::var("VOXBRIDGE_TEST_DEVICES") {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        }
    } else {
        Recorder::list_devices()?
    };
    let mut output = String::new();
    if devices.is_empty() {
        output.push_str("No audio input devices detected.\n");
    } else {
        output.push_str("Available audio input devices:\n");
        for name in devices {
            output.push_str(&format!("  - {name}\n"));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn with_test_devices(value: Option<&str>, action: impl FnOnce() -> Result<String>) -> String {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let previous = env::var("VOXBRIDGE_TEST_DEVICES").ok();
        if let Some(value) = value {
            env::set_var("VOXBRIDGE_TEST_DEVICES", value);
        } else {
            env::remove_var("VOXBRIDGE_TEST_DEVICES");
        }

        let output = action().expect("action should succeed");

        if let Some(previous) = previous {
            env::set_var("VOXBRIDGE_TEST_DEVICES", previous);
        } else {
            env::remove_var("VOXBRIDGE_TEST_DEVICES");
        }

        output
    }

    #[test]
    fn list_input_devices_outputs_devices() {
        let output = with_test_devices(Some("Mic A,Mic B"), list_input_devices);
        assert!(output.contains("Available audio input devices:"));
        assert!(output.contains("Mic A"));
        assert!(output.contains("Mic B"));
    }

    #[test]
    fn list_input_devices_outputs_empty_message() {
        let output = with_test_devices(Some(""), list_input_devices);
        assert!(output.contains("No audio input devices detected."));
    }
}
