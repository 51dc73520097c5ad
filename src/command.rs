//! Transcript keyword extraction and serial command dispatch.
//!
//! The bridge firmware on the other end of the wire understands a small set
//! of ASCII commands, one per line. The matcher pulls the first recognized
//! keyword out of a transcript; the sink writes it to the device.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Commands the bridge understands. Alternatives are tried in this order at
/// each position, so multi-word entries must precede their prefixes.
const COMMAND_PATTERN: &str = "(red|orange|green|blue|yellow|purple|white|pink|turquoise|magenta|brighter|brightness\\sup|brightness\\sdown|on|off)";

/// Finds the first known command keyword in a transcript.
pub struct CommandMatcher {
    pattern: Regex,
}

impl CommandMatcher {
    /// Matcher over the built-in command vocabulary.
    pub fn new() -> Result<Self> {
        Self::with_pattern(COMMAND_PATTERN)
    }

    /// Matcher over a caller-supplied alternation, for custom vocabularies.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern).context("invalid command pattern")?,
        })
    }

    /// Leftmost command occurrence in `text`, if any. Matching is
    /// case-sensitive; callers normally lowercase the transcript first.
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern.find(text).map(|found| found.as_str())
    }
}

/// Byte-oriented destination for matched commands.
pub trait CommandSink {
    fn send(&mut self, command: &str) -> Result<()>;
}

/// Writes commands to a serial device file, one ASCII line per command.
///
/// The device itself (baud rate, framing) is expected to be configured out of
/// band; this only performs the line writes.
pub struct SerialSink {
    writer: File,
}

impl SerialSink {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = OpenOptions::new()
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open serial device '{}'", path.display()))?;
        Ok(Self { writer })
    }
}

impl CommandSink for SerialSink {
    fn send(&mut self, command: &str) -> Result<()> {
        // The firmware reads ASCII; anything else is silently stripped.
        let ascii: String = command.chars().filter(char::is_ascii).collect();
        self.writer
            .write_all(ascii.as_bytes())
            .context("serial write failed")?;
        self.writer.write_all(b"\n").context("serial write failed")?;
        self.writer.flush().context("serial flush failed")?;
        Ok(())
    }
}
