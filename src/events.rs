//! Outbound event model and serialized emitter
//!
//! Every event is one JSON object per line on stdout, flushed immediately so
//! the supervising process sees it without buffering delays. All emission
//! goes through a single [`EventEmitter`] so concurrent producers (command
//! handler, reporter tick) never interleave partial lines.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::edl::model::TimelineMode;

/// Events published on stdout
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    /// Media opened successfully
    #[serde(rename = "loaded")]
    #[serde(rename_all = "camelCase")]
    Loaded {
        id: String,
        duration_sec: f64,
        sample_rate: u32,
        channels: u16,
    },

    /// Transport state change (and queryState echo)
    #[serde(rename = "state")]
    State { id: String, playing: bool },

    /// Dual-timeline position report (~30 Hz while playing, plus on
    /// seek/stop/queryState)
    #[serde(rename = "position")]
    #[serde(rename_all = "camelCase")]
    Position {
        id: String,
        edited_sec: f64,
        original_sec: f64,
    },

    /// Playback reached the final segment
    #[serde(rename = "ended")]
    Ended { id: String },

    /// A new EDL snapshot was installed
    #[serde(rename = "edlApplied")]
    #[serde(rename_all = "camelCase")]
    EdlApplied {
        id: String,
        revision: i64,
        word_count: usize,
        spacer_count: usize,
        total_segments: usize,
        mode: TimelineMode,
    },

    /// Command failure
    #[serde(rename = "error")]
    Error { message: String },
}

/// Serialized line-oriented event writer.
///
/// Wraps any `Write` sink behind a mutex; each event is serialized, newline
/// terminated, and flushed in one critical section.
pub struct EventEmitter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EventEmitter {
    /// Emitter writing to process stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Emitter writing to an arbitrary sink (tests capture output this way)
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Serialize and write one event line.
    ///
    /// Serialization of these enums cannot fail; write errors are logged and
    /// swallowed so a closed pipe does not take down the audio threads.
    pub fn emit(&self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize event: {}", e);
                return;
            }
        };

        let mut out = self.out.lock().expect("event emitter poisoned");
        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            warn!("event output closed, dropping event");
        }
    }

    /// Shorthand for an `error` event carrying `message`.
    pub fn emit_error(&self, message: impl Into<String>) {
        self.emit(&Event::Error { message: message.into() });
    }
}
