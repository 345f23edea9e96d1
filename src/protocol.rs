//! Inbound command model and line parsing
//!
//! Commands arrive as line-delimited JSON objects with a `type`
//! discriminator. Parsing is lenient: unknown keys are ignored, missing
//! optional fields take defaults. A line that is not a JSON object, or whose
//! `type` is unrecognized, is reported without disturbing engine state.

use serde::Deserialize;
use tracing::debug;

use crate::error::Error;

/// Control commands accepted on stdin
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Command {
    /// Open a media file and install the identity timeline
    #[serde(rename = "load")]
    Load {
        #[serde(default)]
        id: String,
        #[serde(default)]
        path: String,
    },

    #[serde(rename = "play")]
    Play,

    #[serde(rename = "pause")]
    Pause,

    #[serde(rename = "stop")]
    Stop,

    /// Seek to an edited-timeline position in seconds
    #[serde(rename = "seek")]
    #[serde(rename_all = "camelCase")]
    Seek {
        #[serde(default)]
        time_sec: f64,
    },

    /// Whole-stream resampling ratio, clamped to [0.25, 4.0]
    #[serde(rename = "setRate")]
    SetRate {
        #[serde(default = "default_unit")]
        rate: f64,
    },

    /// Linear gain, clamped to [0.0, 2.0]
    #[serde(rename = "setVolume")]
    SetVolume {
        #[serde(default = "default_unit")]
        value: f64,
    },

    #[serde(rename = "queryState")]
    QueryState,

    /// Replace the timeline with a new EDL snapshot
    #[serde(rename = "updateEdl")]
    UpdateEdl(EdlPayload),

    /// Read an EDL payload from a hand-off file, then delete the file
    #[serde(rename = "updateEdlFromFile")]
    UpdateEdlFromFile {
        #[serde(default)]
        path: String,
    },
}

fn default_unit() -> f64 {
    1.0
}

fn default_nan() -> f64 {
    f64::NAN
}

/// JSON has no NaN; producers serialize it as `null`. Map null back to NaN
/// so ingestion drops the segment instead of the parser rejecting the whole
/// payload.
fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Top-level EDL payload: producer revision plus ordered clips
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EdlPayload {
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub clips: Vec<ClipPayload>,
}

/// Speaker-level grouping of consecutive segments.
///
/// `start_sec`/`end_sec` are edited-timeline times; the optional original
/// pair locates the clip in the source audio. Segment times inside
/// `segments` are clip-relative.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClipPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_nan", deserialize_with = "nan_if_null")]
    pub start_sec: f64,
    #[serde(default = "default_nan", deserialize_with = "nan_if_null")]
    pub end_sec: f64,
    #[serde(default)]
    pub original_start_sec: Option<f64>,
    #[serde(default)]
    pub original_end_sec: Option<f64>,
    #[serde(default)]
    pub speaker: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub segments: Vec<SegmentPayload>,
}

/// One word or spacer within a clip, times relative to the clip start
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPayload {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default = "default_nan", deserialize_with = "nan_if_null")]
    pub start_sec: f64,
    #[serde(default = "default_nan", deserialize_with = "nan_if_null")]
    pub end_sec: f64,
    #[serde(default)]
    pub original_start_sec: Option<f64>,
    #[serde(default)]
    pub original_end_sec: Option<f64>,
    #[serde(default)]
    pub text: String,
}

/// Parse one input line into a [`Command`].
///
/// Distinguishes an unrecognized `type` (reported as "unknown command") from
/// a line that fails to parse at all.
pub fn parse_line(line: &str) -> crate::Result<Command> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        debug!("command line is not valid JSON: {}", e);
        Error::EdlParse(e.to_string())
    })?;

    let known = value
        .get("type")
        .and_then(|t| t.as_str())
        .map(|t| {
            matches!(
                t,
                "load"
                    | "play"
                    | "pause"
                    | "stop"
                    | "seek"
                    | "setRate"
                    | "setVolume"
                    | "queryState"
                    | "updateEdl"
                    | "updateEdlFromFile"
            )
        })
        .unwrap_or(false);

    if !known {
        return Err(Error::UnknownCommand);
    }

    serde_json::from_value(value).map_err(|e| {
        debug!("command payload failed to deserialize: {}", e);
        Error::EdlParse(e.to_string())
    })
}

/// Parse a standalone EDL payload (the contents of a hand-off file).
pub fn parse_edl_payload(json: &str) -> crate::Result<EdlPayload> {
    serde_json::from_str(json).map_err(|e| {
        debug!("EDL file contents failed to parse: {}", e);
        Error::EdlFileInvalid
    })
}
