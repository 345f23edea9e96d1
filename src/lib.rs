//! # EDL Audio Engine
//!
//! Headless playback engine that plays a single audio file according to an
//! externally supplied Edit Decision List (EDL). The EDL defines a virtual
//! "edited" timeline of word/spacer segments, each mapping to a region of the
//! "original" source audio; the engine stitches those regions together
//! sample-accurately in the audio callback while reporting position in both
//! timelines.
//!
//! **Architecture:** symphonia decode + rubato resample into an in-memory
//! source buffer, cpal output callback driven by an EDL stitching source,
//! line-delimited JSON commands/events on stdin/stdout.

pub mod audio;
pub mod config;
pub mod edl;
pub mod error;
pub mod events;
pub mod playback;
pub mod protocol;

pub use error::{Error, Result};
