//! Error types for edl-engine
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Command-level errors are reported to the caller as `error`
//! events; they never abort the process.

use thiserror::Error;

/// Main error type for edl-engine
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or the decoder cannot open it
    #[error("Audio file not found")]
    AudioFileNotFound,

    /// Decoder opened the file but could not produce audio
    #[error("Failed to open audio file")]
    AudioOpen(String),

    /// Control operation issued while no media is loaded
    #[error("No audio loaded")]
    NoAudio,

    /// Malformed command line or EDL payload
    #[error("Invalid EDL payload")]
    EdlParse(String),

    /// Structurally valid EDL that produced zero usable segments
    #[error("EDL produced no usable segments")]
    EdlInvalid,

    /// `type` discriminator not recognized
    #[error("unknown command")]
    UnknownCommand,

    /// EDL hand-off file missing from an updateEdlFromFile command
    #[error("Missing EDL file path")]
    MissingEdlPath,

    /// EDL hand-off file could not be read
    #[error("Unable to read EDL file")]
    EdlFileUnreadable,

    /// EDL hand-off file contents did not parse
    #[error("Invalid EDL file contents")]
    EdlFileInvalid,

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Resampling failure while preparing a source buffer
    #[error("Resample error: {0}")]
    Resample(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the edl-engine Error
pub type Result<T> = std::result::Result<T, Error>;
