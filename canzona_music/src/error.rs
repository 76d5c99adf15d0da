// Error types for canzona_music.
//
// Only operations that touch the filesystem or (de)serialize JSON can fail.
// Malformed MIDI input is never an error: the decoder reports it through
// `midi_parse::Diagnostic` and returns what it could recover.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MusicError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A model snapshot or config file was not valid JSON for its type.
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The MIDI writer rejected the event stream.
    #[error("MIDI encoding failed: {0}")]
    Midi(String),

    /// A setting could not be interpreted (e.g. an unknown scale name).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MusicError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MusicError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        MusicError::Json {
            path: path.into(),
            source,
        }
    }
}
