//! Error types for the conversion pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single speech synthesis call.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("speech service returned no audio")]
    EmptyAudio,
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("nothing to merge")]
    NoInputs,

    #[error("input artifact missing: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("I/O error during merge: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Tool { status: String, stderr: String },

    #[error("invalid WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("sample format of {} does not match the first input", .path.display())]
    FormatMismatch { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conversion not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("library file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("synthesis of chunk {index} failed: {source}")]
    ChunkSynthesis {
        index: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("could not write audio for chunk {index}: {source}")]
    ChunkWrite {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("no audio was produced for chunk {0}")]
    MissingChunk(usize),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("permit gate closed: {0}")]
    GateClosed(#[from] tokio::sync::AcquireError),

    #[error("synthesis task aborted: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
