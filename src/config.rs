use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::AudioFormat;
use crate::chunker::{ChunkStrategy, MAX_CHUNK_SIZE};
use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Settings for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Where merged audio files are written.
    pub output_dir: PathBuf,
    /// Parent of the per-run directories holding chunk audio.
    pub work_dir: PathBuf,
    pub max_chunk_chars: usize,
    /// Synthesis requests allowed in flight at once.
    pub concurrency: usize,
    pub chunking: ChunkStrategy,
    pub format: AudioFormat,
    pub tts_model: String,
    pub voice: String,
    pub title_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
            output_dir: PathBuf::from("./public"),
            work_dir: PathBuf::from("./tmp"),
            max_chunk_chars: MAX_CHUNK_SIZE,
            concurrency: 1,
            chunking: ChunkStrategy::Fixed,
            format: AudioFormat::Mp3,
            tts_model: "tts-1".to_string(),
            voice: "fable".to_string(),
            title_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(invalid("api_key", "OPENAI_API_KEY is not set"));
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(invalid("api_base", "must be an http(s) URL"));
        }
        if self.voice.trim().is_empty() {
            return Err(invalid("voice", "must not be empty"));
        }
        self.validate_limits()
    }

    /// Checks the settings the pipeline itself depends on, whatever services
    /// it talks to.
    pub fn validate_limits(&self) -> Result<(), ConfigError> {
        if self.max_chunk_chars == 0 {
            return Err(invalid("max_chunk_chars", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}
