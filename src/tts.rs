use serde::Serialize;
use std::future::Future;
use tracing::{debug, error};

use crate::audio::AudioFormat;
use crate::error::SynthesisError;

/// Turns one chunk of text into encoded audio.
pub trait SpeechSynthesizer: Send + Sync + 'static {
    fn synthesize(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<u8>, SynthesisError>> + Send;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Client for an OpenAI-compatible `/audio/speech` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    voice: String,
    format: AudioFormat,
}

impl OpenAiSynthesizer {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        format: AudioFormat,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            format,
        }
    }
}

impl SpeechSynthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let url = format!("{}/audio/speech", self.api_base.trim_end_matches('/'));
        debug!("POST {} ({} chars, voice {})", url, text.chars().count(), self.voice);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                response_format: self.format.response_format(),
            })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Speech request failed with {}: {}", status, body);
            return Err(SynthesisError::Status { status, body });
        }

        let bytes = res.bytes().await?;
        if bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(bytes.to_vec())
    }
}
