use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

pub const FALLBACK_TITLE: &str = "Untitled";
const TITLE_INPUT_CHARS: usize = 1000;
const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that generates concise titles for text content.";
const USER_PROMPT: &str = "Generate a concise title (5 words or less) for the following text:";

/// Produces a short title for a text. Never fails: implementations fall back
/// to [`FALLBACK_TITLE`].
pub trait TitleGenerator: Send + Sync + 'static {
    fn generate_title(&self, text: &str) -> impl Future<Output = String> + Send;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct OpenAiTitleGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiTitleGenerator {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 20,
        }
    }

    async fn request_title(&self, text: &str) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let excerpt: String = text.chars().take(TITLE_INPUT_CHARS).collect();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: format!("{}\n\n{}...", USER_PROMPT, excerpt),
                },
            ],
            max_tokens: self.max_tokens,
        };

        let res: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let title = res
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if title.is_empty() {
            anyhow::bail!("title service returned no content");
        }
        Ok(title)
    }
}

impl TitleGenerator for OpenAiTitleGenerator {
    async fn generate_title(&self, text: &str) -> String {
        match self.request_title(text).await {
            Ok(title) => {
                info!("Generated title: {}", title);
                title
            }
            Err(e) => {
                warn!("Error generating title, using fallback: {:#}", e);
                FALLBACK_TITLE.to_string()
            }
        }
    }
}
