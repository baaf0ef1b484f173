use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, Message};

/// Any endpoint speaking the OpenAI chat-completions protocol
/// (OpenRouter, Groq, OpenAI itself).
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: String, api_key: String, model: String, temperature: f32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn request<'a>(&'a self, system_prompt: &'a str, messages: &'a [Message]) -> CompletionRequest<'a> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(WireMessage {
            role: "system",
            content: system_prompt,
        });
        wire.extend(messages.iter().map(|m| WireMessage {
            role: &m.role,
            content: &m.content,
        }));

        CompletionRequest {
            model: &self.model,
            messages: wire,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(system_prompt, messages))
            .send()
            .await
            .context("failed to call chat completions API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completions API error ({status}): {body}");
        }

        let data: CompletionResponse = resp
            .json()
            .await
            .context("failed to parse chat completions response")?;

        data.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("missing content in chat completions response")
    }
}
