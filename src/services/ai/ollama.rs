use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, Message};

/// A local Ollama server, non-streaming.
pub struct OllamaProvider {
    url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaProvider {
    pub fn new(url: String, model: String, temperature: f32) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn request<'a>(&'a self, system_prompt: &'a str, messages: &'a [Message]) -> ChatRequest<'a> {
        let messages = std::iter::once(ChatMessage {
            role: "system",
            content: system_prompt,
        })
        .chain(messages.iter().map(|m| ChatMessage {
            role: &m.role,
            content: &m.content,
        }))
        .collect();

        ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let data: ChatResponse = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&self.request(system_prompt, messages))
            .send()
            .await
            .context("failed to reach Ollama")?
            .error_for_status()
            .context("Ollama returned an error status")?
            .json()
            .await
            .context("failed to parse Ollama response")?;

        data.message
            .map(|m| m.content)
            .context("missing message in Ollama response")
    }
}
