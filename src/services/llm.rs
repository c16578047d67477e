//! Remote chat LLM client — HTTP POST `/api/chat` (spec.md §6), streaming
//! NDJSON responses concatenated until `done:true`. Request/response shapes
//! follow the Ollama chat API, which the teacher's `services::llm::client`
//! module also targets (there via `/completion`, a one-shot variant).

use crate::error::ExternalServiceFailure;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    keep_alive: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChatChunkMessage {
    content: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Sends `history` and returns the assistant's concatenated reply.
    pub fn chat(&self, history: &[ChatMessage]) -> Result<String, ExternalServiceFailure> {
        let body = ChatRequest { model: &self.model, messages: history, stream: true, keep_alive: "5m" };

        let mut resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| ExternalServiceFailure::Llm(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExternalServiceFailure::Llm(format!("status {}", resp.status())));
        }

        let mut raw = String::new();
        resp.read_to_string(&mut raw).map_err(|e| ExternalServiceFailure::Llm(e.to_string()))?;

        let mut out = String::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| ExternalServiceFailure::Llm(e.to_string()))?;
            if let Some(msg) = chunk.message {
                out.push_str(&msg.content);
            }
            if chunk.done {
                break;
            }
        }
        Ok(out.trim().to_string())
    }

    /// One-shot reply ignoring history, used when `use_chat=false`.
    pub fn complete(&self, prompt: &str) -> Result<String, ExternalServiceFailure> {
        self.chat(&[ChatMessage::user(prompt)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_ndjson_chunks() {
        let raw = "{\"message\":{\"content\":\"hi\"},\"done\":false}\n{\"message\":{\"content\":\" there\"},\"done\":true}\n";
        let mut out = String::new();
        for line in raw.lines() {
            let chunk: ChatChunk = serde_json::from_str(line).unwrap();
            if let Some(m) = chunk.message {
                out.push_str(&m.content);
            }
            if chunk.done {
                break;
            }
        }
        assert_eq!(out, "hi there");
    }
}
