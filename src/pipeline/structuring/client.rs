use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::types::{CompletionParams, LlmClient};
use super::StructuringError;
use crate::config::AnalysisSettings;

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(settings: &AnalysisSettings) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            client,
            timeout_secs: settings.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from /chat/completions
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl LlmClient for OpenAiClient {
    fn complete(
        &self,
        system: &str,
        user: &str,
        params: CompletionParams,
    ) -> Result<String, StructuringError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut messages = Vec::with_capacity(2);
        if !system.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    StructuringError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    StructuringError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    StructuringError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| StructuringError::MalformedResponse("Reply has no message content".into()))
    }
}

/// Mock LLM client for testing. Returns configured responses in order,
/// repeating the last one once the queue runs dry.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
    last: String,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::with_responses(&[response])
    }

    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            last: responses.last().map(|r| r.to_string()).unwrap_or_default(),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn complete(
        &self,
        _system: &str,
        _user: &str,
        _params: CompletionParams,
    ) -> Result<String, StructuringError> {
        let next = match self.responses.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => None,
        };
        Ok(next.unwrap_or_else(|| self.last.clone()))
    }
}

/// LLM client that always fails with a transport error.
pub struct FailingLlmClient;

impl LlmClient for FailingLlmClient {
    fn complete(
        &self,
        _system: &str,
        _user: &str,
        _params: CompletionParams,
    ) -> Result<String, StructuringError> {
        Err(StructuringError::Connection("mock://unreachable".into()))
    }
}
