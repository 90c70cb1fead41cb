//! Chat-completions client for the text stages.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::PipelineError;

/// One request to the text-generation endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    /// System role text
    pub system: &'a str,
    /// User prompt
    pub user: &'a str,
    /// Cap on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

/// Request body for POST /v1/chat/completions
#[derive(Serialize, Debug)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Thin client over an OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Debug)]
pub struct TextGenClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl TextGenClient {
    /// Builds a client for `{base_url}/v1/chat/completions`.
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Sends one chat request and returns the first choice's text.
    ///
    /// Non-success status, an unreadable body, or a response without any
    /// non-empty content are all errors.
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    pub async fn complete(&self, request: ChatRequest<'_>) -> Result<String, PipelineError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            debug!(
                "chat completions error body: {}",
                String::from_utf8_lossy(&bytes)
            );
            return Err(PipelineError::Status {
                endpoint: "chat completions",
                status,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|err| PipelineError::Parse(format!("chat completions body: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| PipelineError::Parse("chat completions returned no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_chat_completions_shape() {
        let body = ChatCompletionBody {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            max_tokens: 200,
            temperature: 0.5,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["max_tokens"], 200);
        assert_eq!(value["temperature"], 0.5);
    }

    #[test]
    fn response_without_content_deserializes() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#)
                .expect("parse");
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn endpoint_joins_base_without_double_slash() {
        let client = TextGenClient::new(reqwest::Client::new(), "http://x/", "k", "m");
        assert_eq!(client.endpoint, "http://x/v1/chat/completions");
    }
}
