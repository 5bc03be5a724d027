//! Chat-completion client for OpenAI-compatible APIs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed chat response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A text-generation backend.
pub trait ChatModel: Send + Sync {
    /// Send the conversation and return the full text of the reply.
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct ChatClient {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl ChatClient {
    /// `timeout` of `None` keeps reqwest's default.
    pub fn new(
        api_base: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, LlmError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

impl ChatModel for ChatClient {
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        log::debug!(
            "chat completion: model={} messages={} temperature={}",
            self.model,
            messages.len(),
            temperature
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
                temperature,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text()?;
        parse_reply(&body)
    }
}

fn parse_reply(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::MalformedResponse("response has no message content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::system("be helpful"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.7,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_parse_reply() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"A lovely home."}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "A lovely home.");
    }

    #[test]
    fn test_parse_reply_without_choices() {
        let result = parse_reply(r#"{"choices":[]}"#);
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_reply_not_json() {
        let result = parse_reply("<html>bad gateway</html>");
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn test_missing_key_fails_at_first_use() {
        let client = ChatClient::new("http://127.0.0.1:9", None, "gpt-4o", None).unwrap();
        let result = client.complete(&[ChatMessage::user("hi")], 0.7);
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }
}
