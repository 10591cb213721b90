//! Azure OpenAI chat completions.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::token::TokenProvider;

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for an Azure OpenAI chat deployment.
#[derive(Clone)]
pub struct ChatClient {
    config: Arc<ChatConfig>,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Creates a chat client that authenticates with tokens from `tokens`.
    pub fn new(config: ChatConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| Error::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            client,
            tokens,
        })
    }

    /// The chat configuration in use.
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Build the chat completions URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            crate::util::with_scheme(&self.config.endpoint),
            self.config.model,
            self.config.api_version
        )
    }

    /// Build the request body for a single user message.
    #[must_use]
    pub fn build_body(&self, message: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![
                ChatMessage::system(&self.config.system_prompt),
                ChatMessage::user(message),
            ],
            max_tokens: None,
            temperature: None,
        }
    }

    /// Sends `message` and returns the assistant's reply.
    ///
    /// # Errors
    ///
    /// Fails when no token can be obtained, the endpoint answers with a
    /// non-success status, or the reply has no content.
    pub async fn complete(&self, message: &str) -> Result<String> {
        self.send(&self.build_body(message)).await
    }

    /// Sends a prepared request and returns the first choice's content.
    ///
    /// # Errors
    ///
    /// See [`ChatClient::complete`].
    pub async fn send(&self, body: &ChatCompletionRequest) -> Result<String> {
        let token = self.tokens.auth_token().await?;
        let url = self.completions_url();
        debug!(url = %url, messages = body.messages.len(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %error_text, "chat request rejected");
            return Err(Error::api(status.as_u16(), error_text));
        }

        let response_text = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            Error::response_format(
                "valid chat completion response",
                format!("parse error: {e}, response: {response_text}"),
            )
        })?;

        Self::parse_response(parsed)
    }

    fn parse_response(response: ChatCompletionResponse) -> Result<String> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::response_format("at least one choice", "empty choices"))?;

        choice
            .message
            .content
            .ok_or_else(|| Error::response_format("message content", "null content"))
    }
}
