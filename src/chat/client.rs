use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, error, info};

use super::types::{ChatCompletion, ChatMessage, CompletionRequest, CompletionResponse};
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};

/// Client for an OpenAI-style chat-completion endpoint
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(ChatError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Run one chat completion and return the text plus token counts.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f64,
        max_tokens: u32,
    ) -> ChatResult<ChatCompletion> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        debug!(
            model = %model,
            temperature = temperature,
            messages = request.messages.len(),
            "Calling chat endpoint"
        );

        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChatError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    ChatError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(
                model = %model,
                status = status.as_u16(),
                "Chat call failed"
            );
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|e| ChatError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ChatError::InvalidResponse {
                message: "Response contained no choices".to_string(),
            })?;

        let (input_tokens, output_tokens) = completion
            .usage
            .map(|u| {
                (
                    u.prompt_tokens.unwrap_or(0),
                    u.completion_tokens.unwrap_or(0),
                )
            })
            .unwrap_or((0, 0));

        info!(
            model = %model,
            latency_ms = start.elapsed().as_millis() as u64,
            input_tokens = input_tokens,
            output_tokens = output_tokens,
            "Chat call succeeded"
        );

        Ok(ChatCompletion {
            content,
            input_tokens,
            output_tokens,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
