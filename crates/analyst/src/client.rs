// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use llm_contracts::{
    GenerationConfig, LLMError, LLMResult, ProviderConfig, ProviderRequest, ProviderResponse,
    RetryPolicy, Usage,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse>;

    fn provider_name(&self) -> &'static str;
}

/// Client for any OpenAI-compatible `chat/completions` endpoint (Groq by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    api_key: String,
    endpoint: String,
    policy: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(api_key: impl Into<String>, config: &ProviderConfig) -> LLMResult<Self> {
        let policy = config.retry_policy();
        let client = Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: config.endpoint.clone(),
            policy,
        })
    }

    /// Reads the bearer token from the variable named by `config.api_key_env`.
    pub fn from_env(config: &ProviderConfig) -> LLMResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LLMError::Configuration(format!(
                    "environment variable {} is not set; it must hold the model API key",
                    config.api_key_env
                ))
            })?;
        Self::new(api_key, config)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_payload(&self, request: &ProviderRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role.as_str(),
                    "content": msg.content
                })
            }).collect::<Vec<_>>()
        });

        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            payload["stop"] = json!(stop);
        }
        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }

        payload
    }

    fn parse_response(
        &self,
        response_data: Value,
        model: String,
        attempts: u32,
    ) -> LLMResult<ProviderResponse> {
        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Serialisation("response has no choices[0].message.content".to_string())
            })?;

        let usage = response_data
            .get("usage")
            .map(Usage::from_json)
            .unwrap_or_default();
        let finish_reason = response_data["choices"][0]["finish_reason"]
            .as_str()
            .map(|s| s.to_string());

        Ok(ProviderResponse {
            content: content.to_string(),
            model,
            usage,
            finish_reason,
            attempts,
            raw_response: response_data,
        })
    }

    async fn attempt(&self, payload: &Value) -> LLMResult<Value> {
        let sent = tokio::time::timeout(
            self.policy.timeout,
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(payload)
                .send(),
        )
        .await;

        let response = match sent {
            Err(_) => return Err(LLMError::Timeout),
            Ok(Err(e)) if e.is_timeout() => return Err(LLMError::Timeout),
            Ok(Err(e)) => return Err(LLMError::Network(format!("request failed: {e}"))),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LLMError::Serialisation(format!("failed to parse response: {e}")));
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(classify_status(status, body))
    }

    async fn execute_with_retry(&self, payload: Value) -> LLMResult<(Value, u32)> {
        let max_attempts = self.policy.total_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&payload).await {
                Ok(data) => return Ok((data, attempt)),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "model request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "model request failed");
                    return Err(e);
                }
            }
        }
    }
}

/// 429 and 5xx are worth another attempt; any other rejection is final.
fn classify_status(status: StatusCode, body: String) -> LLMError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LLMError::Authentication(format!("{status}: {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimit,
        s if s.is_server_error() => LLMError::Provider(format!("API error {status}: {body}")),
        _ => LLMError::Configuration(format!("request rejected with {status}: {body}")),
    }
}

#[async_trait]
impl ApiClient for ChatCompletionsClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = self.build_payload(&request);
        let (response_data, attempts) = self.execute_with_retry(payload).await?;
        self.parse_response(response_data, request.model, attempts)
    }

    fn provider_name(&self) -> &'static str {
        "chat-completions"
    }
}

/// One model plus its generation settings; turns a prompt into reply text.
#[derive(Clone)]
pub struct Completer {
    client: Arc<dyn ApiClient>,
    model: String,
    generation: GenerationConfig,
}

impl Completer {
    pub fn new(client: Arc<dyn ApiClient>, config: &ProviderConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            generation: config.generation(),
        }
    }

    pub async fn complete(&self, prompt: String) -> LLMResult<String> {
        let request = ProviderRequest::completion(&self.model, prompt, &self.generation);
        let response = self.client.send_request(request).await?;
        debug!(
            provider = self.client.provider_name(),
            model = %response.model,
            attempts = response.attempts,
            total_tokens = response.usage.total_tokens,
            "completion received"
        );
        if response.truncated() {
            warn!(model = %response.model, "completion hit the token limit");
        }
        Ok(response.text().to_string())
    }
}
