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

use analyst::{ApiClient, ChatCompletionsClient};
use llm_contracts::{LLMError, ProviderConfig, ProviderRequest};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        endpoint: format!("{}/openai/v1/chat/completions", server.uri()),
        timeout_seconds: 5,
        max_retries: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..ProviderConfig::default()
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 }
    })
}

fn request(config: &ProviderConfig) -> ProviderRequest {
    ProviderRequest::completion(&config.model, "How many rows?", &config.generation())
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("len(df)")))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = ChatCompletionsClient::new("test-key", &config).unwrap();
    let response = client.send_request(request(&config)).await.unwrap();

    assert_eq!(response.content, "len(df)");
    assert_eq!(response.attempts, 2);
    assert_eq!(response.usage.total_tokens, 13);
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = ChatCompletionsClient::new("wrong", &config).unwrap();
    let err = client.send_request(request(&config)).await.unwrap_err();

    assert!(matches!(err, LLMError::Authentication(ref m) if m.contains("invalid api key")));
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn gives_up_after_the_last_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = ChatCompletionsClient::new("test-key", &config).unwrap();
    let err = client.send_request(request(&config)).await.unwrap_err();

    assert!(matches!(err, LLMError::Provider(_)));
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn request_body_is_a_single_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = ChatCompletionsClient::new("test-key", &config).unwrap();
    client.send_request(request(&config)).await.unwrap();

    let received = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["model"], "llama-3.1-8b-instant");
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["messages"][0]["content"], "How many rows?");
}
