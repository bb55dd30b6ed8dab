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
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use data_analyst::{build_router, AppConfig, AppState};
use llm_contracts::{LLMError, LLMResult, ProviderRequest, ProviderResponse, Usage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct ScriptedClient {
    replies: Mutex<VecDeque<LLMResult<String>>>,
}

#[async_trait]
impl analyst::ApiClient for ScriptedClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::Provider("script exhausted".into())));
        Ok(ProviderResponse {
            content: reply?,
            model: request.model,
            usage: Usage::default(),
            finish_reason: None,
            attempts: 1,
            raw_response: Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

struct Harness {
    app: Router,
    reports: tempfile::TempDir,
}

fn harness(replies: Vec<LLMResult<String>>) -> Harness {
    let reports = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.report.output_dir = reports.path().to_path_buf();
    let client = Arc::new(ScriptedClient {
        replies: Mutex::new(replies.into()),
    });
    let state = AppState::new(&config, client);
    Harness {
        app: build_router(state, config.server.body_limit_bytes),
        reports,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

async fn new_session(app: &Router) -> String {
    let (status, body) = send(app, post_empty("/api/sessions")).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

async fn upload(app: &Router, id: &str, csv: &'static str) -> Value {
    let request = Request::post(format!("/api/sessions/{id}/dataset"))
        .header("x-file-name", "people.csv")
        .body(Body::from(csv))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_and_index() {
    let h = harness(vec![]);
    let (status, body) = send(&h.app, Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_ask_history_report_reset() {
    let h = harness(vec![
        Ok("len(df)".into()),
        Ok("The file has 2 rows. The code used was len(df)".into()),
    ]);
    let id = new_session(&h.app).await;

    let loaded = upload(&h.app, &id, "age,name\n31,ann\n7,bo\n").await;
    assert_eq!(loaded["status"], "File loaded successfully!");
    assert_eq!(loaded["preview"]["columns"], json!(["age", "name"]));

    let (status, answer) = send(
        &h.app,
        post_json(&format!("/api/sessions/{id}/ask"), json!({ "question": "how many rows?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["text"], "The file has 2 rows. The code used was len(df)");
    assert_eq!(answer["expression"], "len(df)");
    assert_eq!(answer["outcome"]["status"], "success");
    assert_eq!(answer["outcome"]["rendered"], "2");

    let (_, skipped) = send(
        &h.app,
        post_json(&format!("/api/sessions/{id}/history"), json!({ "question": "rows?", "answer": "" })),
    )
    .await;
    assert_eq!(skipped["added"], false);
    assert_eq!(skipped["history_len"], 0);

    let (_, added) = send(
        &h.app,
        post_json(
            &format!("/api/sessions/{id}/history"),
            json!({ "question": "how many rows?", "answer": answer["text"] }),
        ),
    )
    .await;
    assert_eq!(added["added"], true);
    assert_eq!(added["history_len"], 1);
    assert_eq!(added["notification"], "Added to the PDF history!");

    let (status, report) = send(&h.app, post_empty(&format!("/api/sessions/{id}/report"))).await;
    assert_eq!(status, StatusCode::OK);
    let url = report["download_url"].as_str().unwrap().to_string();
    assert!(url.ends_with(".pdf"));

    let download = h
        .app
        .clone()
        .oneshot(Request::get(url.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(download.headers()["content-type"], "application/pdf");

    let (_, reset) = send(&h.app, post_empty(&format!("/api/sessions/{id}/reset"))).await;
    assert_eq!(reset["history_len"], 0);
    assert_eq!(reset["answer"], "");

    let (_, answer) = send(
        &h.app,
        post_json(&format!("/api/sessions/{id}/ask"), json!({ "question": "how many rows?" })),
    )
    .await;
    assert_eq!(answer["text"], "");

    let (_, report) = send(&h.app, post_empty(&format!("/api/sessions/{id}/report"))).await;
    assert_eq!(report["message"], "There is no data to generate the PDF.");
}

#[tokio::test]
async fn failed_upload_keeps_previous_dataset() {
    let h = harness(vec![Ok("len(df)".into()), Ok("One row.".into())]);
    let id = new_session(&h.app).await;
    upload(&h.app, &id, "a\n1\n").await;

    let rejected = upload(&h.app, &id, "a,b\n1,2,3\n").await;
    assert!(rejected["status"].as_str().unwrap().starts_with("Error loading file: "));
    assert_eq!(rejected["preview"]["columns"], json!([]));

    let empty = upload(&h.app, &id, "").await;
    assert_eq!(empty["status"], "Please upload a CSV file to analyse.");

    let (_, answer) = send(
        &h.app,
        post_json(&format!("/api/sessions/{id}/ask"), json!({ "question": "how many rows?" })),
    )
    .await;
    assert_eq!(answer["outcome"]["rendered"], "1");
}

#[tokio::test]
async fn unknown_session_is_404() {
    let h = harness(vec![]);
    let (status, body) = send(
        &h.app,
        post_json("/api/sessions/7f1c1f4e-0000-4000-8000-000000000000/ask", json!({ "question": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SESSION_NOT_FOUND");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn model_failure_is_502() {
    let h = harness(vec![Err(LLMError::Provider("upstream down".into()))]);
    let id = new_session(&h.app).await;
    upload(&h.app, &id, "a\n1\n").await;

    let (status, body) = send(
        &h.app,
        post_json(&format!("/api/sessions/{id}/ask"), json!({ "question": "sum of a?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "EXTERNAL_API_ERROR");
}

async fn get_status(app: &Router, uri: &str) -> StatusCode {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn only_report_names_are_served() {
    let h = harness(vec![]);
    let id = new_session(&h.app).await;
    let status = get_status(&h.app, &format!("/api/sessions/{id}/reports/secret.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn report_for(app: &Router, question: &str) -> (String, String) {
    let id = new_session(app).await;
    let (_, added) = send(
        app,
        post_json(
            &format!("/api/sessions/{id}/history"),
            json!({ "question": question, "answer": "An answer." }),
        ),
    )
    .await;
    assert_eq!(added["added"], true);
    let (status, report) = send(app, post_empty(&format!("/api/sessions/{id}/report"))).await;
    assert_eq!(status, StatusCode::OK);
    (id, report["download_url"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn reports_stay_with_their_session() {
    let h = harness(vec![]);
    let (first, first_url) = report_for(&h.app, "First session question?").await;
    let (second, second_url) = report_for(&h.app, "Second session question?").await;

    assert_ne!(first_url, second_url);
    assert!(first_url.starts_with(&format!("/api/sessions/{first}/reports/")));
    assert!(second_url.starts_with(&format!("/api/sessions/{second}/reports/")));
    assert_eq!(get_status(&h.app, &first_url).await, StatusCode::OK);
    assert_eq!(get_status(&h.app, &second_url).await, StatusCode::OK);

    let file = first_url.rsplit('/').next().unwrap();
    let borrowed = format!("/api/sessions/{second}/reports/{file}");
    if borrowed != second_url {
        assert_eq!(get_status(&h.app, &borrowed).await, StatusCode::NOT_FOUND);
    }
    let stranger = format!("/api/sessions/{}/reports/{file}", uuid::Uuid::new_v4());
    assert_eq!(get_status(&h.app, &stranger).await, StatusCode::NOT_FOUND);

    let files: Vec<_> = std::fs::read_dir(h.reports.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(files.len(), 2);
}
