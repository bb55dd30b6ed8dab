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

use super::error::ApiError;
use crate::state::AppState;
use analyst::history::ADDED_NOTICE;
use analyst::loader::RESET;
use analyst::{Answer, LoadOutcome, ReportOutcome, ReportWriter, Session};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabula::Preview;
use tokio::sync::OwnedMutexGuard;
use tracing::info;
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub added: bool,
    pub history_len: usize,
    pub notification: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ClearView {
    pub question: &'static str,
    pub answer: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub message: Option<String>,
    pub file_name: Option<String>,
    pub download_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetView {
    pub status: &'static str,
    pub preview: Preview,
    pub question: &'static str,
    pub answer: &'static str,
    pub history_len: usize,
    pub report: Option<String>,
}

pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/dataset", post(upload_dataset))
        .route("/api/sessions/{id}/ask", post(ask))
        .route("/api/sessions/{id}/clear", post(clear))
        .route("/api/sessions/{id}/history", post(add_history))
        .route("/api/sessions/{id}/report", post(generate_report))
        .route("/api/sessions/{id}/reset", post(reset))
        .route("/api/sessions/{id}/reports/{file}", get(download_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// A session locked for the rest of the request and marked as used.
struct Active {
    id: Uuid,
    session: OwnedMutexGuard<Session>,
}

impl Active {
    fn reports(&self, state: &AppState) -> Result<ReportWriter, ApiError> {
        state
            .reports
            .for_session(&self.id.to_string())
            .ok_or_else(|| ApiError::session_not_found(&self.id.to_string()))
    }
}

async fn session(state: &AppState, raw: &str) -> Result<Active, ApiError> {
    let missing = || ApiError::session_not_found(raw);
    let id = Uuid::parse_str(raw).map_err(|_| missing())?;
    let shared = state.sessions.get(&id).await.ok_or_else(missing)?;
    let mut session = shared.lock_owned().await;
    session.touch();
    Ok(Active { id, session })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let id = state.sessions.create().await;
    (
        StatusCode::CREATED,
        Json(SessionView {
            session_id: id.to_string(),
        }),
    )
}

async fn upload_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LoadOutcome>, ApiError> {
    let mut active = session(&state, &id).await?;
    let name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload.csv");
    Ok(Json(state.loader.load_bytes(&mut active.session, Some(&body[..]), name)))
}

async fn ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    let active = session(&state, &id).await?;
    let answer = state
        .pipeline
        .answer(&request.question, active.session.dataset())
        .await?;
    Ok(Json(answer))
}

async fn clear(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ClearView>, ApiError> {
    session(&state, &id).await?;
    Ok(Json(ClearView {
        question: "",
        answer: "",
    }))
}

async fn add_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<HistoryRequest>,
) -> Result<Json<HistoryView>, ApiError> {
    let mut active = session(&state, &id).await?;
    let added = active
        .session
        .history_mut()
        .append(request.question, request.answer);
    Ok(Json(HistoryView {
        added,
        history_len: active.session.history().len(),
        notification: added.then_some(ADDED_NOTICE),
    }))
}

async fn generate_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportView>, ApiError> {
    let active = session(&state, &id).await?;
    let records = active.session.history().records().to_vec();
    let view = match active.reports(&state)?.write_async(records).await? {
        ReportOutcome::Empty { message } => ReportView {
            message: Some(message),
            file_name: None,
            download_url: None,
        },
        ReportOutcome::Written { file_name, .. } => ReportView {
            message: None,
            download_url: Some(format!("/api/sessions/{}/reports/{file_name}", active.id)),
            file_name: Some(file_name),
        },
    };
    Ok(Json(view))
}

async fn reset(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ResetView>, ApiError> {
    let mut active = session(&state, &id).await?;
    active.session.reset();
    info!(session_id = %active.id, "session reset");
    Ok(Json(ResetView {
        status: RESET,
        preview: Preview::empty(),
        question: "",
        answer: "",
        history_len: 0,
        report: None,
    }))
}

async fn download_report(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let active = session(&state, &id).await?;
    let path = active
        .reports(&state)?
        .resolve(&file)
        .ok_or_else(|| ApiError::report_not_found(&file))?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::report_not_found(&file))
        }
        Err(e) => return Err(analyst::AnalystError::from(e).into()),
    };
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
