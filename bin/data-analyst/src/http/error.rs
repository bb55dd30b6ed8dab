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

use analyst::AnalystError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            request_id: Uuid::new_v4().to_string(),
            status,
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "SESSION_NOT_FOUND",
            format!("Session '{id}' does not exist; create one with POST /api/sessions."),
        )
    }

    pub fn report_not_found(name: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "REPORT_NOT_FOUND",
            format!("Report '{name}' does not exist."),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AnalystError> for ApiError {
    fn from(e: AnalystError) -> Self {
        let (status, code) = match &e {
            AnalystError::Model(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_API_ERROR"),
            AnalystError::Data(_) => (StatusCode::BAD_REQUEST, "DATA_ERROR"),
            AnalystError::Io(_) | AnalystError::Report(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "REPORT_ERROR")
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = %self.code, request_id = %self.request_id, message = %self.message, "request failed");
        }
        let status = self.status;
        let body = Json(self);
        (status, body).into_response()
    }
}
