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

//! Question answering over an uploaded CSV: expression generation and
//! answer synthesis through a chat-completions model, evaluation through
//! `tabula`, plus the per-session history and PDF report.

pub mod client;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod history;
pub mod loader;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod session;
pub mod synthesizer;

pub use client::{ApiClient, ChatCompletionsClient, Completer};
pub use error::{AnalystError, AnalystResult};
pub use evaluator::{evaluate_expression, EvaluationOutcome};
pub use generator::ExpressionGenerator;
pub use history::{History, QaRecord, ADDED_NOTICE};
pub use loader::{DatasetLoader, LoadOutcome};
pub use pipeline::{Answer, Pipeline};
pub use report::{ReportOutcome, ReportWriter};
pub use session::Session;
pub use synthesizer::AnswerSynthesizer;
