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

use crate::client::Completer;
use crate::prompts::generation_prompt;
use llm_contracts::LLMResult;
use tabula::{Dataset, DEFAULT_PREVIEW_ROWS};
use tracing::debug;

/// Asks the model for one expression answering a question.
#[derive(Clone)]
pub struct ExpressionGenerator {
    completer: Completer,
    preview_rows: usize,
}

impl ExpressionGenerator {
    pub fn new(completer: Completer) -> Self {
        Self {
            completer,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }

    pub fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.preview_rows = preview_rows;
        self
    }

    /// Returns the model's reply verbatim; normalisation happens at evaluation.
    pub async fn generate(&self, question: &str, dataset: &Dataset) -> LLMResult<String> {
        let prompt = generation_prompt(dataset, question, self.preview_rows);
        let expression = self.completer.complete(prompt).await?;
        debug!(expression = %expression.trim(), "expression generated");
        Ok(expression)
    }
}
