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

use crate::client::{ApiClient, Completer};
use crate::error::AnalystResult;
use crate::evaluator::{evaluate_expression, EvaluationOutcome};
use crate::generator::ExpressionGenerator;
use crate::synthesizer::AnswerSynthesizer;
use llm_contracts::ProviderConfig;
use serde::Serialize;
use std::sync::Arc;
use tabula::Dataset;
use tracing::{info, instrument};

/// Final answer plus the intermediate steps, for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub expression: Option<String>,
    pub outcome: Option<EvaluationOutcome>,
}

impl Answer {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Question in, answer out: generate, evaluate, synthesise.
#[derive(Clone)]
pub struct Pipeline {
    generator: ExpressionGenerator,
    synthesizer: AnswerSynthesizer,
}

impl Pipeline {
    pub fn new(client: Arc<dyn ApiClient>, config: &ProviderConfig) -> Self {
        let completer = Completer::new(client, config);
        Self {
            generator: ExpressionGenerator::new(completer.clone()),
            synthesizer: AnswerSynthesizer::new(completer),
        }
    }

    pub fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.generator = self.generator.with_preview_rows(preview_rows);
        self
    }

    /// An absent dataset or a blank question yields an empty answer, not an error.
    #[instrument(skip_all, fields(question = %question.trim()))]
    pub async fn answer(&self, question: &str, dataset: Option<&Dataset>) -> AnalystResult<Answer> {
        let question = question.trim();
        let Some(dataset) = dataset.filter(|_| !question.is_empty()) else {
            return Ok(Answer::default());
        };

        let expression = self.generator.generate(question, dataset).await?;
        let outcome = evaluate_expression(&expression, dataset);
        let text = self
            .synthesizer
            .synthesize(question, &expression, &outcome)
            .await?;
        info!(evaluated = outcome.is_success(), "question answered");

        Ok(Answer {
            text,
            expression: Some(expression.trim().to_string()),
            outcome: Some(outcome),
        })
    }
}
