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
use crate::evaluator::EvaluationOutcome;
use crate::prompts::synthesis_prompt;
use llm_contracts::LLMResult;

#[derive(Clone)]
pub struct AnswerSynthesizer {
    completer: Completer,
}

impl AnswerSynthesizer {
    pub fn new(completer: Completer) -> Self {
        Self { completer }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        expression: &str,
        outcome: &EvaluationOutcome,
    ) -> LLMResult<String> {
        self.completer
            .complete(synthesis_prompt(question, expression, outcome))
            .await
    }
}
