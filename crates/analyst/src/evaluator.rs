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

use serde::{Deserialize, Serialize};
use tabula::{evaluate, Dataset};
use tracing::{debug, warn};

/// Result of running a generated expression, kept apart from the answer text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Success { rendered: String },
    Failure { kind: String, message: String },
}

impl EvaluationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationOutcome::Success { .. })
    }

    pub fn rendered(&self) -> Option<&str> {
        match self {
            EvaluationOutcome::Success { rendered } => Some(rendered),
            EvaluationOutcome::Failure { .. } => None,
        }
    }
}

pub fn evaluate_expression(expression: &str, dataset: &Dataset) -> EvaluationOutcome {
    match evaluate(expression, dataset) {
        Ok(value) => {
            let rendered = value.render();
            debug!(result_type = value.type_name(), "expression evaluated");
            EvaluationOutcome::Success { rendered }
        }
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "expression evaluation failed");
            EvaluationOutcome::Failure {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula::CsvReader;

    fn dataset() -> Dataset {
        CsvReader::new()
            .read_bytes(b"age,name\n31,ann\n7,bo\n", "people")
            .unwrap()
    }

    #[test]
    fn success_carries_rendered_text() {
        let outcome = evaluate_expression("len(df)", &dataset());
        assert_eq!(outcome.rendered(), Some("2"));
    }

    #[test]
    fn failure_is_tagged_with_kind() {
        let outcome = evaluate_expression("df['salary'].sum()", &dataset());
        match outcome {
            EvaluationOutcome::Failure { kind, message } => {
                assert_eq!(kind, "unknown_column");
                assert!(message.contains("salary"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn serialises_with_status_tag() {
        let json = serde_json::to_value(EvaluationOutcome::Failure {
            kind: "syntax".into(),
            message: "bad".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "syntax");
    }
}
