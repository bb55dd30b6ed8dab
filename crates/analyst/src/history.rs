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

/// Shown by the page after a successful append.
pub const ADDED_NOTICE: &str = "Added to the PDF history!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
}

/// Append-only list of question/answer pairs destined for the report.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<QaRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and stores nothing when either side is blank.
    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) -> bool {
        let (question, answer) = (question.into(), answer.into());
        if question.trim().is_empty() || answer.trim().is_empty() {
            return false;
        }
        self.records.push(QaRecord { question, answer });
        true
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[QaRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_pairs_are_ignored() {
        let mut history = History::new();
        assert!(!history.append("", "an answer"));
        assert!(!history.append("a question", "   \n"));
        assert!(history.is_empty());
    }

    #[test]
    fn append_keeps_order_and_duplicates() {
        let mut history = History::new();
        assert!(history.append("q1", "a1"));
        assert!(history.append("q2", "a2"));
        assert!(history.append("q1", "a1"));
        let questions: Vec<_> = history.records().iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, ["q1", "q2", "q1"]);
        history.clear();
        assert_eq!(history.len(), 0);
    }
}
