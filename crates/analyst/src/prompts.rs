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

//! The two prompt templates sent to the model for every question.

use crate::evaluator::EvaluationOutcome;
use tabula::{describe_columns, head_text, Dataset};

pub const EXPRESSION_LABEL: &str = "Expression:";
pub const CODE_TRAILER: &str = "The code used was";

const INSTRUCTIONS: &str = "\
1. Convert the query into a single pandas expression over the DataFrame `df`.
2. The expression must be evaluable on its own: no assignments, no imports, no statements.
3. Only use `df`, `len`, `round`, column indexing, boolean masks combined with & | ~, \
and the DataFrame, Series, groupby and .str methods pandas provides for reading data.
4. The expression must answer the query.
5. PRINT ONLY THE EXPRESSION, with no commentary.
6. Do not wrap the expression in quotes or code fences.";

/// First call: ask for one expression answering `question`.
pub fn generation_prompt(dataset: &Dataset, question: &str, preview_rows: usize) -> String {
    format!(
        "You are working with a pandas DataFrame in Python named `df`.\n\
         {columns}\n\n\
         This is the result of `print(df.head())`:\n\
         {head}\n\n\
         Follow these instructions:\n\
         {INSTRUCTIONS}\n\
         Query: {question}\n\n\
         {EXPRESSION_LABEL}",
        columns = describe_columns(dataset),
        head = head_text(dataset, preview_rows),
        question = question.trim(),
    )
}

/// Second call: turn the evaluation result into a natural-language answer.
pub fn synthesis_prompt(question: &str, expression: &str, outcome: &EvaluationOutcome) -> String {
    let output = match outcome {
        EvaluationOutcome::Success { rendered } => format!("Pandas output: {rendered}\n\n"),
        EvaluationOutcome::Failure { kind, message } => format!(
            "Pandas output: the computation failed ({kind}): {message}\n\
             Do not invent a result. Say that the answer could not be computed and briefly explain why.\n\n"
        ),
    };
    format!(
        "Given an input question, act as a data analyst and write an answer from the query results.\n\
         Answer naturally, without lead-ins such as 'The answer is:' or anything similar.\n\
         Query: {question}\n\n\
         Pandas instructions (optional):\n{expression}\n\n\
         {output}\
         Answer:\n\
         At the end, show the code used to produce the answer, in the format: {CODE_TRAILER} {expression}",
        question = question.trim(),
        expression = expression.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula::CsvReader;

    #[test]
    fn generation_prompt_describes_the_frame() {
        let ds = CsvReader::new()
            .read_bytes(b"age,name\n31,ann\n7,bo\n", "people")
            .unwrap();
        let prompt = generation_prompt(&ds, "  how many rows are there? ", 5);
        assert!(prompt.contains("`age`:int64"));
        assert!(prompt.contains("`name`:object"));
        assert!(prompt.contains("0   31   ann"));
        assert!(prompt.contains("Query: how many rows are there?\n"));
        assert!(prompt.ends_with("Expression:"));
    }

    #[test]
    fn synthesis_prompt_reports_failures() {
        let failed = EvaluationOutcome::Failure {
            kind: "unknown_column".into(),
            message: "KeyError: 'salary'".into(),
        };
        let prompt = synthesis_prompt("total salary?", "df['salary'].sum()", &failed);
        assert!(prompt.contains("failed (unknown_column): KeyError: 'salary'"));
        assert!(prompt.contains("Do not invent a result"));
        assert!(prompt.ends_with("The code used was df['salary'].sum()"));
    }

    #[test]
    fn synthesis_prompt_carries_the_result() {
        let ok = EvaluationOutcome::Success {
            rendered: "2".into(),
        };
        let prompt = synthesis_prompt("rows?", "len(df)", &ok);
        assert!(prompt.contains("Pandas output: 2\n"));
        assert!(!prompt.contains("Do not invent"));
    }
}
