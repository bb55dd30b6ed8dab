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

use super::error::{EvalError, EvalResult};

const LABEL: &str = "expression:";

/// Reduces raw model output to the single line that gets parsed.
///
/// Code fences, blank lines and comment lines are dropped and the last
/// remaining line wins. A leading `Expression:` label, wrapping backticks and
/// a trailing semicolon are stripped.
pub fn normalize_expression(raw: &str) -> EvalResult<String> {
    let line = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```") && !line.starts_with('#'))
        .last()
        .ok_or(EvalError::EmptyExpression)?;

    let mut text = line;
    if text
        .get(..LABEL.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(LABEL))
    {
        text = text[LABEL.len()..].trim();
    }
    while text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        text = text[1..text.len() - 1].trim();
    }
    let text = text.trim_end_matches(';').trim();

    if text.is_empty() {
        return Err(EvalError::EmptyExpression);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_keeps_last_line() {
        let raw = "```python\n# count rows\nx = 1\nlen(df)\n```";
        assert_eq!(normalize_expression(raw).unwrap(), "len(df)");
    }

    #[test]
    fn label_and_backticks_are_stripped() {
        assert_eq!(
            normalize_expression("Expression: `df['age'].mean()`").unwrap(),
            "df['age'].mean()"
        );
        assert_eq!(normalize_expression("  df.shape[0];  ").unwrap(), "df.shape[0]");
    }

    #[test]
    fn blank_output_is_empty_expression() {
        assert_eq!(normalize_expression(" \n```\n```"), Err(EvalError::EmptyExpression));
        assert_eq!(normalize_expression("Expression:"), Err(EvalError::EmptyExpression));
    }
}
