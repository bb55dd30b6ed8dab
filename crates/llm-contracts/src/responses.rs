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
use serde_json::Value;

/// One completed model call after any retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    /// Number of attempts it took to get this response.
    pub attempts: u32,
    pub raw_response: Value,
}

impl ProviderResponse {
    /// Content without the surrounding whitespace models like to emit.
    pub fn text(&self) -> &str {
        self.content.trim()
    }

    /// The model stopped on the token limit rather than finishing.
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Reads an OpenAI-style `usage` object; missing counters are zero and a
    /// missing total is the sum of the other two.
    pub fn from_json(usage: &Value) -> Self {
        let count = |key: &str| {
            usage
                .get(key)
                .and_then(Value::as_u64)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        };
        let prompt_tokens = count("prompt_tokens").unwrap_or(0);
        let completion_tokens = count("completion_tokens").unwrap_or(0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: count("total_tokens")
                .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_falls_back_to_sum() {
        let usage = Usage::from_json(&json!({ "prompt_tokens": 12, "completion_tokens": 3 }));
        assert_eq!(usage.total_tokens, 15);

        let usage = Usage::from_json(&json!({ "prompt_tokens": 1, "total_tokens": 9 }));
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, 9);
    }

    #[test]
    fn text_is_trimmed() {
        let response = ProviderResponse {
            content: "\n len(df) \n".into(),
            model: "m".into(),
            usage: Usage::default(),
            finish_reason: Some("length".into()),
            attempts: 1,
            raw_response: Value::Null,
        };
        assert_eq!(response.text(), "len(df)");
        assert!(response.truncated());
    }
}
