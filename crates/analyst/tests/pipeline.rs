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

use analyst::{ApiClient, EvaluationOutcome, Pipeline, Session};
use async_trait::async_trait;
use llm_contracts::{LLMError, LLMResult, ProviderConfig, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tabula::CsvReader;

/// Replays canned replies and records every prompt it was sent.
#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        self.prompts.lock().unwrap().push(request.prompt().to_string());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LLMError::Provider("script exhausted".into()))?;
        Ok(ProviderResponse {
            content,
            model: request.model,
            usage: Usage::default(),
            finish_reason: Some("stop".into()),
            attempts: 1,
            raw_response: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn people() -> tabula::Dataset {
    CsvReader::new()
        .read_bytes(b"age,name\n31,ann\n7,bo\n45,cy\n", "people")
        .unwrap()
}

#[tokio::test]
async fn evaluated_result_feeds_the_answer() {
    let client = ScriptedClient::new(&["len(df)", "There are 3 rows. The code used was len(df)"]);
    let pipeline = Pipeline::new(client.clone(), &ProviderConfig::default());
    let dataset = people();

    let answer = pipeline
        .answer("how many rows are there?", Some(&dataset))
        .await
        .unwrap();

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("`age`:int64"));
    assert!(prompts[0].contains("`name`:object"));
    assert!(prompts[0].contains("Query: how many rows are there?"));
    assert!(prompts[1].contains("Pandas output: 3\n"));
    assert!(prompts[1].ends_with("The code used was len(df)"));

    assert_eq!(answer.text, "There are 3 rows. The code used was len(df)");
    assert_eq!(answer.expression.as_deref(), Some("len(df)"));
    assert_eq!(
        answer.outcome,
        Some(EvaluationOutcome::Success {
            rendered: "3".into()
        })
    );
}

#[tokio::test]
async fn failed_evaluation_is_explained_not_invented() {
    let client = ScriptedClient::new(&[
        "```python\ndf['salary'].mean()\n```",
        "I could not compute this: there is no salary column.",
    ]);
    let pipeline = Pipeline::new(client.clone(), &ProviderConfig::default());
    let dataset = people();

    let answer = pipeline.answer("average salary?", Some(&dataset)).await.unwrap();

    let prompts = client.prompts();
    assert!(prompts[1].contains("the computation failed (unknown_column)"));
    assert!(matches!(
        answer.outcome,
        Some(EvaluationOutcome::Failure { ref kind, .. }) if kind == "unknown_column"
    ));
}

#[tokio::test]
async fn no_dataset_or_blank_question_skips_the_model() {
    let client = ScriptedClient::new(&[]);
    let pipeline = Pipeline::new(client.clone(), &ProviderConfig::default());
    let session = Session::new();

    let answer = pipeline.answer("how many rows?", session.dataset()).await.unwrap();
    assert!(answer.is_empty());

    let dataset = people();
    let answer = pipeline.answer("   ", Some(&dataset)).await.unwrap();
    assert!(answer.is_empty());
    assert!(client.prompts().is_empty());
}

#[tokio::test]
async fn model_failure_fails_the_question() {
    let client = ScriptedClient::new(&[]);
    let pipeline = Pipeline::new(client, &ProviderConfig::default());
    let dataset = people();

    let err = pipeline.answer("rows?", Some(&dataset)).await.unwrap_err();
    assert!(err.is_upstream());
}
