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

use llm_contracts::LLMError;
use tabula::DataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("model request failed: {0}")]
    Model(#[from] LLMError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report generation failed: {0}")]
    Report(String),
}

impl AnalystError {
    /// True when the failure came from the hosted model rather than local work.
    pub fn is_upstream(&self) -> bool {
        matches!(self, AnalystError::Model(_))
    }
}

pub type AnalystResult<T> = Result<T, AnalystError>;
