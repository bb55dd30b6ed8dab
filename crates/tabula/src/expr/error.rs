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

use crate::error::DataError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("invalid syntax: {0}")]
    Syntax(String),
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("{0}")]
    UnknownColumn(String),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("the model returned no expression")]
    EmptyExpression,
}

impl EvalError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::Syntax(_) => "syntax",
            EvalError::UnknownName(_) => "unknown_name",
            EvalError::UnknownColumn(_) => "unknown_column",
            EvalError::TypeMismatch(_) => "type_mismatch",
            EvalError::Unsupported(_) => "unsupported",
            EvalError::EmptyExpression => "empty_expression",
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        EvalError::Syntax(message.into())
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        EvalError::TypeMismatch(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        EvalError::Unsupported(message.into())
    }

    pub(crate) fn missing_key(key: impl std::fmt::Display) -> Self {
        EvalError::UnknownColumn(format!("KeyError: '{key}'"))
    }
}

impl From<DataError> for EvalError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::ColumnNotFound(name) => EvalError::missing_key(name),
            DataError::TypeMismatch(message) => EvalError::TypeMismatch(message),
            DataError::LengthMismatch { expected, found } => EvalError::TypeMismatch(format!(
                "length mismatch: expected {expected} values, got {found}"
            )),
            DataError::OutOfBounds(index) => {
                EvalError::TypeMismatch(format!("index {index} is out of bounds"))
            }
            other => EvalError::TypeMismatch(other.to_string()),
        }
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
