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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("No columns to parse from file")]
    NoColumns,
    #[error("Error tokenizing data. Line {line}: expected {expected} fields, saw {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Column length mismatch: expected {expected}, got {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Index out of bounds: {0}")]
    OutOfBounds(usize),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Size limit exceeded: {0}")]
    SizeLimit(String),
}

impl From<std::num::ParseIntError> for DataError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::Parse(error.to_string())
    }
}

impl From<std::num::ParseFloatError> for DataError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::Parse(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
