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

//! In-memory typed datasets loaded from CSV, plus a small pandas-flavoured
//! expression language evaluated against them.

pub mod column;
pub mod dataset;
pub mod describe;
pub mod error;
pub mod expr;
pub mod io;
pub mod ops;
pub mod scalar;

pub use column::{Column, ColumnBuilder, DataType};
pub use dataset::{Dataset, DatasetMetadata, Preview};
pub use describe::{describe_columns, head_text, render_table};
pub use error::{DataError, Result};
pub use expr::{evaluate, normalize_expression, EvalError, Value};
pub use io::CsvReader;
pub use ops::AggregateFunction;
pub use scalar::Scalar;

/// Rows shown when a dataset is previewed or described for a prompt.
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

pub fn load_csv<P: AsRef<std::path::Path>>(path: P) -> Result<Dataset> {
    CsvReader::new().read_path(path.as_ref())
}
