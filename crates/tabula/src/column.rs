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

use crate::error::{DataError, Result};
use crate::scalar::Scalar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) const MAX_STRING_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Int64,
    Float64,
    String,
    Boolean,
}

impl DataType {
    /// Name shown to users and to the model, in pandas vocabulary.
    pub fn dtype_name(&self) -> &'static str {
        match self {
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::String => "object",
            DataType::Boolean => "bool",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, DataType::String)
    }
}

#[derive(Debug, Clone)]
pub enum Column {
    Int64(Arc<[Option<i64>]>),
    Float64(Arc<[Option<f64>]>),
    String(Arc<[Option<Arc<str>>]>),
    Boolean(Arc<[Option<bool>]>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int64(data) => data.len(),
            Column::Float64(data) => data.len(),
            Column::String(data) => data.len(),
            Column::Boolean(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Int64(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Float64(data) => data
                .par_iter()
                .filter(|v| v.map_or(true, |f| f.is_nan()))
                .count(),
            Column::String(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Boolean(data) => data.par_iter().filter(|v| v.is_none()).count(),
        }
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.get(index).is_null()
    }

    /// Cell at `index`; out-of-range and missing cells are both `Null`.
    pub fn get(&self, index: usize) -> Scalar {
        match self {
            Column::Int64(data) => data
                .get(index)
                .copied()
                .flatten()
                .map_or(Scalar::Null, Scalar::Int),
            Column::Float64(data) => match data.get(index).copied().flatten() {
                Some(v) if !v.is_nan() => Scalar::Float(v),
                _ => Scalar::Null,
            },
            Column::String(data) => data
                .get(index)
                .cloned()
                .flatten()
                .map_or(Scalar::Null, |s| Scalar::Str(s.to_string())),
            Column::Boolean(data) => data
                .get(index)
                .copied()
                .flatten()
                .map_or(Scalar::Null, Scalar::Bool),
        }
    }

    pub fn get_string(&self, index: usize) -> Option<String> {
        match self.get(index) {
            Scalar::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn to_f64(&self, index: usize) -> Option<f64> {
        match self {
            Column::String(_) => None,
            _ => self.get(index).as_f64(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn from_strings(values: &[Option<String>], data_type: DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Int64 => {
                let parsed: Result<Vec<Option<i64>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => s.trim().parse::<i64>().map(Some).map_err(|e| e.into()),
                    })
                    .collect();
                Column::Int64(parsed?.into())
            }
            DataType::Float64 => {
                let parsed: Result<Vec<Option<f64>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => s.trim().parse::<f64>().map(Some).map_err(|e| e.into()),
                    })
                    .collect();
                Column::Float64(parsed?.into())
            }
            DataType::Boolean => {
                let parsed: Result<Vec<Option<bool>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => parse_bool(s).map(Some).ok_or_else(|| {
                            DataError::Parse(format!("Cannot parse '{s}' as boolean"))
                        }),
                    })
                    .collect();
                Column::Boolean(parsed?.into())
            }
            DataType::String => {
                let strings: Vec<Option<Arc<str>>> = values
                    .iter()
                    .map(|opt| {
                        opt.as_ref().map(|s| {
                            if s.len() > MAX_STRING_LENGTH {
                                Arc::from(truncate_on_char_boundary(s, MAX_STRING_LENGTH))
                            } else {
                                Arc::from(s.as_str())
                            }
                        })
                    })
                    .collect();
                Column::String(strings.into())
            }
        })
    }

    /// Builds a column from computed values, picking the narrowest type that holds them all.
    pub fn from_scalars(values: Vec<Scalar>) -> Self {
        let non_null = || values.iter().filter(|v| !v.is_null());
        if non_null().all(|v| matches!(v, Scalar::Bool(_))) && non_null().next().is_some() {
            Column::Boolean(values.iter().map(Scalar::as_bool).collect::<Vec<_>>().into())
        } else if non_null().all(|v| matches!(v, Scalar::Int(_))) && non_null().next().is_some() {
            Column::Int64(values.iter().map(Scalar::as_i64).collect::<Vec<_>>().into())
        } else if non_null().all(|v| matches!(v, Scalar::Int(_) | Scalar::Float(_)))
            && non_null().next().is_some()
        {
            Column::Float64(values.iter().map(Scalar::as_f64).collect::<Vec<_>>().into())
        } else {
            Column::String(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Null => None,
                        other => Some(Arc::from(other.key_string().as_str())),
                    })
                    .collect::<Vec<_>>()
                    .into(),
            )
        }
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Column> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::OutOfBounds(bad));
        }
        Ok(match self {
            Column::Int64(data) => {
                Column::Int64(indices.iter().map(|&i| data[i]).collect::<Vec<_>>().into())
            }
            Column::Float64(data) => {
                Column::Float64(indices.iter().map(|&i| data[i]).collect::<Vec<_>>().into())
            }
            Column::String(data) => Column::String(
                indices
                    .iter()
                    .map(|&i| data[i].clone())
                    .collect::<Vec<_>>()
                    .into(),
            ),
            Column::Boolean(data) => {
                Column::Boolean(indices.iter().map(|&i| data[i]).collect::<Vec<_>>().into())
            }
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Accumulates raw CSV cells for one column and infers its type on `build`.
#[derive(Debug)]
pub struct ColumnBuilder {
    values: Vec<Option<String>>,
    max_field_bytes: usize,
}

impl ColumnBuilder {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            max_field_bytes: MAX_STRING_LENGTH,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            max_field_bytes: MAX_STRING_LENGTH,
        }
    }

    pub fn with_max_field_bytes(mut self, max_field_bytes: usize) -> Self {
        self.max_field_bytes = max_field_bytes;
        self
    }

    pub fn push(&mut self, value: Option<String>) -> Result<()> {
        if let Some(ref s) = value {
            if s.len() > self.max_field_bytes {
                return Err(DataError::SizeLimit(format!(
                    "Field length {} exceeds limit {}",
                    s.len(),
                    self.max_field_bytes
                )));
            }
        }
        self.values.push(value.filter(|s| !s.trim().is_empty()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn build(self) -> Result<Column> {
        let data_type = Self::infer_type(&self.values);
        Column::from_strings(&self.values, data_type)
    }

    /// Every non-null value must fit the type; an all-null column stays textual.
    pub fn infer_type(values: &[Option<String>]) -> DataType {
        let mut present = values.iter().flatten().map(|s| s.trim()).peekable();
        if present.peek().is_none() {
            return DataType::String;
        }
        let mut all_int = true;
        let mut all_float = true;
        let mut all_bool = true;
        for value in present {
            if all_int && value.parse::<i64>().is_err() {
                all_int = false;
            }
            if all_float && value.parse::<f64>().is_err() {
                all_float = false;
            }
            if all_bool && parse_bool(value).is_none() {
                all_bool = false;
            }
            if !all_int && !all_float && !all_bool {
                break;
            }
        }
        if all_int {
            DataType::Int64
        } else if all_float {
            DataType::Float64
        } else if all_bool {
            DataType::Boolean
        } else {
            DataType::String
        }
    }
}

impl Default for ColumnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    #[test]
    fn inference_scans_the_whole_column() {
        assert_eq!(ColumnBuilder::infer_type(&cells(&["1", "2", ""])), DataType::Int64);
        assert_eq!(ColumnBuilder::infer_type(&cells(&["1", "2.5"])), DataType::Float64);
        assert_eq!(ColumnBuilder::infer_type(&cells(&["1", "abc"])), DataType::String);
        assert_eq!(ColumnBuilder::infer_type(&cells(&["True", "false"])), DataType::Boolean);
        assert_eq!(ColumnBuilder::infer_type(&cells(&["", ""])), DataType::String);
    }

    #[test]
    fn builder_treats_blank_cells_as_null() {
        let mut builder = ColumnBuilder::new();
        builder.push(Some("4".into())).unwrap();
        builder.push(Some("  ".into())).unwrap();
        builder.push(None).unwrap();
        let column = builder.build().unwrap();
        assert_eq!(column.data_type(), DataType::Int64);
        assert_eq!(column.null_count(), 2);
        assert_eq!(column.get(0), Scalar::Int(4));
    }

    #[test]
    fn builder_enforces_field_limit() {
        let mut builder = ColumnBuilder::new().with_max_field_bytes(3);
        assert!(builder.push(Some("abcd".into())).is_err());
    }

    #[test]
    fn from_scalars_picks_narrowest_type() {
        let ints = Column::from_scalars(vec![Scalar::Int(1), Scalar::Null]);
        assert_eq!(ints.data_type(), DataType::Int64);
        let floats = Column::from_scalars(vec![Scalar::Int(1), Scalar::Float(0.5)]);
        assert_eq!(floats.data_type(), DataType::Float64);
        let mixed = Column::from_scalars(vec![Scalar::Int(1), Scalar::Str("x".into())]);
        assert_eq!(mixed.data_type(), DataType::String);
        assert_eq!(mixed.get(0), Scalar::Str("1".into()));
    }

    #[test]
    fn select_rows_checks_bounds() {
        let column = Column::from_scalars(vec![Scalar::Int(1), Scalar::Int(2)]);
        assert!(matches!(column.select_rows(&[5]), Err(DataError::OutOfBounds(5))));
        let picked = column.select_rows(&[1, 0]).unwrap();
        assert_eq!(picked.get(0), Scalar::Int(2));
    }
}
