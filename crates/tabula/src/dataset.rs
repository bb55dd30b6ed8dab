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

use crate::column::Column;
use crate::error::{DataError, Result};
use crate::ops;
use crate::scalar::Scalar;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub name: String,
    pub row_count: usize,
    pub column_count: usize,
    pub loaded_at: DateTime<Utc>,
    pub source: Option<String>,
}

impl DatasetMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            row_count: 0,
            column_count: 0,
            loaded_at: Utc::now(),
            source: None,
        }
    }
}

/// Column-oriented table. Row labels default to positions and follow rows
/// through selections, so a filtered frame still reports where each row came from.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: HashMap<String, Arc<Column>>,
    column_order: Vec<String>,
    labels: Option<Arc<[String]>>,
    pub metadata: DatasetMetadata,
}

/// Header and first rows, as plain strings, for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Preview {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Dataset {
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            columns: HashMap::new(),
            column_order: Vec::new(),
            labels: None,
            metadata,
        }
    }

    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.column_order.is_empty() && column.len() != self.row_count() {
            return Err(DataError::LengthMismatch {
                expected: self.row_count(),
                found: column.len(),
            });
        }
        if self.column_order.is_empty() {
            self.metadata.row_count = column.len();
        }
        if !self.columns.contains_key(&name) {
            self.column_order.push(name.clone());
        }
        self.columns.insert(name, Arc::new(column));
        self.metadata.column_count = self.column_order.len();
        Ok(())
    }

    /// Replaces the row labels; `labels` must have one entry per row.
    pub fn with_labels(mut self, labels: Vec<String>) -> Result<Self> {
        if labels.len() != self.row_count() {
            return Err(DataError::LengthMismatch {
                expected: self.row_count(),
                found: labels.len(),
            });
        }
        self.labels = Some(labels.into());
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }

    pub fn column_count(&self) -> usize {
        self.column_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column_order.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name).map(|c| c.as_ref())
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.get_column(name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    }

    pub fn label(&self, row: usize) -> String {
        match &self.labels {
            Some(labels) => labels.get(row).cloned().unwrap_or_default(),
            None => row.to_string(),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        (0..self.row_count()).map(|row| self.label(row)).collect()
    }

    pub fn row(&self, index: usize) -> Vec<Scalar> {
        self.column_order
            .iter()
            .map(|name| self.columns[name].get(index))
            .collect()
    }

    pub fn select(&self, column_names: &[String]) -> Result<Dataset> {
        let mut selected = Dataset::new(self.derived_metadata("selection"));
        for name in column_names {
            let column = self.column(name)?;
            selected.add_column(name.clone(), column.clone())?;
        }
        selected.metadata.row_count = self.row_count();
        selected.labels = self.labels.clone();
        Ok(selected)
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Dataset> {
        let mut selected = Dataset::new(self.derived_metadata("rows"));
        let columns: Result<Vec<(String, Column)>> = self
            .column_order
            .par_iter()
            .map(|name| Ok((name.clone(), self.columns[name].select_rows(indices)?)))
            .collect();
        for (name, column) in columns? {
            selected.add_column(name, column)?;
        }
        selected.metadata.row_count = indices.len();
        selected.labels = Some(indices.iter().map(|&i| self.label(i)).collect());
        Ok(selected)
    }

    /// Keeps rows whose mask entry is `true`.
    pub fn filter_mask(&self, mask: &[bool]) -> Result<Dataset> {
        if mask.len() != self.row_count() {
            return Err(DataError::LengthMismatch {
                expected: self.row_count(),
                found: mask.len(),
            });
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.select_rows(&indices)
    }

    pub fn head(&self, n: usize) -> Result<Dataset> {
        let end = n.min(self.row_count());
        self.select_rows(&(0..end).collect::<Vec<_>>())
    }

    pub fn tail(&self, n: usize) -> Result<Dataset> {
        let start = self.row_count().saturating_sub(n);
        self.select_rows(&(start..self.row_count()).collect::<Vec<_>>())
    }

    /// Stable sort on one or more columns; nulls always go last.
    pub fn sort_by(&self, by: &[String], ascending: bool) -> Result<Dataset> {
        let keys: Vec<&Column> = by.iter().map(|name| self.column(name)).collect::<Result<_>>()?;
        let indices = ops::sort_indices(&keys, self.row_count(), ascending);
        self.select_rows(&indices)
    }

    /// Keeps the first occurrence of each row, comparing only `subset` when given.
    pub fn drop_duplicates(&self, subset: Option<&[String]>) -> Result<Dataset> {
        let keys: Vec<&Column> = match subset {
            Some(names) => names.iter().map(|name| self.column(name)).collect::<Result<_>>()?,
            None => self.column_order.iter().map(|name| self.columns[name].as_ref()).collect(),
        };
        let mut seen = HashSet::new();
        let indices: Vec<usize> = (0..self.row_count())
            .filter(|&row| {
                let key: Vec<String> = keys.iter().map(|column| column.get(row).repr()).collect();
                seen.insert(key)
            })
            .collect();
        self.select_rows(&indices)
    }

    pub fn preview(&self, n: usize) -> Preview {
        let rows = (0..n.min(self.row_count()))
            .map(|row| {
                self.row(row)
                    .into_iter()
                    .map(|cell| match cell {
                        Scalar::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        Preview {
            columns: self.column_order.clone(),
            rows,
        }
    }

    fn derived_metadata(&self, suffix: &str) -> DatasetMetadata {
        DatasetMetadata {
            name: format!("{}_{suffix}", self.metadata.name),
            row_count: self.row_count(),
            column_count: 0,
            loaded_at: self.metadata.loaded_at,
            source: self.metadata.source.clone(),
        }
    }
}
