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
use crate::dataset::Dataset;
use crate::describe::render_table;
use crate::error::Result;
use crate::scalar::Scalar;

/// Rows rendered before a series or frame is cut short.
pub const MAX_RENDER_ROWS: usize = 50;

/// A labelled column, detached from its frame.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: Option<String>,
    pub index_name: Option<String>,
    pub labels: Vec<String>,
    pub values: Column,
}

impl Series {
    pub fn new(name: Option<String>, labels: Vec<String>, values: Column) -> Self {
        Self {
            name,
            index_name: None,
            labels,
            values,
        }
    }

    pub fn from_frame(frame: &Dataset, column: &str) -> Result<Self> {
        Ok(Self::new(
            Some(column.to_string()),
            frame.labels(),
            frame.column(column)?.clone(),
        ))
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Scalar {
        self.values.get(row)
    }

    pub fn dtype_name(&self) -> &'static str {
        self.values.data_type().dtype_name()
    }

    /// Same labels and name, new values.
    pub fn map_values(&self, values: Column) -> Self {
        Self {
            name: self.name.clone(),
            index_name: self.index_name.clone(),
            labels: self.labels.clone(),
            values,
        }
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let values = self.values.select_rows(indices)?;
        Ok(Self {
            name: self.name.clone(),
            index_name: self.index_name.clone(),
            labels: indices
                .iter()
                .map(|&i| self.labels.get(i).cloned().unwrap_or_default())
                .collect(),
            values,
        })
    }

    pub fn position_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn render(&self, max_rows: usize) -> String {
        let footer = match &self.name {
            Some(name) => format!("Name: {name}, dtype: {}", self.dtype_name()),
            None => format!("dtype: {}", self.dtype_name()),
        };
        if self.is_empty() {
            return format!("Series([], {footer})");
        }
        let shown = max_rows.min(self.len());
        let cells: Vec<String> = (0..shown).map(|row| self.get(row).to_string()).collect();
        let label_width = self.labels[..shown]
            .iter()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        let value_width = cells.iter().map(|c| c.chars().count()).max().unwrap_or(0);

        let mut lines = Vec::with_capacity(shown + 3);
        if let Some(index_name) = &self.index_name {
            lines.push(index_name.clone());
        }
        for (label, cell) in self.labels.iter().zip(&cells) {
            lines.push(format!("{label:<label_width$}    {cell:>value_width$}"));
        }
        if self.len() > shown {
            lines.push(format!("... ({} more rows)", self.len() - shown));
        }
        lines.push(footer);
        lines.join("\n")
    }
}

/// Which columns a group-by aggregates.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct GroupBy {
    pub frame: Dataset,
    pub key: String,
    pub selection: Selection,
}

/// Anything an expression can evaluate to.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Tuple(Vec<Scalar>),
    Series(Series),
    Frame(Dataset),
    GroupBy(GroupBy),
    StrAccessor(Series),
    Indexer { target: Box<Value>, positional: bool },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(scalar) => scalar.type_name(),
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Series(_) => "Series",
            Value::Frame(_) => "DataFrame",
            Value::GroupBy(GroupBy {
                selection: Selection::One(_),
                ..
            }) => "SeriesGroupBy",
            Value::GroupBy(_) => "DataFrameGroupBy",
            Value::StrAccessor(_) => "StringMethods",
            Value::Indexer {
                positional: true, ..
            } => "_iLocIndexer",
            Value::Indexer { .. } => "_LocIndexer",
        }
    }

    /// Text shown to the user and handed to the answer prompt.
    pub fn render(&self) -> String {
        match self {
            Value::Scalar(scalar) => scalar.to_string(),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Series(series) => series.render(MAX_RENDER_ROWS),
            Value::Frame(frame) => render_table(frame, MAX_RENDER_ROWS),
            Value::GroupBy(group) => format!(
                "<{} grouped by '{}' with {} rows>",
                self.type_name(),
                group.key,
                group.frame.row_count()
            ),
            Value::StrAccessor(_) | Value::Indexer { .. } => format!("<{}>", self.type_name()),
        }
    }
}

/// Comma-joined reprs, cut after `MAX_RENDER_ROWS` items.
fn join_repr(items: &[Scalar]) -> String {
    let mut parts = items
        .iter()
        .take(MAX_RENDER_ROWS)
        .map(Scalar::repr)
        .collect::<Vec<_>>();
    if items.len() > MAX_RENDER_ROWS {
        parts.push(format!("... ({} more)", items.len() - MAX_RENDER_ROWS));
    }
    parts.join(", ")
}
