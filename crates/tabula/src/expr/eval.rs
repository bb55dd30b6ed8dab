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

//! Tree-walking interpreter. The only name in scope is `df`, plus a short
//! list of builtins; there is no way to reach anything else.

use super::error::{EvalError, EvalResult};
use super::methods::{self, Args};
use super::parser::{BinaryOp, BoolOp, CompareOp, Expr, Literal, UnaryOp, MAX_EXPRESSION_BYTES};
use super::value::{GroupBy, Selection, Series, Value};
use crate::column::{Column, DataType};
use crate::dataset::Dataset;
use crate::scalar::Scalar;
use std::cell::Cell;
use std::cmp::Ordering;

/// Longest string one operation may build, unless its input is already longer.
pub const MAX_TEXT_BYTES: usize = MAX_EXPRESSION_BYTES * 16;
/// Total text a single element-wise operation may produce across a series.
pub const MAX_DERIVED_TEXT_BYTES: usize = 64 * 1024 * 1024;

pub const FRAME_NAME: &str = "df";

const FRAME_METHODS: &[&str] = &[
    "head", "tail", "sort_values", "nlargest", "nsmallest", "groupby", "describe", "count",
    "mean", "sum", "min", "max", "median", "std", "var", "nunique", "drop_duplicates", "isnull",
    "isna", "notnull", "notna", "dropna", "fillna", "reset_index", "copy",
];

pub struct Interpreter<'a> {
    dataset: &'a Dataset,
}

impl<'a> Interpreter<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }

    pub fn eval(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(Value::Scalar(literal_scalar(literal))),
            Expr::List(items) => Ok(Value::List(self.scalars(items, "list")?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.scalars(items, "tuple")?)),
            Expr::Name(name) if name == FRAME_NAME => Ok(Value::Frame(self.dataset.clone())),
            Expr::Name(name) if methods::is_builtin(name) => Err(EvalError::unsupported(format!(
                "builtin '{name}' must be called"
            ))),
            Expr::Name(name) => Err(EvalError::UnknownName(name.clone())),
            Expr::Attribute { target, name } => attribute(self.eval(target)?, name),
            Expr::Index { target, index } => self.index(self.eval(target)?, index),
            Expr::Slice { .. } => Err(EvalError::syntax("a slice is only valid inside [ ]")),
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let args = self.arguments(args, kwargs)?;
                match callee.as_ref() {
                    Expr::Name(name) => methods::call_builtin(name, args),
                    Expr::Attribute { target, name } => {
                        methods::call_method(self.eval(target)?, name, args)
                    }
                    other => {
                        let value = self.eval(other)?;
                        Err(EvalError::mismatch(format!(
                            "'{}' object is not callable",
                            value.type_name()
                        )))
                    }
                }
            }
            Expr::Unary { op, operand } => unary(*op, self.eval(operand)?),
            Expr::Binary { op, left, right } => binary(*op, &self.eval(left)?, &self.eval(right)?),
            Expr::Compare { first, rest } => self.compare_chain(first, rest),
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let keep_left = match op {
                    BoolOp::And => !truthy(&left)?,
                    BoolOp::Or => truthy(&left)?,
                };
                if keep_left {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
        }
    }

    fn scalars(&self, items: &[Expr], container: &str) -> EvalResult<Vec<Scalar>> {
        items
            .iter()
            .map(|item| match self.eval(item)? {
                Value::Scalar(scalar) => Ok(scalar),
                other => Err(EvalError::unsupported(format!(
                    "a {container} may only hold plain values, not {}",
                    other.type_name()
                ))),
            })
            .collect()
    }

    fn arguments(&self, args: &[Expr], kwargs: &[(String, Expr)]) -> EvalResult<Args> {
        let positional = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<EvalResult<Vec<_>>>()?;
        let keywords = kwargs
            .iter()
            .map(|(name, arg)| Ok((name.clone(), self.eval(arg)?)))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(Args::new(positional, keywords))
    }

    fn compare_chain(&self, first: &Expr, rest: &[(CompareOp, Expr)]) -> EvalResult<Value> {
        let mut left = self.eval(first)?;
        if let [(op, right)] = rest {
            return compare(*op, &left, &self.eval(right)?);
        }
        for (op, right) in rest {
            let right = self.eval(right)?;
            let result = compare(*op, &left, &right)?;
            if !truthy(&result)? {
                return Ok(Value::Scalar(Scalar::Bool(false)));
            }
            left = right;
        }
        Ok(Value::Scalar(Scalar::Bool(true)))
    }

    fn index(&self, target: Value, index: &Expr) -> EvalResult<Value> {
        if let Value::Indexer { target, positional } = target {
            return self.locate(*target, positional, index);
        }
        if let Expr::Slice { start, stop } = index {
            let start = self.optional_int(start.as_deref())?;
            let stop = self.optional_int(stop.as_deref())?;
            return slice_value(target, start, stop);
        }
        if let (Value::GroupBy(group), Expr::Tuple(items)) = (&target, index) {
            let names = self.scalars(items, "tuple")?;
            return select_group(group.clone(), Value::List(names));
        }
        let key = self.eval(index)?;
        match (target, key) {
            (Value::Frame(frame), Value::Scalar(Scalar::Str(name))) => {
                Ok(Value::Series(Series::from_frame(&frame, &name)?))
            }
            (Value::Frame(_), Value::Scalar(other)) => Err(EvalError::missing_key(other)),
            (Value::Frame(frame), Value::List(names)) => {
                let names = string_list(&names)?;
                Ok(Value::Frame(frame.select(&names)?))
            }
            (Value::Frame(frame), Value::Series(mask)) => {
                Ok(Value::Frame(frame.filter_mask(&boolean_mask(&mask)?)?))
            }
            (Value::Series(series), Value::Series(mask)) => {
                let mask = boolean_mask(&mask)?;
                if mask.len() != series.len() {
                    return Err(EvalError::mismatch(format!(
                        "boolean index has {} entries but the series has {}",
                        mask.len(),
                        series.len()
                    )));
                }
                let rows: Vec<usize> = mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, keep)| keep.then_some(i))
                    .collect();
                Ok(Value::Series(series.select_rows(&rows)?))
            }
            (Value::Series(series), Value::Scalar(key)) => {
                let row = series
                    .position_of(&key.key_string())
                    .ok_or_else(|| EvalError::missing_key(&key))?;
                Ok(Value::Scalar(series.get(row)))
            }
            (Value::Series(series), Value::List(keys)) => {
                let rows = keys
                    .iter()
                    .map(|key| {
                        series
                            .position_of(&key.key_string())
                            .ok_or_else(|| EvalError::missing_key(key))
                    })
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::Series(series.select_rows(&rows)?))
            }
            (Value::List(items) | Value::Tuple(items), Value::Scalar(position)) => {
                let at = sequence_position(&position, items.len())?;
                Ok(Value::Scalar(items[at].clone()))
            }
            (Value::Scalar(Scalar::Str(text)), Value::Scalar(position)) => {
                let chars: Vec<char> = text.chars().collect();
                let at = sequence_position(&position, chars.len())?;
                Ok(Value::Scalar(Scalar::Str(chars[at].to_string())))
            }
            (Value::GroupBy(group), key) => select_group(group, key),
            (target, key) => Err(EvalError::mismatch(format!(
                "'{}' object cannot be indexed by {}",
                target.type_name(),
                key.type_name()
            ))),
        }
    }

    fn optional_int(&self, expr: Option<&Expr>) -> EvalResult<Option<i64>> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::Scalar(Scalar::Int(v)) => Ok(Some(v)),
                Value::Scalar(Scalar::Null) => Ok(None),
                other => Err(EvalError::mismatch(format!(
                    "slice bounds must be integers, not {}",
                    other.type_name()
                ))),
            },
        }
    }

    /// `.loc[...]` and `.iloc[...]`.
    fn locate(&self, target: Value, positional: bool, index: &Expr) -> EvalResult<Value> {
        let (row_expr, column_expr) = match index {
            Expr::Tuple(items) if items.len() == 2 => (&items[0], Some(&items[1])),
            Expr::Tuple(_) => {
                return Err(EvalError::unsupported("too many indexers"));
            }
            other => (other, None),
        };
        let labels = match &target {
            Value::Frame(frame) => frame.labels(),
            Value::Series(series) => series.labels.clone(),
            other => {
                return Err(EvalError::mismatch(format!(
                    "'{}' object has no row indexer",
                    other.type_name()
                )))
            }
        };
        let rows = self.row_selector(&labels, positional, row_expr)?;

        match target {
            Value::Series(series) => {
                if column_expr.is_some() {
                    return Err(EvalError::unsupported("too many indexers for a Series"));
                }
                match rows {
                    Rows::One(row) => Ok(Value::Scalar(series.get(row))),
                    Rows::Many(rows) => Ok(Value::Series(series.select_rows(&rows)?)),
                }
            }
            Value::Frame(frame) => {
                let columns = match column_expr {
                    None => Columns::All,
                    Some(expr) => self.column_selector(&frame, positional, expr)?,
                };
                match (rows, columns) {
                    (Rows::One(row), Columns::One(name)) => {
                        Ok(Value::Scalar(frame.column(&name)?.get(row)))
                    }
                    (Rows::Many(rows), Columns::One(name)) => {
                        let series = Series::from_frame(&frame, &name)?;
                        Ok(Value::Series(series.select_rows(&rows)?))
                    }
                    (Rows::One(row), Columns::All) => Ok(Value::Series(row_series(&frame, row, None)?)),
                    (Rows::One(row), Columns::Many(names)) => {
                        Ok(Value::Series(row_series(&frame, row, Some(&names))?))
                    }
                    (Rows::Many(rows), Columns::All) => Ok(Value::Frame(frame.select_rows(&rows)?)),
                    (Rows::Many(rows), Columns::Many(names)) => {
                        Ok(Value::Frame(frame.select(&names)?.select_rows(&rows)?))
                    }
                }
            }
            _ => Err(EvalError::unsupported("unsupported indexer target")),
        }
    }

    fn row_selector(&self, labels: &[String], positional: bool, expr: &Expr) -> EvalResult<Rows> {
        if let Expr::Slice { start, stop } = expr {
            if positional {
                let start = self.optional_int(start.as_deref())?;
                let stop = self.optional_int(stop.as_deref())?;
                let (from, to) = slice_bounds(start, stop, labels.len());
                return Ok(Rows::Many((from..to).collect()));
            }
            // Label slices include both ends.
            let find = |bound: &Option<Box<Expr>>| -> EvalResult<Option<usize>> {
                match bound {
                    None => Ok(None),
                    Some(expr) => {
                        let key = scalar_of(self.eval(expr)?)?;
                        label_position(labels, &key).map(Some)
                    }
                }
            };
            let from = find(start)?.unwrap_or(0);
            let to = find(stop)?.map_or(labels.len(), |p| p + 1);
            return Ok(Rows::Many((from..to.max(from)).collect()));
        }
        match self.eval(expr)? {
            Value::Scalar(key) if positional => {
                Ok(Rows::One(sequence_position(&key, labels.len())?))
            }
            Value::Scalar(key) => Ok(Rows::One(label_position(labels, &key)?)),
            Value::Series(mask) => {
                let mask = boolean_mask(&mask)?;
                if mask.len() != labels.len() {
                    return Err(EvalError::mismatch("boolean index length does not match"));
                }
                Ok(Rows::Many(
                    mask.iter()
                        .enumerate()
                        .filter_map(|(i, keep)| keep.then_some(i))
                        .collect(),
                ))
            }
            Value::List(keys) => Ok(Rows::Many(
                keys.iter()
                    .map(|key| {
                        if positional {
                            sequence_position(key, labels.len())
                        } else {
                            label_position(labels, key)
                        }
                    })
                    .collect::<EvalResult<_>>()?,
            )),
            other => Err(EvalError::mismatch(format!(
                "cannot select rows with {}",
                other.type_name()
            ))),
        }
    }

    fn column_selector(&self, frame: &Dataset, positional: bool, expr: &Expr) -> EvalResult<Columns> {
        let names = frame.column_names();
        if let Expr::Slice { start, stop } = expr {
            if start.is_none() && stop.is_none() {
                return Ok(Columns::All);
            }
            if !positional {
                return Err(EvalError::unsupported("column label slices are not supported"));
            }
            let (from, to) = slice_bounds(
                self.optional_int(start.as_deref())?,
                self.optional_int(stop.as_deref())?,
                names.len(),
            );
            return Ok(Columns::Many(names[from..to].to_vec()));
        }
        let by_position = |key: &Scalar| -> EvalResult<String> {
            Ok(names[sequence_position(key, names.len())?].clone())
        };
        match self.eval(expr)? {
            Value::Scalar(key) if positional => Ok(Columns::One(by_position(&key)?)),
            Value::Scalar(Scalar::Str(name)) => Ok(Columns::One(name)),
            Value::List(keys) if positional => Ok(Columns::Many(
                keys.iter().map(by_position).collect::<EvalResult<_>>()?,
            )),
            Value::List(keys) => Ok(Columns::Many(string_list(&keys)?)),
            other => Err(EvalError::mismatch(format!(
                "cannot select columns with {}",
                other.type_name()
            ))),
        }
    }
}

enum Rows {
    One(usize),
    Many(Vec<usize>),
}

enum Columns {
    All,
    One(String),
    Many(Vec<String>),
}

pub(super) fn literal_scalar(literal: &Literal) -> Scalar {
    match literal {
        Literal::Int(v) => Scalar::Int(*v),
        Literal::Float(v) => Scalar::Float(*v),
        Literal::Str(s) => Scalar::Str(s.clone()),
        Literal::Bool(b) => Scalar::Bool(*b),
        Literal::None => Scalar::Null,
    }
}

pub(super) fn scalar_of(value: Value) -> EvalResult<Scalar> {
    match value {
        Value::Scalar(scalar) => Ok(scalar),
        other => Err(EvalError::mismatch(format!(
            "expected a single value, got {}",
            other.type_name()
        ))),
    }
}

pub(super) fn string_list(items: &[Scalar]) -> EvalResult<Vec<String>> {
    items
        .iter()
        .map(|item| match item {
            Scalar::Str(s) => Ok(s.clone()),
            other => Err(EvalError::missing_key(other)),
        })
        .collect()
}

/// Label text back to a value: integers stay integers.
pub(super) fn label_scalar(label: &str) -> Scalar {
    label
        .parse::<i64>()
        .map(Scalar::Int)
        .unwrap_or_else(|_| Scalar::Str(label.to_string()))
}

fn label_position(labels: &[String], key: &Scalar) -> EvalResult<usize> {
    let wanted = key.key_string();
    labels
        .iter()
        .position(|label| *label == wanted)
        .ok_or_else(|| EvalError::missing_key(key))
}

/// Python-style position with negative indices counted from the end.
pub(super) fn sequence_position(key: &Scalar, len: usize) -> EvalResult<usize> {
    let index = match key {
        Scalar::Int(v) => *v,
        other => {
            return Err(EvalError::mismatch(format!(
                "indices must be integers, not {}",
                other.type_name()
            )))
        }
    };
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvalError::mismatch(format!("index {index} is out of range")));
    }
    Ok(resolved as usize)
}

pub(super) fn slice_bounds(start: Option<i64>, stop: Option<i64>, len: usize) -> (usize, usize) {
    let clamp = |bound: i64| -> usize {
        let resolved = if bound < 0 { len as i64 + bound } else { bound };
        resolved.clamp(0, len as i64) as usize
    };
    let from = start.map_or(0, clamp);
    let to = stop.map_or(len, clamp);
    (from, to.max(from))
}

fn slice_value(target: Value, start: Option<i64>, stop: Option<i64>) -> EvalResult<Value> {
    match target {
        Value::Frame(frame) => {
            let (from, to) = slice_bounds(start, stop, frame.row_count());
            Ok(Value::Frame(frame.select_rows(&(from..to).collect::<Vec<_>>())?))
        }
        Value::Series(series) => {
            let (from, to) = slice_bounds(start, stop, series.len());
            Ok(Value::Series(series.select_rows(&(from..to).collect::<Vec<_>>())?))
        }
        Value::List(items) => {
            let (from, to) = slice_bounds(start, stop, items.len());
            Ok(Value::List(items[from..to].to_vec()))
        }
        Value::Tuple(items) => {
            let (from, to) = slice_bounds(start, stop, items.len());
            Ok(Value::Tuple(items[from..to].to_vec()))
        }
        Value::Scalar(Scalar::Str(text)) => {
            let chars: Vec<char> = text.chars().collect();
            let (from, to) = slice_bounds(start, stop, chars.len());
            Ok(Value::Scalar(Scalar::Str(chars[from..to].iter().collect())))
        }
        other => Err(EvalError::mismatch(format!(
            "'{}' object cannot be sliced",
            other.type_name()
        ))),
    }
}

fn select_group(group: GroupBy, key: Value) -> EvalResult<Value> {
    let selection = match key {
        Value::Scalar(Scalar::Str(name)) => {
            group.frame.column(&name)?;
            Selection::One(name)
        }
        Value::List(names) => {
            let names = string_list(&names)?;
            for name in &names {
                group.frame.column(name)?;
            }
            Selection::Many(names)
        }
        other => return Err(EvalError::missing_key(other.render())),
    };
    Ok(Value::GroupBy(GroupBy { selection, ..group }))
}

fn row_series(frame: &Dataset, row: usize, only: Option<&[String]>) -> EvalResult<Series> {
    let names: Vec<String> = match only {
        Some(names) => names.to_vec(),
        None => frame.column_names().to_vec(),
    };
    let values = names
        .iter()
        .map(|name| Ok(frame.column(name)?.get(row)))
        .collect::<EvalResult<Vec<_>>>()?;
    let values = Column::from_scalars(values);
    Ok(Series::new(Some(frame.label(row)), names, values))
}

pub(super) fn boolean_mask(series: &Series) -> EvalResult<Vec<bool>> {
    if series.values.data_type() != DataType::Boolean {
        return Err(EvalError::mismatch(format!(
            "cannot filter with a {} series; use a comparison such as df['col'] > 0",
            series.dtype_name()
        )));
    }
    Ok((0..series.len())
        .map(|i| series.get(i).as_bool().unwrap_or(false))
        .collect())
}

pub(super) fn truthy(value: &Value) -> EvalResult<bool> {
    match value {
        Value::Scalar(Scalar::Null) => Ok(false),
        Value::Scalar(Scalar::Bool(b)) => Ok(*b),
        Value::Scalar(Scalar::Int(v)) => Ok(*v != 0),
        Value::Scalar(Scalar::Float(v)) => Ok(*v != 0.0),
        Value::Scalar(Scalar::Str(s)) => Ok(!s.is_empty()),
        Value::List(items) | Value::Tuple(items) => Ok(!items.is_empty()),
        Value::Series(_) | Value::Frame(_) => Err(EvalError::mismatch(
            "The truth value of a Series is ambiguous. Use a.any(), a.all(), or combine conditions with & and | inside parentheses",
        )),
        _ => Ok(true),
    }
}

pub(super) fn attribute(target: Value, name: &str) -> EvalResult<Value> {
    match target {
        Value::Frame(frame) => match name {
            "shape" => Ok(Value::Tuple(vec![
                Scalar::Int(frame.row_count() as i64),
                Scalar::Int(frame.column_count() as i64),
            ])),
            "columns" => Ok(Value::List(
                frame.column_names().iter().map(|n| Scalar::Str(n.clone())).collect(),
            )),
            "dtypes" => {
                let names = frame.column_names().to_vec();
                let dtypes: Vec<Scalar> = names
                    .iter()
                    .filter_map(|n| frame.get_column(n))
                    .map(|c| Scalar::Str(c.data_type().dtype_name().to_string()))
                    .collect();
                Ok(Value::Series(Series::new(None, names, Column::from_scalars(dtypes))))
            }
            "size" => Ok(Value::Scalar(Scalar::Int(
                (frame.row_count() * frame.column_count()) as i64,
            ))),
            "empty" => Ok(Value::Scalar(Scalar::Bool(
                frame.row_count() == 0 || frame.column_count() == 0,
            ))),
            "index" => Ok(Value::List(frame.labels().iter().map(|l| label_scalar(l)).collect())),
            "loc" | "iloc" => Ok(Value::Indexer {
                positional: name == "iloc",
                target: Box::new(Value::Frame(frame)),
            }),
            _ if frame.get_column(name).is_some() => {
                Ok(Value::Series(Series::from_frame(&frame, name)?))
            }
            _ if FRAME_METHODS.contains(&name) => Err(EvalError::unsupported(format!(
                "DataFrame.{name} is a method; call it as {name}()"
            ))),
            _ => Err(EvalError::UnknownColumn(format!(
                "'DataFrame' object has no attribute '{name}'"
            ))),
        },
        Value::Series(series) => match name {
            "dtype" => Ok(Value::Scalar(Scalar::Str(series.dtype_name().to_string()))),
            "str" if series.values.data_type() == DataType::String => {
                Ok(Value::StrAccessor(series))
            }
            "str" => Err(EvalError::mismatch(
                "Can only use .str accessor with string values",
            )),
            "shape" => Ok(Value::Tuple(vec![Scalar::Int(series.len() as i64)])),
            "size" => Ok(Value::Scalar(Scalar::Int(series.len() as i64))),
            "empty" => Ok(Value::Scalar(Scalar::Bool(series.is_empty()))),
            "name" => Ok(Value::Scalar(
                series.name.clone().map_or(Scalar::Null, Scalar::Str),
            )),
            "index" => Ok(Value::List(series.labels.iter().map(|l| label_scalar(l)).collect())),
            "values" => Ok(Value::List(series.values.iter().collect())),
            "loc" | "iloc" => Ok(Value::Indexer {
                positional: name == "iloc",
                target: Box::new(Value::Series(series)),
            }),
            _ => Err(EvalError::unsupported(format!(
                "'Series' object has no attribute '{name}'"
            ))),
        },
        Value::GroupBy(group) if group.frame.get_column(name).is_some() => {
            select_group(group, Value::Scalar(Scalar::Str(name.to_string())))
        }
        other => Err(EvalError::unsupported(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, operand: Value) -> EvalResult<Value> {
    if op == UnaryOp::Not {
        return Ok(Value::Scalar(Scalar::Bool(!truthy(&operand)?)));
    }
    let apply = |value: &Scalar| -> EvalResult<Scalar> {
        match (op, value) {
            (_, Scalar::Null) => Ok(Scalar::Null),
            (UnaryOp::Invert, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
            (UnaryOp::Invert, Scalar::Int(v)) => Ok(Scalar::Int(!v)),
            (UnaryOp::Neg, Scalar::Int(v)) => Ok(v
                .checked_neg()
                .map_or(Scalar::Float(-(*v as f64)), Scalar::Int)),
            (UnaryOp::Neg, Scalar::Float(v)) => Ok(Scalar::Float(-v)),
            (UnaryOp::Neg, Scalar::Bool(b)) => Ok(Scalar::Int(-i64::from(*b))),
            (UnaryOp::Pos, v) if v.is_numeric() => Ok(v.clone()),
            (_, other) => Err(EvalError::mismatch(format!(
                "bad operand type for unary operator: '{}'",
                other.type_name()
            ))),
        }
    };
    match operand {
        Value::Scalar(scalar) => Ok(Value::Scalar(apply(&scalar)?)),
        Value::Series(series) => {
            let values = series.values.iter().map(|v| apply(&v)).collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Series(series.map_values(Column::from_scalars(values))))
        }
        Value::Frame(frame) => {
            let mut out = Dataset::new(frame.metadata.clone());
            for name in frame.column_names() {
                let values = frame
                    .column(name)?
                    .iter()
                    .map(|v| apply(&v))
                    .collect::<EvalResult<Vec<_>>>()?;
                out.add_column(name.clone(), Column::from_scalars(values))?;
            }
            Ok(Value::Frame(out.with_labels(frame.labels())?))
        }
        other => Err(EvalError::mismatch(format!(
            "bad operand type for unary operator: '{}'",
            other.type_name()
        ))),
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
    }
}

/// Scalar arithmetic. `elementwise` switches division by zero from an error
/// to IEEE results, matching column arithmetic.
pub(super) fn scalar_binary(op: BinaryOp, a: &Scalar, b: &Scalar, elementwise: bool) -> EvalResult<Scalar> {
    let mismatch = || {
        EvalError::mismatch(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            binary_symbol(op),
            a.type_name(),
            b.type_name()
        ))
    };
    match (op, a, b) {
        (BinaryOp::And | BinaryOp::Or, Scalar::Null, _) | (BinaryOp::And | BinaryOp::Or, _, Scalar::Null) => {
            Ok(Scalar::Bool(false))
        }
        (_, Scalar::Null, _) | (_, _, Scalar::Null) => Ok(Scalar::Null),
        (BinaryOp::Add, Scalar::Str(x), Scalar::Str(y)) => Ok(Scalar::Str(format!("{x}{y}"))),
        (BinaryOp::Mul, Scalar::Str(s), Scalar::Int(n)) | (BinaryOp::Mul, Scalar::Int(n), Scalar::Str(s)) => {
            repeat_text(s, *n)
        }
        (_, Scalar::Str(_), _) | (_, _, Scalar::Str(_)) => Err(mismatch()),
        (BinaryOp::And, Scalar::Bool(x), Scalar::Bool(y)) => Ok(Scalar::Bool(*x && *y)),
        (BinaryOp::Or, Scalar::Bool(x), Scalar::Bool(y)) => Ok(Scalar::Bool(*x || *y)),
        (BinaryOp::And | BinaryOp::Or, x, y) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) if !matches!(a, Scalar::Float(_)) && !matches!(b, Scalar::Float(_)) => {
                Ok(Scalar::Int(if op == BinaryOp::And { x & y } else { x | y }))
            }
            _ => Err(mismatch()),
        },
        (_, Scalar::Float(_), _) | (_, _, Scalar::Float(_)) => {
            let (x, y) = (a.as_f64().ok_or_else(mismatch)?, b.as_f64().ok_or_else(mismatch)?);
            float_binary(op, x, y, elementwise)
        }
        (_, x, y) => {
            let (x, y) = (x.as_i64().ok_or_else(mismatch)?, y.as_i64().ok_or_else(mismatch)?);
            int_binary(op, x, y, elementwise)
        }
    }
}

fn repeat_text(s: &str, n: i64) -> EvalResult<Scalar> {
    let count = usize::try_from(n).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(len) if len <= text_limit(s.len()) => Ok(Scalar::Str(s.repeat(count))),
        _ => Err(EvalError::unsupported(format!(
            "repeating a {}-byte string {n} times exceeds the {MAX_TEXT_BYTES}-byte text limit",
            s.len()
        ))),
    }
}

/// Output bound for a string operation on an input of `input_len` bytes.
pub(super) fn text_limit(input_len: usize) -> usize {
    MAX_TEXT_BYTES.max(input_len)
}

pub(super) fn text_too_long(len: usize) -> EvalError {
    EvalError::unsupported(format!(
        "string result of {len} bytes exceeds the {MAX_TEXT_BYTES}-byte text limit"
    ))
}

/// Adds `len` bytes to a per-operation running total.
pub(super) fn charge_text(used: usize, len: usize) -> EvalResult<usize> {
    let total = used.saturating_add(len);
    if total > MAX_DERIVED_TEXT_BYTES {
        return Err(EvalError::unsupported(format!(
            "operation would produce more than {MAX_DERIVED_TEXT_BYTES} bytes of text"
        )));
    }
    Ok(total)
}

fn float_binary(op: BinaryOp, x: f64, y: f64, elementwise: bool) -> EvalResult<Scalar> {
    if y == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) && !elementwise {
        return Err(EvalError::mismatch("division by zero"));
    }
    Ok(Scalar::Float(match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
        BinaryOp::Pow => x.powf(y),
        BinaryOp::And | BinaryOp::Or => {
            return Err(EvalError::mismatch("bitwise operators need integer or boolean values"))
        }
    }))
}

fn int_binary(op: BinaryOp, x: i64, y: i64, elementwise: bool) -> EvalResult<Scalar> {
    let overflow = || float_binary(op, x as f64, y as f64, elementwise);
    match op {
        BinaryOp::Add => x.checked_add(y).map_or_else(overflow, |v| Ok(Scalar::Int(v))),
        BinaryOp::Sub => x.checked_sub(y).map_or_else(overflow, |v| Ok(Scalar::Int(v))),
        BinaryOp::Mul => x.checked_mul(y).map_or_else(overflow, |v| Ok(Scalar::Int(v))),
        BinaryOp::Div => float_binary(op, x as f64, y as f64, elementwise),
        BinaryOp::FloorDiv | BinaryOp::Mod if y == 0 => {
            float_binary(op, x as f64, y as f64, elementwise)
        }
        BinaryOp::FloorDiv => x.checked_div_euclid(y).map_or_else(overflow, |q| {
            Ok(Scalar::Int(q - i64::from(y < 0 && x.rem_euclid(y) != 0)))
        }),
        BinaryOp::Mod => x.checked_rem_euclid(y).map_or_else(overflow, |r| {
            Ok(Scalar::Int(if y < 0 && r != 0 { r + y } else { r }))
        }),
        BinaryOp::Pow if y >= 0 => u32::try_from(y)
            .ok()
            .and_then(|e| x.checked_pow(e))
            .map_or_else(overflow, |v| Ok(Scalar::Int(v))),
        BinaryOp::Pow => overflow(),
        BinaryOp::And => Ok(Scalar::Int(x & y)),
        BinaryOp::Or => Ok(Scalar::Int(x | y)),
    }
}

pub(super) fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let produced = Cell::new(0usize);
    elementwise(left, right, binary_symbol(op), |a, b, each| {
        let value = scalar_binary(op, a, b, each)?;
        if let Scalar::Str(text) = &value {
            produced.set(charge_text(produced.get(), text.len())?);
        }
        Ok(value)
    })
}

fn compare_scalars(op: CompareOp, a: &Scalar, b: &Scalar) -> EvalResult<bool> {
    if a.is_null() || b.is_null() {
        return Ok(op == CompareOp::NotEq);
    }
    let ordering = match a.partial_compare(b) {
        Some(ordering) => ordering,
        None => {
            return match op {
                CompareOp::Eq => Ok(false),
                CompareOp::NotEq => Ok(true),
                _ => Err(EvalError::mismatch(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    compare_symbol(op),
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    };
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
    })
}

fn compare_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "==",
        CompareOp::NotEq => "!=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
    }
}

pub(super) fn compare(op: CompareOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) if op == CompareOp::Eq || op == CompareOp::NotEq => {
            let equal = a.len() == b.len()
                && a.iter().zip(b).all(|(x, y)| compare_scalars(CompareOp::Eq, x, y).unwrap_or(false));
            Ok(Value::Scalar(Scalar::Bool(equal == (op == CompareOp::Eq))))
        }
        _ => elementwise(left, right, compare_symbol(op), |a, b, _| {
            compare_scalars(op, a, b).map(Scalar::Bool)
        }),
    }
}

/// Applies `f` to scalars, or broadcasts it over series values.
fn elementwise<F>(left: &Value, right: &Value, symbol: &str, f: F) -> EvalResult<Value>
where
    F: Fn(&Scalar, &Scalar, bool) -> EvalResult<Scalar>,
{
    match (left, right) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(a, b, false)?)),
        (Value::Series(series), Value::Scalar(b)) => {
            let values = series.values.iter().map(|a| f(&a, b, true)).collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Series(series.map_values(Column::from_scalars(values))))
        }
        (Value::Scalar(a), Value::Series(series)) => {
            let values = series.values.iter().map(|b| f(a, &b, true)).collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Series(series.map_values(Column::from_scalars(values))))
        }
        (Value::Series(x), Value::Series(y)) => {
            if x.len() != y.len() {
                return Err(EvalError::mismatch(format!(
                    "cannot combine series of lengths {} and {}",
                    x.len(),
                    y.len()
                )));
            }
            let values = (0..x.len())
                .map(|i| f(&x.get(i), &y.get(i), true))
                .collect::<EvalResult<Vec<_>>>()?;
            let mut result = x.map_values(Column::from_scalars(values));
            if x.name != y.name {
                result.name = None;
            }
            Ok(Value::Series(result))
        }
        (Value::Frame(_), _) | (_, Value::Frame(_)) => Err(EvalError::unsupported(format!(
            "'{symbol}' on a whole DataFrame is not supported; select a column first"
        ))),
        (a, b) => Err(EvalError::mismatch(format!(
            "unsupported operand type(s) for {symbol}: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_follows_python() {
        let int = |v| Scalar::Int(v);
        assert_eq!(scalar_binary(BinaryOp::FloorDiv, &int(-7), &int(2), false).unwrap(), int(-4));
        assert_eq!(scalar_binary(BinaryOp::Mod, &int(-7), &int(2), false).unwrap(), int(1));
        assert_eq!(scalar_binary(BinaryOp::Mod, &int(7), &int(-2), false).unwrap(), int(-1));
        assert_eq!(
            scalar_binary(BinaryOp::Div, &int(7), &int(2), false).unwrap(),
            Scalar::Float(3.5)
        );
        assert!(scalar_binary(BinaryOp::Div, &int(1), &int(0), false).is_err());
        assert_eq!(
            scalar_binary(BinaryOp::Div, &int(1), &int(0), true).unwrap(),
            Scalar::Float(f64::INFINITY)
        );
    }

    #[test]
    fn string_repetition_is_capped() {
        let text = |v: &str| Scalar::Str(v.into());
        assert_eq!(
            scalar_binary(BinaryOp::Mul, &text("ab"), &Scalar::Int(3), false).unwrap(),
            text("ababab")
        );
        assert_eq!(
            scalar_binary(BinaryOp::Mul, &Scalar::Int(-2), &text("ab"), false).unwrap(),
            text("")
        );
        let err = scalar_binary(BinaryOp::Mul, &text("ab"), &Scalar::Int(i64::MAX), false).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
        let err = scalar_binary(BinaryOp::Mul, &text("a"), &Scalar::Int(100_000_000_000), false).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
        assert!(scalar_binary(BinaryOp::Mul, &text("a"), &Scalar::Int(MAX_TEXT_BYTES as i64), false).is_ok());
    }

    #[test]
    fn series_repetition_is_capped() {
        let names = Series::new(
            Some("name".into()),
            vec!["0".into(), "1".into()],
            Column::from_scalars(vec![Scalar::Str("ann".into()), Scalar::Str("bo".into())]),
        );
        let err = binary(
            BinaryOp::Mul,
            &Value::Series(names.clone()),
            &Value::Scalar(Scalar::Int(4_611_686_018_427_387_904)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unsupported");

        let doubled = binary(BinaryOp::Mul, &Value::Series(names), &Value::Scalar(Scalar::Int(2))).unwrap();
        let Value::Series(doubled) = doubled else { panic!("expected a series") };
        assert_eq!(doubled.get(1), Scalar::Str("bobo".into()));
    }

    #[test]
    fn text_budget_spans_the_whole_operation() {
        assert_eq!(charge_text(10, 5).unwrap(), 15);
        assert!(charge_text(MAX_DERIVED_TEXT_BYTES, 1).is_err());
    }

    #[test]
    fn null_comparisons_are_false_except_not_equal() {
        assert!(!compare_scalars(CompareOp::Eq, &Scalar::Null, &Scalar::Int(1)).unwrap());
        assert!(compare_scalars(CompareOp::NotEq, &Scalar::Null, &Scalar::Int(1)).unwrap());
        assert!(compare_scalars(CompareOp::Gt, &Scalar::Str("a".into()), &Scalar::Int(1)).is_err());
    }

    #[test]
    fn slices_clamp() {
        assert_eq!(slice_bounds(Some(-2), None, 5), (3, 5));
        assert_eq!(slice_bounds(Some(4), Some(2), 5), (4, 4));
        assert_eq!(slice_bounds(None, Some(99), 5), (0, 5));
    }
}
