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

//! Method and builtin tables. Anything not listed here is rejected as unsupported.

use super::error::{EvalError, EvalResult};
use super::eval::{
    charge_text, label_scalar, scalar_binary, scalar_of, string_list, text_limit, text_too_long, truthy,
};
use super::parser::BinaryOp;
use super::value::{GroupBy, Selection, Series, Value};
use crate::column::{Column, DataType};
use crate::dataset::Dataset;
use crate::ops::{self, AggregateFunction};
use crate::scalar::Scalar;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

const BUILTINS: &[&str] = &[
    "len", "round", "abs", "sum", "min", "max", "int", "float", "str", "bool", "list", "sorted",
    "print",
];

const NUMERIC_SUMMARY: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
const OBJECT_SUMMARY: [&str; 4] = ["count", "unique", "top", "freq"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Evaluated call arguments.
#[derive(Debug, Default)]
pub struct Args {
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Rejects arguments that do not fit `params`, listed in positional order.
    fn check(&self, owner: &str, method: &str, params: &[&str]) -> EvalResult<()> {
        if self.positional.len() > params.len() {
            return Err(EvalError::mismatch(format!(
                "{owner}.{method}() takes at most {} argument(s) but {} were given",
                params.len(),
                self.positional.len()
            )));
        }
        for (keyword, _) in &self.keywords {
            match params.iter().position(|p| p == keyword) {
                None => {
                    return Err(EvalError::unsupported(format!(
                        "{owner}.{method}() got an unsupported keyword argument '{keyword}'"
                    )))
                }
                Some(at) if at < self.positional.len() => {
                    return Err(EvalError::mismatch(format!(
                        "{owner}.{method}() got multiple values for argument '{keyword}'"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn get(&self, position: usize, name: &str) -> Option<&Value> {
        self.positional.get(position).or_else(|| {
            self.keywords
                .iter()
                .find(|(keyword, _)| keyword == name)
                .map(|(_, value)| value)
        })
    }

    fn required(&self, position: usize, name: &str) -> EvalResult<&Value> {
        self.get(position, name)
            .ok_or_else(|| EvalError::mismatch(format!("missing required argument '{name}'")))
    }

    fn int(&self, position: usize, name: &str, default: i64) -> EvalResult<i64> {
        match self.get(position, name) {
            None | Some(Value::Scalar(Scalar::Null)) => Ok(default),
            Some(Value::Scalar(Scalar::Int(v))) => Ok(*v),
            Some(other) => Err(EvalError::mismatch(format!(
                "argument '{name}' must be an integer, not {}",
                other.type_name()
            ))),
        }
    }

    fn float(&self, position: usize, name: &str, default: f64) -> EvalResult<f64> {
        match self.get(position, name) {
            None => Ok(default),
            Some(Value::Scalar(scalar)) if scalar.as_f64().is_some() => {
                Ok(scalar.as_f64().unwrap_or(default))
            }
            Some(other) => Err(EvalError::mismatch(format!(
                "argument '{name}' must be a number, not {}",
                other.type_name()
            ))),
        }
    }

    fn boolean(&self, position: usize, name: &str, default: bool) -> EvalResult<bool> {
        match self.get(position, name) {
            None => Ok(default),
            Some(Value::Scalar(Scalar::Bool(b))) => Ok(*b),
            Some(Value::List(items)) if !items.is_empty() => {
                // A list of flags is accepted when every flag agrees.
                let first = items[0].as_bool();
                if items.iter().all(|item| item.as_bool() == first) {
                    first.ok_or_else(|| EvalError::mismatch(format!("'{name}' must be a boolean")))
                } else {
                    Err(EvalError::unsupported(format!(
                        "mixed values for '{name}' are not supported"
                    )))
                }
            }
            Some(other) => Err(EvalError::mismatch(format!(
                "argument '{name}' must be a boolean, not {}",
                other.type_name()
            ))),
        }
    }

    fn string(&self, position: usize, name: &str) -> EvalResult<Option<String>> {
        match self.get(position, name) {
            None | Some(Value::Scalar(Scalar::Null)) => Ok(None),
            Some(Value::Scalar(Scalar::Str(s))) => Ok(Some(s.clone())),
            Some(other) => Err(EvalError::mismatch(format!(
                "argument '{name}' must be a string, not {}",
                other.type_name()
            ))),
        }
    }

    /// A column name or a list of them.
    fn names(&self, position: usize, name: &str) -> EvalResult<Option<Vec<String>>> {
        match self.get(position, name) {
            None | Some(Value::Scalar(Scalar::Null)) => Ok(None),
            Some(Value::Scalar(Scalar::Str(s))) => Ok(Some(vec![s.clone()])),
            Some(Value::List(items)) | Some(Value::Tuple(items)) => Ok(Some(string_list(items)?)),
            Some(other) => Err(EvalError::missing_key(other.render())),
        }
    }

    fn scalar(&self, position: usize, name: &str) -> EvalResult<Scalar> {
        scalar_of(self.required(position, name)?.clone())
    }
}

pub fn call_method(target: Value, name: &str, args: Args) -> EvalResult<Value> {
    match target {
        Value::Frame(frame) => frame_method(frame, name, args),
        Value::Series(series) => series_method(series, name, args),
        Value::GroupBy(group) => groupby_method(group, name, args),
        Value::StrAccessor(series) => str_method(series, name, args),
        Value::List(items) | Value::Tuple(items) => list_method(items, name, args),
        Value::Scalar(scalar) => scalar_method(scalar, name, args),
        other => Err(EvalError::mismatch(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

fn frame_method(frame: Dataset, name: &str, args: Args) -> EvalResult<Value> {
    if let Some(function) = AggregateFunction::from_method(name) {
        args.check("DataFrame", name, &["numeric_only"])?;
        let numeric_only = args.boolean(0, "numeric_only", false)?;
        return frame_aggregate(&frame, function, numeric_only);
    }
    match name {
        "head" | "tail" => {
            args.check("DataFrame", name, &["n"])?;
            let rows = row_window(frame.row_count(), args.int(0, "n", 5)?, name == "head");
            Ok(Value::Frame(frame.select_rows(&rows)?))
        }
        "sort_values" => {
            args.check("DataFrame", name, &["by", "ascending"])?;
            let by = args
                .names(0, "by")?
                .ok_or_else(|| EvalError::mismatch("sort_values() missing required argument 'by'"))?;
            let ascending = args.boolean(1, "ascending", true)?;
            Ok(Value::Frame(frame.sort_by(&by, ascending)?))
        }
        "nlargest" | "nsmallest" => {
            args.check("DataFrame", name, &["n", "columns"])?;
            let n = args.int(0, "n", 5)?;
            let columns = args
                .names(1, "columns")?
                .ok_or_else(|| EvalError::mismatch(format!("{name}() missing required argument 'columns'")))?;
            for column in &columns {
                require_numeric(frame.column(column)?, name, column)?;
            }
            let sorted = frame.sort_by(&columns, name == "nsmallest")?;
            Ok(Value::Frame(sorted.head(n.max(0) as usize)?))
        }
        "groupby" => {
            args.check("DataFrame", name, &["by"])?;
            let by = args
                .names(0, "by")?
                .ok_or_else(|| EvalError::mismatch("groupby() missing required argument 'by'"))?;
            let key = match by.as_slice() {
                [key] => key.clone(),
                _ => {
                    return Err(EvalError::unsupported(
                        "grouping by more than one column is not supported",
                    ))
                }
            };
            frame.column(&key)?;
            Ok(Value::GroupBy(GroupBy {
                frame,
                key,
                selection: Selection::All,
            }))
        }
        "describe" => {
            args.check("DataFrame", name, &[])?;
            describe_frame(&frame)
        }
        "drop_duplicates" => {
            args.check("DataFrame", name, &["subset", "keep"])?;
            if let Some(keep) = args.string(1, "keep")? {
                if keep != "first" {
                    return Err(EvalError::unsupported("only keep='first' is supported"));
                }
            }
            let subset = args.names(0, "subset")?;
            Ok(Value::Frame(frame.drop_duplicates(subset.as_deref())?))
        }
        "isnull" | "isna" | "notnull" | "notna" => {
            args.check("DataFrame", name, &[])?;
            let wanted_null = name.starts_with("is");
            map_columns(&frame, |column| null_mask(column, wanted_null))
        }
        "dropna" => {
            args.check("DataFrame", name, &["subset"])?;
            let subset = args
                .names(0, "subset")?
                .unwrap_or_else(|| frame.column_names().to_vec());
            let keys = subset
                .iter()
                .map(|name| frame.column(name))
                .collect::<Result<Vec<_>, _>>()?;
            let rows: Vec<usize> = (0..frame.row_count())
                .filter(|&row| keys.iter().all(|column| !column.is_null(row)))
                .collect();
            Ok(Value::Frame(frame.select_rows(&rows)?))
        }
        "fillna" => {
            args.check("DataFrame", name, &["value"])?;
            let fill = args.scalar(0, "value")?;
            map_columns(&frame, |column| fill_nulls(column, &fill))
        }
        "reset_index" => {
            args.check("DataFrame", name, &["drop"])?;
            let positions: Vec<String> = (0..frame.row_count()).map(|i| i.to_string()).collect();
            if args.boolean(0, "drop", false)? {
                return Ok(Value::Frame(frame.clone().with_labels(positions)?));
            }
            let mut out = Dataset::new(frame.metadata.clone());
            let index_name = if frame.get_column("index").is_some() {
                "level_0"
            } else {
                "index"
            };
            out.add_column(
                index_name,
                Column::from_scalars(frame.labels().iter().map(|l| label_scalar(l)).collect()),
            )?;
            for column in frame.column_names() {
                out.add_column(column.clone(), frame.column(column)?.clone())?;
            }
            Ok(Value::Frame(out))
        }
        "copy" => Ok(Value::Frame(frame)),
        "apply" | "map" | "applymap" | "query" | "eval" | "assign" | "pipe" => Err(
            EvalError::unsupported(format!("DataFrame.{name}() runs arbitrary code and is not supported")),
        ),
        _ => Err(EvalError::unsupported(format!(
            "DataFrame.{name}() is not supported"
        ))),
    }
}

fn frame_aggregate(frame: &Dataset, function: AggregateFunction, numeric_only: bool) -> EvalResult<Value> {
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for name in frame.column_names() {
        let column = frame.column(name)?;
        if numeric_only && function.requires_numeric() && !column.data_type().is_numeric() {
            continue;
        }
        values.push(ops::aggregate(column, function, None)?);
        labels.push(name.clone());
    }
    Ok(Value::Series(Series::new(None, labels, Column::from_scalars(values))))
}

fn map_columns<F>(frame: &Dataset, f: F) -> EvalResult<Value>
where
    F: Fn(&Column) -> Column,
{
    let mut out = Dataset::new(frame.metadata.clone());
    for name in frame.column_names() {
        out.add_column(name.clone(), f(frame.column(name)?))?;
    }
    out.metadata.row_count = frame.row_count();
    Ok(Value::Frame(out.with_labels(frame.labels())?))
}

fn null_mask(column: &Column, wanted_null: bool) -> Column {
    Column::Boolean(
        (0..column.len())
            .map(|row| Some(column.is_null(row) == wanted_null))
            .collect::<Vec<_>>()
            .into(),
    )
}

fn fill_nulls(column: &Column, fill: &Scalar) -> Column {
    Column::from_scalars(
        column
            .iter()
            .map(|value| if value.is_null() { fill.clone() } else { value })
            .collect(),
    )
}

fn require_numeric(column: &Column, method: &str, name: &str) -> EvalResult<()> {
    if column.data_type().is_numeric() {
        Ok(())
    } else {
        Err(EvalError::mismatch(format!(
            "Column '{name}' has dtype object, cannot use method '{method}' with this dtype"
        )))
    }
}

/// Row positions for `head`/`tail`; a negative `n` drops rows from the other end.
fn row_window(len: usize, n: i64, from_start: bool) -> Vec<usize> {
    let count = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    if from_start {
        (0..count).collect()
    } else {
        (len - count..len).collect()
    }
}

fn numeric_summary(column: &Column) -> EvalResult<Vec<Scalar>> {
    let as_float = |scalar: Scalar| scalar.as_f64().map_or(Scalar::Null, Scalar::Float);
    Ok(vec![
        as_float(ops::aggregate(column, AggregateFunction::Count, None)?),
        ops::aggregate(column, AggregateFunction::Mean, None)?,
        ops::aggregate(column, AggregateFunction::Std, None)?,
        as_float(ops::aggregate(column, AggregateFunction::Min, None)?),
        ops::quantile(column, 0.25)?,
        ops::quantile(column, 0.5)?,
        ops::quantile(column, 0.75)?,
        as_float(ops::aggregate(column, AggregateFunction::Max, None)?),
    ])
}

fn object_summary(column: &Column) -> EvalResult<Vec<Scalar>> {
    let counts = ops::value_counts(column);
    let (top, freq) = counts
        .first()
        .map_or((Scalar::Null, Scalar::Null), |(value, count)| {
            (value.clone(), Scalar::Int(*count as i64))
        });
    Ok(vec![
        ops::aggregate(column, AggregateFunction::Count, None)?,
        Scalar::Int(counts.len() as i64),
        top,
        freq,
    ])
}

fn is_summarised_numerically(column: &Column) -> bool {
    matches!(column.data_type(), DataType::Int64 | DataType::Float64)
}

fn describe_frame(frame: &Dataset) -> EvalResult<Value> {
    let numeric: Vec<&String> = frame
        .column_names()
        .iter()
        .filter(|name| frame.get_column(name).is_some_and(is_summarised_numerically))
        .collect();
    let (names, labels): (Vec<&String>, &[&str]) = if numeric.is_empty() {
        (frame.column_names().iter().collect(), &OBJECT_SUMMARY[..])
    } else {
        (numeric, &NUMERIC_SUMMARY[..])
    };
    if names.is_empty() {
        return Err(EvalError::mismatch("Cannot describe a DataFrame without columns"));
    }
    let mut out = Dataset::new(frame.metadata.clone());
    for name in names {
        let column = frame.column(name)?;
        let summary = if labels.len() == NUMERIC_SUMMARY.len() {
            numeric_summary(column)?
        } else {
            object_summary(column)?
        };
        out.add_column(name.clone(), Column::from_scalars(summary))?;
    }
    let labels = labels.iter().map(|l| l.to_string()).collect();
    Ok(Value::Frame(out.with_labels(labels)?))
}

fn describe_series(series: &Series) -> EvalResult<Value> {
    let (labels, summary): (&[&str], _) = if is_summarised_numerically(&series.values) {
        (&NUMERIC_SUMMARY[..], numeric_summary(&series.values)?)
    } else {
        (&OBJECT_SUMMARY[..], object_summary(&series.values)?)
    };
    Ok(Value::Series(Series::new(
        series.name.clone(),
        labels.iter().map(|l| l.to_string()).collect(),
        Column::from_scalars(summary),
    )))
}

fn series_method(series: Series, name: &str, args: Args) -> EvalResult<Value> {
    if let Some(function) = AggregateFunction::from_method(name) {
        args.check("Series", name, &[])?;
        return Ok(Value::Scalar(ops::aggregate(&series.values, function, None)?));
    }
    match name {
        "quantile" => {
            args.check("Series", name, &["q"])?;
            let q = args.float(0, "q", 0.5)?;
            Ok(Value::Scalar(ops::quantile(&series.values, q)?))
        }
        "unique" => {
            args.check("Series", name, &[])?;
            let mut seen = HashSet::new();
            Ok(Value::List(
                series
                    .values
                    .iter()
                    .filter(|value| seen.insert(value.repr()))
                    .collect(),
            ))
        }
        "value_counts" => {
            args.check("Series", name, &["normalize", "ascending", "dropna"])?;
            value_counts(&series, &args)
        }
        "mode" => {
            args.check("Series", name, &[])?;
            let counts = ops::value_counts(&series.values);
            let top = counts.first().map_or(0, |(_, count)| *count);
            let mut modes: Vec<Scalar> = counts
                .into_iter()
                .filter(|(_, count)| *count == top)
                .map(|(value, _)| value)
                .collect();
            modes.sort_by(|a, b| a.sort_compare(b));
            let labels = (0..modes.len()).map(|i| i.to_string()).collect();
            Ok(Value::Series(Series::new(
                series.name.clone(),
                labels,
                Column::from_scalars(modes),
            )))
        }
        "head" | "tail" => {
            args.check("Series", name, &["n"])?;
            let rows = row_window(series.len(), args.int(0, "n", 5)?, name == "head");
            Ok(Value::Series(series.select_rows(&rows)?))
        }
        "sort_values" => {
            args.check("Series", name, &["ascending"])?;
            let ascending = args.boolean(0, "ascending", true)?;
            let rows = ops::sort_indices(&[&series.values], series.len(), ascending);
            Ok(Value::Series(series.select_rows(&rows)?))
        }
        "sort_index" => {
            args.check("Series", name, &["ascending"])?;
            let ascending = args.boolean(0, "ascending", true)?;
            let keys = Column::from_scalars(series.labels.iter().map(|l| label_scalar(l)).collect());
            let rows = ops::sort_indices(&[&keys], series.len(), ascending);
            Ok(Value::Series(series.select_rows(&rows)?))
        }
        "nlargest" | "nsmallest" => {
            args.check("Series", name, &["n"])?;
            let label = series.name.clone().unwrap_or_default();
            require_numeric(&series.values, name, &label)?;
            let n = args.int(0, "n", 5)?.max(0) as usize;
            let rows = ops::sort_indices(&[&series.values], series.len(), name == "nsmallest");
            let rows: Vec<usize> = rows.into_iter().take(n).collect();
            Ok(Value::Series(series.select_rows(&rows)?))
        }
        "idxmax" | "idxmin" => {
            args.check("Series", name, &[])?;
            let wanted = if name == "idxmax" {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best: Option<(usize, Scalar)> = None;
            for (row, value) in series.values.iter().enumerate() {
                if value.is_null() {
                    continue;
                }
                let replace = match &best {
                    None => true,
                    Some((_, current)) => value.sort_compare(current) == wanted,
                };
                if replace {
                    best = Some((row, value));
                }
            }
            let (row, _) = best.ok_or_else(|| {
                EvalError::mismatch(format!("attempt to get {name} of an empty sequence"))
            })?;
            Ok(Value::Scalar(label_scalar(&series.labels[row])))
        }
        "isnull" | "isna" | "notnull" | "notna" => {
            args.check("Series", name, &[])?;
            let mask = null_mask(&series.values, name.starts_with("is"));
            Ok(Value::Series(series.map_values(mask)))
        }
        "round" => {
            args.check("Series", name, &["decimals"])?;
            let decimals = args.int(0, "decimals", 0)?;
            round_series(&series, Some(decimals))
        }
        "abs" => {
            args.check("Series", name, &[])?;
            abs_series(&series)
        }
        "tolist" | "to_list" => {
            args.check("Series", name, &[])?;
            Ok(Value::List(series.values.iter().collect()))
        }
        "describe" => {
            args.check("Series", name, &[])?;
            describe_series(&series)
        }
        "reset_index" => {
            args.check("Series", name, &["drop", "name"])?;
            let positions: Vec<String> = (0..series.len()).map(|i| i.to_string()).collect();
            if args.boolean(0, "drop", false)? {
                let mut reset = series.clone();
                reset.labels = positions;
                reset.index_name = None;
                return Ok(Value::Series(reset));
            }
            let value_name = args
                .string(1, "name")?
                .or_else(|| series.name.clone())
                .unwrap_or_else(|| "0".to_string());
            let index_name = series.index_name.clone().unwrap_or_else(|| "index".to_string());
            let mut out = Dataset::new(crate::dataset::DatasetMetadata::named("series"));
            out.add_column(
                index_name,
                Column::from_scalars(series.labels.iter().map(|l| label_scalar(l)).collect()),
            )?;
            out.add_column(value_name, series.values.clone())?;
            Ok(Value::Frame(out))
        }
        "fillna" => {
            args.check("Series", name, &["value"])?;
            let fill = args.scalar(0, "value")?;
            Ok(Value::Series(series.map_values(fill_nulls(&series.values, &fill))))
        }
        "dropna" => {
            args.check("Series", name, &[])?;
            let rows: Vec<usize> = (0..series.len())
                .filter(|&row| !series.values.is_null(row))
                .collect();
            Ok(Value::Series(series.select_rows(&rows)?))
        }
        "between" => {
            args.check("Series", name, &["left", "right", "inclusive"])?;
            let left = args.scalar(0, "left")?;
            let right = args.scalar(1, "right")?;
            let inclusive = args.string(2, "inclusive")?.unwrap_or_else(|| "both".to_string());
            let (low_closed, high_closed) = match inclusive.as_str() {
                "both" => (true, true),
                "neither" => (false, false),
                "left" => (true, false),
                "right" => (false, true),
                other => {
                    return Err(EvalError::mismatch(format!(
                        "inclusive must be 'both', 'neither', 'left' or 'right', not '{other}'"
                    )))
                }
            };
            let mask = series
                .values
                .iter()
                .map(|value| {
                    let above = value.partial_compare(&left).map(|o| {
                        o == Ordering::Greater || (low_closed && o == Ordering::Equal)
                    });
                    let below = value.partial_compare(&right).map(|o| {
                        o == Ordering::Less || (high_closed && o == Ordering::Equal)
                    });
                    Some(above.unwrap_or(false) && below.unwrap_or(false))
                })
                .collect::<Vec<_>>();
            Ok(Value::Series(series.map_values(Column::Boolean(mask.into()))))
        }
        "isin" => {
            args.check("Series", name, &["values"])?;
            let wanted: HashSet<String> = match args.required(0, "values")? {
                Value::List(items) | Value::Tuple(items) => items.iter().map(Scalar::repr).collect(),
                Value::Series(other) => other.values.iter().map(|v| v.repr()).collect(),
                other => {
                    return Err(EvalError::mismatch(format!(
                        "only list-like objects are allowed to be passed to isin(), you passed a {}",
                        other.type_name()
                    )))
                }
            };
            let mask = series
                .values
                .iter()
                .map(|value| Some(wanted.contains(&value.repr()) || numeric_member(&value, &wanted)))
                .collect::<Vec<_>>();
            Ok(Value::Series(series.map_values(Column::Boolean(mask.into()))))
        }
        "any" | "all" => {
            args.check("Series", name, &[])?;
            let mut flags = series
                .values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| truthy(&Value::Scalar(v)));
            let result = if name == "any" {
                flags.try_fold(false, |acc, flag| flag.map(|f| acc || f))?
            } else {
                flags.try_fold(true, |acc, flag| flag.map(|f| acc && f))?
            };
            Ok(Value::Scalar(Scalar::Bool(result)))
        }
        "astype" => {
            args.check("Series", name, &["dtype"])?;
            let dtype = args
                .string(0, "dtype")?
                .ok_or_else(|| EvalError::mismatch("astype() needs a dtype name"))?;
            let values = series
                .values
                .iter()
                .map(|value| convert_scalar(&value, &dtype))
                .collect::<EvalResult<Vec<_>>>()?;
            let column = if matches!(dtype.as_str(), "str" | "object") {
                Column::String(
                    values
                        .iter()
                        .map(|v| match v {
                            Scalar::Null => None,
                            other => Some(other.key_string().into()),
                        })
                        .collect::<Vec<_>>()
                        .into(),
                )
            } else {
                Column::from_scalars(values)
            };
            Ok(Value::Series(series.map_values(column)))
        }
        "item" => {
            args.check("Series", name, &[])?;
            if series.len() != 1 {
                return Err(EvalError::mismatch(
                    "can only convert an array of size 1 to a Python scalar",
                ));
            }
            Ok(Value::Scalar(series.get(0)))
        }
        "copy" => Ok(Value::Series(series)),
        "apply" | "map" | "transform" | "pipe" => Err(EvalError::unsupported(format!(
            "Series.{name}() runs arbitrary code and is not supported"
        ))),
        _ => Err(EvalError::unsupported(format!("Series.{name}() is not supported"))),
    }
}

/// `isin([1, 2])` also matches `1.0`.
fn numeric_member(value: &Scalar, wanted: &HashSet<String>) -> bool {
    match value {
        Scalar::Float(v) if v.fract() == 0.0 => wanted.contains(&(*v as i64).to_string()),
        Scalar::Int(v) => wanted.contains(&Scalar::Float(*v as f64).repr()),
        _ => false,
    }
}

fn value_counts(series: &Series, args: &Args) -> EvalResult<Value> {
    let normalize = args.boolean(0, "normalize", false)?;
    let ascending = args.boolean(1, "ascending", false)?;
    let dropna = args.boolean(2, "dropna", true)?;
    let mut counts = ops::value_counts(&series.values);
    if !dropna {
        let nulls = series.values.null_count();
        if nulls > 0 {
            counts.push((Scalar::Null, nulls));
            counts.sort_by(|a, b| b.1.cmp(&a.1));
        }
    }
    if ascending {
        counts.sort_by(|a, b| a.1.cmp(&b.1));
    }
    let total: usize = counts.iter().map(|(_, count)| count).sum();
    let labels = counts.iter().map(|(value, _)| value.to_string()).collect();
    let values: Vec<Scalar> = counts
        .iter()
        .map(|(_, count)| {
            if normalize {
                Scalar::Float(*count as f64 / total.max(1) as f64)
            } else {
                Scalar::Int(*count as i64)
            }
        })
        .collect();
    let name = if normalize { "proportion" } else { "count" };
    let mut result = Series::new(Some(name.to_string()), labels, Column::from_scalars(values));
    if let Some(index_name) = &series.name {
        result = result.with_index_name(index_name.clone());
    }
    Ok(Value::Series(result))
}

fn convert_scalar(value: &Scalar, dtype: &str) -> EvalResult<Scalar> {
    if value.is_null() {
        return Ok(Scalar::Null);
    }
    let failed = || {
        EvalError::mismatch(format!(
            "cannot convert {} to {dtype}",
            value.repr()
        ))
    };
    match dtype {
        "int" | "int64" | "int32" => match value {
            Scalar::Str(s) => s.trim().parse::<i64>().map(Scalar::Int).map_err(|_| failed()),
            Scalar::Float(v) => Ok(Scalar::Int(v.trunc() as i64)),
            other => other.as_i64().map(Scalar::Int).ok_or_else(failed),
        },
        "float" | "float64" | "float32" => match value {
            Scalar::Str(s) => s.trim().parse::<f64>().map(Scalar::Float).map_err(|_| failed()),
            other => other.as_f64().map(Scalar::Float).ok_or_else(failed),
        },
        "bool" => Ok(Scalar::Bool(truthy(&Value::Scalar(value.clone()))?)),
        "str" | "object" => Ok(Scalar::Str(value.key_string())),
        other => Err(EvalError::unsupported(format!("dtype '{other}' is not supported"))),
    }
}

fn round_float(value: f64, decimals: i64) -> f64 {
    let factor = 10f64.powi(decimals.clamp(-15, 15) as i32);
    (value * factor).round_ties_even() / factor
}

/// Python `round`: no digits gives an integer, digits keep the type.
fn round_scalar(value: &Scalar, decimals: Option<i64>) -> EvalResult<Scalar> {
    match (value, decimals) {
        (Scalar::Null, _) => Ok(Scalar::Null),
        (Scalar::Float(v), None) => Ok(Scalar::Int(v.round_ties_even() as i64)),
        (Scalar::Float(v), Some(d)) => Ok(Scalar::Float(round_float(*v, d))),
        (Scalar::Int(v), Some(d)) if d < 0 => {
            Ok(Scalar::Int(round_float(*v as f64, d) as i64))
        }
        (Scalar::Int(_), _) => Ok(value.clone()),
        (Scalar::Bool(b), _) => Ok(Scalar::Int(i64::from(*b))),
        (other, _) => Err(EvalError::mismatch(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn round_series(series: &Series, decimals: Option<i64>) -> EvalResult<Value> {
    let digits = decimals.unwrap_or(0);
    let values = series
        .values
        .iter()
        .map(|value| match value {
            Scalar::Float(v) => Ok(Scalar::Float(round_float(v, digits))),
            other => round_scalar(&other, Some(digits)),
        })
        .collect::<EvalResult<Vec<_>>>()?;
    Ok(Value::Series(series.map_values(Column::from_scalars(values))))
}

fn abs_scalar(value: &Scalar) -> EvalResult<Scalar> {
    match value {
        Scalar::Null => Ok(Scalar::Null),
        Scalar::Int(v) => Ok(v.checked_abs().map_or(Scalar::Float((*v as f64).abs()), Scalar::Int)),
        Scalar::Float(v) => Ok(Scalar::Float(v.abs())),
        Scalar::Bool(b) => Ok(Scalar::Int(i64::from(*b))),
        other => Err(EvalError::mismatch(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn abs_series(series: &Series) -> EvalResult<Value> {
    let values = series
        .values
        .iter()
        .map(|v| abs_scalar(&v))
        .collect::<EvalResult<Vec<_>>>()?;
    Ok(Value::Series(series.map_values(Column::from_scalars(values))))
}

fn groupby_method(group: GroupBy, name: &str, args: Args) -> EvalResult<Value> {
    let groups = ops::group_indices(group.frame.column(&group.key)?);
    match name {
        "size" => {
            args.check("GroupBy", name, &[])?;
            let labels = groups.iter().map(|(key, _)| key.key_string()).collect();
            let counts = groups
                .iter()
                .map(|(_, rows)| Scalar::Int(rows.len() as i64))
                .collect();
            Ok(Value::Series(
                Series::new(None, labels, Column::from_scalars(counts)).with_index_name(&group.key),
            ))
        }
        "agg" | "aggregate" => {
            args.check("GroupBy", name, &["func"])?;
            let functions: Vec<String> = match args.required(0, "func")? {
                Value::Scalar(Scalar::Str(f)) => vec![f.clone()],
                Value::List(items) => string_list(items)?,
                _ => {
                    return Err(EvalError::unsupported(
                        "agg() accepts a function name or a list of names",
                    ))
                }
            };
            let functions = functions
                .iter()
                .map(|f| {
                    AggregateFunction::from_method(f).ok_or_else(|| {
                        EvalError::unsupported(format!("aggregation '{f}' is not supported"))
                    })
                })
                .collect::<EvalResult<Vec<_>>>()?;
            match (functions.as_slice(), &group.selection) {
                ([single], _) => aggregate_groups(&group, &groups, *single, false),
                (many, Selection::One(column)) => {
                    let mut out = Dataset::new(group.frame.metadata.clone());
                    let source = group.frame.column(column)?;
                    for function in many {
                        let values = groups
                            .iter()
                            .map(|(_, rows)| ops::aggregate(source, *function, Some(rows)))
                            .collect::<Result<Vec<_>, _>>()?;
                        out.add_column(function.name(), Column::from_scalars(values))?;
                    }
                    let labels = groups.iter().map(|(key, _)| key.key_string()).collect();
                    Ok(Value::Frame(out.with_labels(labels)?))
                }
                _ => Err(EvalError::unsupported(
                    "several aggregations at once need a single selected column",
                )),
            }
        }
        _ => match AggregateFunction::from_method(name) {
            Some(function) => {
                args.check("GroupBy", name, &["numeric_only"])?;
                let numeric_only = args.boolean(0, "numeric_only", false)?;
                aggregate_groups(&group, &groups, function, numeric_only)
            }
            None => Err(EvalError::unsupported(format!("GroupBy.{name}() is not supported"))),
        },
    }
}

fn aggregate_groups(
    group: &GroupBy,
    groups: &[(Scalar, Vec<usize>)],
    function: AggregateFunction,
    numeric_only: bool,
) -> EvalResult<Value> {
    let labels: Vec<String> = groups.iter().map(|(key, _)| key.key_string()).collect();
    let aggregate_column = |column: &Column| -> EvalResult<Column> {
        let values = groups
            .iter()
            .map(|(_, rows)| ops::aggregate(column, function, Some(rows)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Column::from_scalars(values))
    };
    let columns: Vec<String> = match &group.selection {
        Selection::One(column) => {
            let values = aggregate_column(group.frame.column(column)?)?;
            return Ok(Value::Series(
                Series::new(Some(column.clone()), labels, values).with_index_name(&group.key),
            ));
        }
        Selection::Many(columns) => columns.clone(),
        Selection::All => group
            .frame
            .column_names()
            .iter()
            .filter(|name| **name != group.key)
            .cloned()
            .collect(),
    };
    let mut out = Dataset::new(group.frame.metadata.clone());
    for name in &columns {
        let column = group.frame.column(name)?;
        if numeric_only && function.requires_numeric() && !column.data_type().is_numeric() {
            continue;
        }
        out.add_column(name.clone(), aggregate_column(column)?)?;
    }
    if out.is_empty() {
        return Err(EvalError::mismatch(format!(
            "no columns left to compute {} on",
            function.name()
        )));
    }
    Ok(Value::Frame(out.with_labels(labels)?))
}

fn str_method(series: Series, name: &str, args: Args) -> EvalResult<Value> {
    let map_text = |f: &dyn Fn(&str) -> String| -> Value {
        let values = series
            .values
            .iter()
            .map(|value| match value {
                Scalar::Str(s) => Some(f(&s).into()),
                _ => None,
            })
            .collect::<Vec<_>>();
        Value::Series(series.map_values(Column::String(values.into())))
    };
    let try_map_text = |f: &dyn Fn(&str) -> EvalResult<String>| -> EvalResult<Value> {
        let mut produced = 0;
        let mut values: Vec<Option<Arc<str>>> = Vec::with_capacity(series.len());
        for value in series.values.iter() {
            values.push(match value {
                Scalar::Str(s) => {
                    let mapped = f(&s)?;
                    produced = charge_text(produced, mapped.len())?;
                    Some(mapped.into())
                }
                _ => None,
            });
        }
        Ok(Value::Series(series.map_values(Column::String(values.into()))))
    };
    let test_text = |f: &dyn Fn(&str) -> bool| -> Value {
        let values = series
            .values
            .iter()
            .map(|value| match value {
                Scalar::Str(s) => Some(f(&s)),
                _ => Some(false),
            })
            .collect::<Vec<_>>();
        Value::Series(series.map_values(Column::Boolean(values.into())))
    };
    match name {
        "contains" => {
            args.check("str", name, &["pat", "case", "na", "regex"])?;
            let pattern = args
                .string(0, "pat")?
                .ok_or_else(|| EvalError::mismatch("contains() missing required argument 'pat'"))?;
            let case = args.boolean(1, "case", true)?;
            let use_regex = args.boolean(3, "regex", true)?;
            let source = if use_regex {
                pattern
            } else {
                regex::escape(&pattern)
            };
            let matcher = RegexBuilder::new(&source)
                .case_insensitive(!case)
                .size_limit(1 << 20)
                .build()
                .map_err(|e| EvalError::mismatch(format!("invalid pattern: {e}")))?;
            Ok(test_text(&|s| matcher.is_match(s)))
        }
        "startswith" | "endswith" => {
            args.check("str", name, &["pat"])?;
            let prefixes: Vec<String> = match args.required(0, "pat")? {
                Value::Scalar(Scalar::Str(s)) => vec![s.clone()],
                Value::List(items) | Value::Tuple(items) => string_list(items)?,
                other => {
                    return Err(EvalError::mismatch(format!(
                        "expected a string or tuple, not {}",
                        other.type_name()
                    )))
                }
            };
            let starts = name == "startswith";
            Ok(test_text(&|s| {
                prefixes
                    .iter()
                    .any(|p| if starts { s.starts_with(p.as_str()) } else { s.ends_with(p.as_str()) })
            }))
        }
        "lower" => {
            args.check("str", name, &[])?;
            Ok(map_text(&|s| s.to_lowercase()))
        }
        "upper" => {
            args.check("str", name, &[])?;
            Ok(map_text(&|s| s.to_uppercase()))
        }
        "strip" => {
            args.check("str", name, &[])?;
            Ok(map_text(&|s| s.trim().to_string()))
        }
        "title" => {
            args.check("str", name, &[])?;
            Ok(map_text(&title_case))
        }
        "replace" => {
            args.check("str", name, &["pat", "repl", "regex"])?;
            let pattern = args.string(0, "pat")?.unwrap_or_default();
            let replacement = args.string(1, "repl")?.unwrap_or_default();
            if args.boolean(2, "regex", false)? {
                let matcher = RegexBuilder::new(&pattern)
                    .size_limit(1 << 20)
                    .build()
                    .map_err(|e| EvalError::mismatch(format!("invalid pattern: {e}")))?;
                try_map_text(&|s| replace_pattern(s, &matcher, &replacement))
            } else {
                try_map_text(&|s| replace_literal(s, &pattern, &replacement))
            }
        }
        "len" => {
            args.check("str", name, &[])?;
            let values = series
                .values
                .iter()
                .map(|value| match value {
                    Scalar::Str(s) => Some(s.chars().count() as i64),
                    _ => None,
                })
                .collect::<Vec<_>>();
            Ok(Value::Series(series.map_values(Column::Int64(values.into()))))
        }
        _ => Err(EvalError::unsupported(format!("str.{name}() is not supported"))),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn list_method(items: Vec<Scalar>, name: &str, args: Args) -> EvalResult<Value> {
    match name {
        "tolist" | "to_list" | "copy" => {
            args.check("list", name, &[])?;
            Ok(Value::List(items))
        }
        "count" => {
            args.check("list", name, &["value"])?;
            let wanted = args.scalar(0, "value")?;
            Ok(Value::Scalar(Scalar::Int(
                items.iter().filter(|item| **item == wanted).count() as i64,
            )))
        }
        "index" => {
            args.check("list", name, &["value"])?;
            let wanted = args.scalar(0, "value")?;
            items
                .iter()
                .position(|item| *item == wanted)
                .map(|at| Value::Scalar(Scalar::Int(at as i64)))
                .ok_or_else(|| EvalError::mismatch(format!("{} is not in list", wanted.repr())))
        }
        _ => Err(EvalError::unsupported(format!("list.{name}() is not supported"))),
    }
}

fn scalar_method(value: Scalar, name: &str, args: Args) -> EvalResult<Value> {
    let owner = value.type_name();
    match (&value, name) {
        (_, "item") => {
            args.check(owner, name, &[])?;
            Ok(Value::Scalar(value))
        }
        (Scalar::Int(_) | Scalar::Float(_) | Scalar::Bool(_) | Scalar::Null, "round") => {
            args.check(owner, name, &["decimals"])?;
            let decimals = args.int(0, "decimals", 0)?;
            Ok(Value::Scalar(match value {
                Scalar::Float(v) => Scalar::Float(round_float(v, decimals)),
                other => round_scalar(&other, Some(decimals))?,
            }))
        }
        (Scalar::Str(s), "lower") => Ok(Value::Scalar(Scalar::Str(s.to_lowercase()))),
        (Scalar::Str(s), "upper") => Ok(Value::Scalar(Scalar::Str(s.to_uppercase()))),
        (Scalar::Str(s), "strip") => Ok(Value::Scalar(Scalar::Str(s.trim().to_string()))),
        (Scalar::Str(s), "title") => Ok(Value::Scalar(Scalar::Str(title_case(s)))),
        (Scalar::Str(s), "startswith" | "endswith") => {
            args.check(owner, name, &["prefix"])?;
            let affix = args
                .string(0, "prefix")?
                .ok_or_else(|| EvalError::mismatch(format!("{name}() needs a string")))?;
            let hit = if name == "startswith" {
                s.starts_with(&affix)
            } else {
                s.ends_with(&affix)
            };
            Ok(Value::Scalar(Scalar::Bool(hit)))
        }
        (Scalar::Str(s), "replace") => {
            args.check(owner, name, &["old", "new"])?;
            let old = args.string(0, "old")?.unwrap_or_default();
            let new = args.string(1, "new")?.unwrap_or_default();
            Ok(Value::Scalar(Scalar::Str(replace_literal(&s, &old, &new)?)))
        }
        _ => Err(EvalError::unsupported(format!(
            "'{owner}' object has no method '{name}'"
        ))),
    }
}

pub fn call_builtin(name: &str, args: Args) -> EvalResult<Value> {
    match name {
        "len" => {
            args.check("builtins", name, &["obj"])?;
            let len = match args.required(0, "obj")? {
                Value::Frame(frame) => frame.row_count(),
                Value::Series(series) | Value::StrAccessor(series) => series.len(),
                Value::List(items) | Value::Tuple(items) => items.len(),
                Value::Scalar(Scalar::Str(s)) => s.chars().count(),
                Value::GroupBy(group) => ops::group_indices(group.frame.column(&group.key)?).len(),
                other => {
                    return Err(EvalError::mismatch(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Scalar(Scalar::Int(len as i64)))
        }
        "round" => {
            args.check("builtins", name, &["number", "ndigits"])?;
            let digits = match args.get(1, "ndigits") {
                None | Some(Value::Scalar(Scalar::Null)) => None,
                Some(_) => Some(args.int(1, "ndigits", 0)?),
            };
            match args.required(0, "number")? {
                Value::Scalar(scalar) => Ok(Value::Scalar(round_scalar(scalar, digits)?)),
                Value::Series(series) => round_series(series, digits),
                other => Err(EvalError::mismatch(format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ))),
            }
        }
        "abs" => {
            args.check("builtins", name, &["x"])?;
            match args.required(0, "x")? {
                Value::Scalar(scalar) => Ok(Value::Scalar(abs_scalar(scalar)?)),
                Value::Series(series) => abs_series(series),
                other => Err(EvalError::mismatch(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "sum" => {
            args.check("builtins", name, &["iterable"])?;
            match args.required(0, "iterable")? {
                Value::Series(series) => Ok(Value::Scalar(ops::aggregate(
                    &series.values,
                    AggregateFunction::Sum,
                    None,
                )?)),
                Value::List(items) | Value::Tuple(items) => items
                    .iter()
                    .try_fold(Scalar::Int(0), |acc, item| {
                        scalar_binary(BinaryOp::Add, &acc, item, false)
                    })
                    .map(Value::Scalar),
                other => Err(EvalError::mismatch(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                ))),
            }
        }
        "min" | "max" => {
            let wanted = if name == "max" {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let items: Vec<Scalar> = if args.positional.len() > 1 {
                args.positional
                    .iter()
                    .cloned()
                    .map(scalar_of)
                    .collect::<EvalResult<_>>()?
            } else {
                args.check("builtins", name, &["iterable"])?;
                iterable(args.required(0, "iterable")?)?
            };
            let mut best: Option<Scalar> = None;
            for item in items.into_iter().filter(|item| !item.is_null()) {
                best = match best {
                    None => Some(item),
                    Some(current) => {
                        if item.partial_compare(&current).is_none() {
                            return Err(EvalError::mismatch(format!(
                                "'{}' not supported between instances of '{}' and '{}'",
                                if name == "max" { ">" } else { "<" },
                                item.type_name(),
                                current.type_name()
                            )));
                        }
                        Some(if item.sort_compare(&current) == wanted { item } else { current })
                    }
                };
            }
            best.map(Value::Scalar)
                .ok_or_else(|| EvalError::mismatch(format!("{name}() arg is an empty sequence")))
        }
        "int" | "float" | "str" | "bool" => {
            args.check("builtins", name, &["x"])?;
            match args.required(0, "x")? {
                Value::Scalar(scalar) if name == "str" => Ok(Value::Scalar(Scalar::Str(scalar.to_string()))),
                Value::Scalar(scalar) => {
                    if scalar.is_null() && name != "bool" {
                        return Err(EvalError::mismatch(format!(
                            "{name}() argument must be a string or a number, not 'NoneType'"
                        )));
                    }
                    Ok(Value::Scalar(convert_scalar(scalar, name)?))
                }
                other if name == "str" => Ok(Value::Scalar(Scalar::Str(other.render()))),
                other => Err(EvalError::mismatch(format!(
                    "{name}() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "list" => {
            args.check("builtins", name, &["iterable"])?;
            Ok(Value::List(iterable(args.required(0, "iterable")?)?))
        }
        "sorted" => {
            args.check("builtins", name, &["iterable", "reverse"])?;
            let mut items = iterable(args.required(0, "iterable")?)?;
            items.sort_by(|a, b| a.sort_compare(b));
            if args.boolean(1, "reverse", false)? {
                items.reverse();
            }
            Ok(Value::List(items))
        }
        "print" => {
            args.check("builtins", name, &["value"])?;
            Ok(args.required(0, "value")?.clone())
        }
        _ => Err(EvalError::UnknownName(name.to_string())),
    }
}

fn iterable(value: &Value) -> EvalResult<Vec<Scalar>> {
    match value {
        Value::Series(series) => Ok(series.values.iter().collect()),
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Frame(frame) => Ok(frame
            .column_names()
            .iter()
            .map(|name| Scalar::Str(name.clone()))
            .collect()),
        Value::Scalar(Scalar::Str(s)) => Ok(s.chars().map(|c| Scalar::Str(c.to_string())).collect()),
        other => Err(EvalError::mismatch(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn replace_literal(text: &str, pattern: &str, replacement: &str) -> EvalResult<String> {
    replace_bounded(
        text,
        text.match_indices(pattern),
        |(at, hit)| *at..*at + hit.len(),
        |_, out| {
            out.push_str(replacement);
            Ok(())
        },
    )
}

fn replace_pattern(text: &str, matcher: &regex::Regex, replacement: &str) -> EvalResult<String> {
    let limit = text_limit(text.len());
    let references = replacement.matches('$').count();
    replace_bounded(
        text,
        matcher.captures_iter(text),
        |caps| caps.get(0).map_or(0..0, |m| m.range()),
        |caps, out| {
            let matched = caps.get(0).map_or(0, |m| m.len());
            let bound = out
                .len()
                .saturating_add(replacement.len())
                .saturating_add(references.saturating_mul(matched));
            if bound > limit {
                return Err(text_too_long(bound));
            }
            caps.expand(replacement, out);
            Ok(())
        },
    )
}

/// Splices replacements into `text`, failing as soon as the output passes the
/// text limit. An empty pattern matches at every character boundary.
fn replace_bounded<M>(
    text: &str,
    matches: impl Iterator<Item = M>,
    span: impl Fn(&M) -> Range<usize>,
    mut expand: impl FnMut(&M, &mut String) -> EvalResult<()>,
) -> EvalResult<String> {
    let limit = text_limit(text.len());
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for hit in matches {
        let range = span(&hit);
        out.push_str(&text[last..range.start]);
        expand(&hit, &mut out)?;
        last = range.end;
        if out.len() > limit {
            return Err(text_too_long(out.len()));
        }
    }
    out.push_str(&text[last..]);
    if out.len() > limit {
        return Err(text_too_long(out.len()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::eval::MAX_TEXT_BYTES;

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_scalar(&Scalar::Float(2.5), None).unwrap(), Scalar::Int(2));
        assert_eq!(round_scalar(&Scalar::Float(3.5), None).unwrap(), Scalar::Int(4));
        assert_eq!(round_scalar(&Scalar::Float(1.2345), Some(2)).unwrap(), Scalar::Float(1.23));
        assert_eq!(round_scalar(&Scalar::Int(1234), Some(-2)).unwrap(), Scalar::Int(1200));
    }

    #[test]
    fn head_window_handles_negative_counts() {
        assert_eq!(row_window(5, 2, true), vec![0, 1]);
        assert_eq!(row_window(5, -2, true), vec![0, 1, 2]);
        assert_eq!(row_window(5, 2, false), vec![3, 4]);
        assert_eq!(row_window(3, 10, false), vec![0, 1, 2]);
    }

    #[test]
    fn unknown_keyword_is_unsupported() {
        let args = Args::new(vec![], vec![("inplace".into(), Value::Scalar(Scalar::Bool(true)))]);
        let err = args.check("DataFrame", "sort_values", &["by", "ascending"]).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
    }

    #[test]
    fn empty_pattern_replace_matches_python() {
        assert_eq!(replace_literal("abc", "", "-").unwrap(), "-a-b-c-");
        assert_eq!(replace_literal("a.b", ".", "::").unwrap(), "a::b");
    }

    #[test]
    fn replace_cannot_multiply_long_text() {
        let long = "a".repeat(MAX_TEXT_BYTES);
        let err = replace_literal(&long, "", &long).unwrap_err();
        assert_eq!(err.kind(), "unsupported");

        let matcher = regex::Regex::new("a").unwrap();
        let err = replace_pattern(&long, &matcher, "$0$0").unwrap_err();
        assert_eq!(err.kind(), "unsupported");
        assert_eq!(replace_pattern("cat", &matcher, "[$0]").unwrap(), "c[a]t");
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("new york-city"), "New York-City");
    }
}
