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
use crate::scalar::Scalar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Std,
    Var,
    Nunique,
}

impl AggregateFunction {
    pub fn from_method(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "min" => Self::Min,
            "max" => Self::Max,
            "median" => Self::Median,
            "std" => Self::Std,
            "var" => Self::Var,
            "nunique" => Self::Nunique,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::Var => "var",
            Self::Nunique => "nunique",
        }
    }

    /// Whether the function only makes sense on numeric data.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, Self::Sum | Self::Mean | Self::Median | Self::Std | Self::Var)
    }
}

/// Aggregates the whole column, or only `indices` when given. Nulls are skipped.
pub fn aggregate(column: &Column, function: AggregateFunction, indices: Option<&[usize]>) -> Result<Scalar> {
    let rows: Vec<usize> = match indices {
        Some(indices) => indices.to_vec(),
        None => (0..column.len()).collect(),
    };
    let present: Vec<Scalar> = rows
        .par_iter()
        .map(|&i| column.get(i))
        .filter(|v| !v.is_null())
        .collect();

    if function.requires_numeric() && !column.data_type().is_numeric() {
        return Err(DataError::TypeMismatch(format!(
            "cannot compute {} of a text column",
            function.name()
        )));
    }

    Ok(match function {
        AggregateFunction::Count => Scalar::Int(present.len() as i64),
        AggregateFunction::Nunique => {
            let distinct: std::collections::HashSet<String> =
                present.iter().map(Scalar::repr).collect();
            Scalar::Int(distinct.len() as i64)
        }
        AggregateFunction::Sum => match column {
            Column::Float64(_) => Scalar::Float(present.iter().filter_map(Scalar::as_f64).sum()),
            _ => Scalar::Int(present.iter().filter_map(Scalar::as_i64).sum()),
        },
        AggregateFunction::Mean => {
            let values = numeric(&present);
            if values.is_empty() {
                Scalar::Null
            } else {
                Scalar::Float(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggregateFunction::Median => median(numeric(&present)).map_or(Scalar::Null, Scalar::Float),
        AggregateFunction::Var => variance(&numeric(&present)).map_or(Scalar::Null, Scalar::Float),
        AggregateFunction::Std => variance(&numeric(&present))
            .map_or(Scalar::Null, |v| Scalar::Float(v.sqrt())),
        AggregateFunction::Min => extreme(present, Ordering::Less),
        AggregateFunction::Max => extreme(present, Ordering::Greater),
    })
}

fn numeric(values: &[Scalar]) -> Vec<f64> {
    values.iter().filter_map(Scalar::as_f64).collect()
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Sample variance (one degree of freedom).
fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some(squares / (values.len() - 1) as f64)
}

fn extreme(values: Vec<Scalar>, wanted: Ordering) -> Scalar {
    values
        .into_iter()
        .reduce(|best, next| {
            if next.sort_compare(&best) == wanted {
                next
            } else {
                best
            }
        })
        .unwrap_or(Scalar::Null)
}

/// Quantile with linear interpolation between the closest ranks.
pub fn quantile(column: &Column, q: f64) -> Result<Scalar> {
    if !(0.0..=1.0).contains(&q) {
        return Err(DataError::Parse(format!("quantile {q} is outside [0, 1]")));
    }
    if !column.data_type().is_numeric() {
        return Err(DataError::TypeMismatch(
            "cannot compute quantile of a text column".to_string(),
        ));
    }
    let mut values: Vec<f64> = (0..column.len()).filter_map(|i| column.to_f64(i)).collect();
    if values.is_empty() {
        return Ok(Scalar::Null);
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let position = q * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Ok(Scalar::Float(
        values[lower] + (values[upper] - values[lower]) * fraction,
    ))
}

/// Stable row order for the given sort keys. Nulls sort last in both directions.
pub fn sort_indices(keys: &[&Column], row_count: usize, ascending: bool) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..row_count).collect();
    indices.sort_by(|&a, &b| {
        for key in keys {
            let (left, right) = (key.get(a), key.get(b));
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ if ascending => left.sort_compare(&right),
                _ => right.sort_compare(&left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    indices
}

/// Row positions per distinct key, keys in sorted order. Null keys are dropped.
pub fn group_indices(column: &Column) -> Vec<(Scalar, Vec<usize>)> {
    let mut groups: HashMap<String, (Scalar, Vec<usize>)> = HashMap::new();
    for (row, key) in column.iter().enumerate() {
        if key.is_null() {
            continue;
        }
        groups
            .entry(key.repr())
            .or_insert_with(|| (key.clone(), Vec::new()))
            .1
            .push(row);
    }
    let mut groups: Vec<(Scalar, Vec<usize>)> = groups.into_values().collect();
    groups.sort_by(|a, b| a.0.sort_compare(&b.0));
    groups
}

/// Occurrences per distinct non-null value, most frequent first; ties keep first-seen order.
pub fn value_counts(column: &Column) -> Vec<(Scalar, usize)> {
    let mut order: Vec<(Scalar, usize)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for value in column.iter().filter(|v| !v.is_null()) {
        match positions.get(&value.repr()) {
            Some(&at) => order[at].1 += 1,
            None => {
                positions.insert(value.repr(), order.len());
                order.push((value, 1));
            }
        }
    }
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[Option<i64>]) -> Column {
        Column::Int64(values.to_vec().into())
    }

    #[test]
    fn aggregates_skip_nulls() {
        let column = ints(&[Some(1), None, Some(3), Some(4)]);
        assert_eq!(aggregate(&column, AggregateFunction::Count, None).unwrap(), Scalar::Int(3));
        assert_eq!(aggregate(&column, AggregateFunction::Sum, None).unwrap(), Scalar::Int(8));
        assert_eq!(
            aggregate(&column, AggregateFunction::Median, None).unwrap(),
            Scalar::Float(3.0)
        );
        assert_eq!(aggregate(&column, AggregateFunction::Max, None).unwrap(), Scalar::Int(4));
        assert_eq!(
            aggregate(&column, AggregateFunction::Mean, Some(&[0, 2])).unwrap(),
            Scalar::Float(2.0)
        );
    }

    #[test]
    fn variance_needs_two_values() {
        let column = ints(&[Some(2), Some(4), Some(4), Some(4), Some(5), Some(5), Some(7), Some(9)]);
        let var = aggregate(&column, AggregateFunction::Var, None).unwrap();
        assert!((var.as_f64().unwrap() - 4.571428571428571).abs() < 1e-12);
        let single = ints(&[Some(1)]);
        assert_eq!(aggregate(&single, AggregateFunction::Std, None).unwrap(), Scalar::Null);
    }

    #[test]
    fn numeric_aggregate_on_text_is_type_mismatch() {
        let column = Column::from_scalars(vec!["a".into(), "b".into()]);
        assert!(matches!(
            aggregate(&column, AggregateFunction::Mean, None),
            Err(DataError::TypeMismatch(_))
        ));
        assert_eq!(
            aggregate(&column, AggregateFunction::Min, None).unwrap(),
            Scalar::Str("a".into())
        );
    }

    #[test]
    fn quantile_interpolates() {
        let column = ints(&[Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(quantile(&column, 0.25).unwrap(), Scalar::Float(1.75));
        assert_eq!(quantile(&column, 1.0).unwrap(), Scalar::Float(4.0));
        assert!(quantile(&column, 1.5).is_err());
    }

    #[test]
    fn descending_sort_still_puts_nulls_last() {
        let column = ints(&[Some(1), None, Some(3)]);
        assert_eq!(sort_indices(&[&column], 3, false), vec![2, 0, 1]);
    }

    #[test]
    fn groups_are_sorted_and_drop_nulls() {
        let column = Column::from_scalars(vec!["b".into(), "a".into(), Scalar::Null, "b".into()]);
        let groups = group_indices(&column);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (Scalar::Str("a".into()), vec![1]));
        assert_eq!(groups[1], (Scalar::Str("b".into()), vec![0, 3]));
    }

    #[test]
    fn value_counts_order_by_frequency() {
        let column = Column::from_scalars(vec!["x".into(), "y".into(), "y".into(), "z".into()]);
        let counts = value_counts(&column);
        assert_eq!(counts[0], (Scalar::Str("y".into()), 2));
        assert_eq!(counts[1], (Scalar::Str("x".into()), 1));
    }
}
