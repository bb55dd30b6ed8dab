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

//! Text renderings of a dataset, used in prompts and evaluation results.

use crate::dataset::Dataset;

pub const COLUMNS_HEADING: &str = "Here are the details of the DataFrame columns:";

/// One line per column, `` `name`:dtype ``, under a fixed heading.
/// A dataset without columns describes as the empty string.
pub fn describe_columns(dataset: &Dataset) -> String {
    if dataset.is_empty() {
        return String::new();
    }
    let mut out = String::from(COLUMNS_HEADING);
    for name in dataset.column_names() {
        if let Some(column) = dataset.get_column(name) {
            out.push_str(&format!("\n`{name}`:{}", column.data_type().dtype_name()));
        }
    }
    out
}

/// First `n` rows as an aligned table.
pub fn head_text(dataset: &Dataset, n: usize) -> String {
    render_rows(dataset, n, false)
}

/// Aligned table capped at `max_rows`, with a trailer counting the rows left out.
pub fn render_table(dataset: &Dataset, max_rows: usize) -> String {
    render_rows(dataset, max_rows, true)
}

fn render_rows(dataset: &Dataset, limit: usize, with_trailer: bool) -> String {
    if dataset.is_empty() {
        return "Empty DataFrame\nColumns: []\nIndex: []".to_string();
    }
    if dataset.row_count() == 0 {
        return format!(
            "Empty DataFrame\nColumns: [{}]\nIndex: []",
            dataset.column_names().join(", ")
        );
    }

    let shown = limit.min(dataset.row_count());
    let mut grid: Vec<Vec<String>> = Vec::with_capacity(shown + 1);
    let mut header = vec![String::new()];
    header.extend(dataset.column_names().iter().cloned());
    grid.push(header);
    for row in 0..shown {
        let mut line = vec![dataset.label(row)];
        line.extend(dataset.row(row).iter().map(|cell| cell.to_string()));
        grid.push(line);
    }

    let widths: Vec<usize> = (0..grid[0].len())
        .map(|col| grid.iter().map(|line| line[col].chars().count()).max().unwrap_or(0))
        .collect();

    let mut lines: Vec<String> = grid
        .iter()
        .map(|line| {
            line.iter()
                .enumerate()
                .map(|(col, cell)| {
                    if col == 0 {
                        format!("{cell:<width$}", width = widths[col])
                    } else {
                        format!("{cell:>width$}", width = widths[col])
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect();

    let hidden = dataset.row_count() - shown;
    if with_trailer && hidden > 0 {
        lines.push(format!("... ({hidden} more rows)"));
    }
    lines.join("\n")
}
