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

use crate::column::ColumnBuilder;
use crate::dataset::{Dataset, DatasetMetadata};
use crate::error::{DataError, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

const MAX_FIELD_SIZE: usize = 1024 * 1024;
const MAX_FIELDS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CsvReader {
    delimiter: u8,
    quote_char: u8,
    max_field_size: usize,
    max_fields: usize,
}

impl CsvReader {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
            max_field_size: MAX_FIELD_SIZE,
            max_fields: MAX_FIELDS,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_limits(mut self, max_field_size: usize, max_fields: usize) -> Self {
        self.max_field_size = max_field_size;
        self.max_fields = max_fields;
        self
    }

    pub fn read_path(&self, path: &Path) -> Result<Dataset> {
        let file = File::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let mut dataset = self.read_from(BufReader::new(file), &name)?;
        dataset.metadata.source = Some(path.display().to_string());
        Ok(dataset)
    }

    pub fn read_bytes(&self, bytes: &[u8], name: &str) -> Result<Dataset> {
        self.read_from(bytes, name)
    }

    pub fn read_from<R: Read>(&self, input: R, name: &str) -> Result<Dataset> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote_char)
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut records = reader.records();
        let header_record = match records.next() {
            Some(record) => record?,
            None => return Err(DataError::NoColumns),
        };
        let headers = normalize_headers(header_record.iter());
        if headers.is_empty() {
            return Err(DataError::NoColumns);
        }
        if headers.len() > self.max_fields {
            return Err(DataError::SizeLimit(format!(
                "Column count {} exceeds limit {}",
                headers.len(),
                self.max_fields
            )));
        }

        let mut builders: Vec<ColumnBuilder> = headers
            .iter()
            .map(|_| ColumnBuilder::new().with_max_field_bytes(self.max_field_size))
            .collect();
        let mut row_count = 0usize;
        for record in records {
            let record = record?;
            if record.len() > headers.len() {
                let line = record.position().map_or(0, |p| p.line());
                return Err(DataError::RaggedRow {
                    line,
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            for (i, builder) in builders.iter_mut().enumerate() {
                let cell = record.get(i).map(|s| s.trim().to_string());
                builder.push(cell)?;
            }
            row_count += 1;
        }

        let mut dataset = Dataset::new(DatasetMetadata::named(name));
        for (header, builder) in headers.into_iter().zip(builders) {
            dataset.add_column(header, builder.build()?)?;
        }
        dataset.metadata.row_count = row_count;
        debug!(
            rows = row_count,
            columns = dataset.column_count(),
            "parsed CSV input"
        );
        Ok(dataset)
    }
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills blank header names and disambiguates repeats with `.1`, `.2`, ...
fn normalize_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for (i, name) in raw.enumerate() {
        let name = name.trim_start_matches('\u{feff}').trim();
        let base = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        headers.push(candidate);
    }
    if headers.len() == 1 && headers[0] == "Unnamed: 0" {
        // A blank first line carries no column names at all.
        headers.clear();
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DataType;
    use crate::scalar::Scalar;

    #[test]
    fn headers_are_filled_and_deduplicated() {
        let headers = normalize_headers(["a", "", "a", "a"].into_iter());
        assert_eq!(headers, vec!["a", "Unnamed: 1", "a.1", "a.2"]);
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let csv = "id,name,score\n1,ann,3.5\n2,bob\n";
        let ds = CsvReader::new().read_bytes(csv.as_bytes(), "t").unwrap();
        assert_eq!(ds.row_count(), 2);
        let score = ds.column("score").unwrap();
        assert_eq!(score.data_type(), DataType::Float64);
        assert_eq!(score.get(1), Scalar::Null);
    }

    #[test]
    fn long_rows_are_rejected() {
        let csv = "a,b\n1,2\n3,4,5\n";
        let err = CsvReader::new().read_bytes(csv.as_bytes(), "t").unwrap_err();
        assert!(matches!(err, DataError::RaggedRow { expected: 2, found: 3, .. }));
    }

    #[test]
    fn empty_input_has_no_columns() {
        let err = CsvReader::new().read_bytes(b"", "t").unwrap_err();
        assert!(matches!(err, DataError::NoColumns));
    }

    #[test]
    fn header_only_file_gives_empty_columns() {
        let ds = CsvReader::new().read_bytes(b"x,y\n", "t").unwrap();
        assert_eq!(ds.column_count(), 2);
        assert_eq!(ds.row_count(), 0);
    }

    #[test]
    fn custom_delimiter() {
        let ds = CsvReader::new()
            .with_delimiter(b';')
            .read_bytes(b"a;b\n1;true\n", "t")
            .unwrap();
        assert_eq!(ds.column("b").unwrap().data_type(), DataType::Boolean);
    }
}
