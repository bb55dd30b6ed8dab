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

use crate::session::Session;
use serde::Serialize;
use std::path::Path;
use tabula::{CsvReader, Dataset, Preview, DEFAULT_PREVIEW_ROWS};
use tracing::{info, warn};

pub const LOADED: &str = "File loaded successfully!";
pub const NO_FILE: &str = "Please upload a CSV file to analyse.";
pub const RESET: &str = "The application was reset. Please upload a new CSV file.";

/// What the page shows after an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadOutcome {
    pub status: String,
    pub preview: Preview,
    pub loaded: bool,
}

impl LoadOutcome {
    fn unchanged(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            preview: Preview::empty(),
            loaded: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetLoader {
    reader: CsvReader,
    preview_rows: usize,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new(CsvReader::new())
    }
}

impl DatasetLoader {
    pub fn new(reader: CsvReader) -> Self {
        Self {
            reader,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }

    pub fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.preview_rows = preview_rows;
        self
    }

    /// Loads uploaded bytes. An absent or zero-length upload counts as no file.
    pub fn load_bytes(&self, session: &mut Session, bytes: Option<&[u8]>, name: &str) -> LoadOutcome {
        match bytes {
            Some(bytes) if !bytes.is_empty() => {
                self.apply(session, self.reader.read_bytes(bytes, name), name)
            }
            _ => LoadOutcome::unchanged(NO_FILE),
        }
    }

    pub fn load_path(&self, session: &mut Session, path: Option<&Path>) -> LoadOutcome {
        match path {
            Some(path) if !path.as_os_str().is_empty() => {
                let name = path.display().to_string();
                self.apply(session, self.reader.read_path(path), &name)
            }
            _ => LoadOutcome::unchanged(NO_FILE),
        }
    }

    fn apply(&self, session: &mut Session, loaded: tabula::Result<Dataset>, name: &str) -> LoadOutcome {
        match loaded {
            Ok(dataset) => {
                info!(
                    source = name,
                    rows = dataset.row_count(),
                    columns = dataset.column_count(),
                    "dataset loaded"
                );
                let preview = dataset.preview(self.preview_rows);
                session.set_dataset(dataset);
                LoadOutcome {
                    status: LOADED.to_string(),
                    preview,
                    loaded: true,
                }
            }
            Err(e) => {
                warn!(source = name, error = %e, "dataset rejected");
                LoadOutcome::unchanged(format!("Error loading file: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_upload_replaces_dataset() {
        let loader = DatasetLoader::default();
        let mut session = Session::new();
        let outcome = loader.load_bytes(&mut session, Some(b"age,name\n31,ann\n"), "people.csv");
        assert_eq!(outcome.status, LOADED);
        assert_eq!(outcome.preview.columns, vec!["age", "name"]);
        assert!(session.has_dataset());
    }

    #[test]
    fn missing_file_keeps_previous_dataset() {
        let loader = DatasetLoader::default();
        let mut session = Session::new();
        loader.load_bytes(&mut session, Some(b"a\n1\n"), "first.csv");

        let outcome = loader.load_bytes(&mut session, Some(b""), "empty.csv");
        assert_eq!(outcome.status, NO_FILE);
        assert!(outcome.preview.is_empty());
        assert_eq!(session.dataset().map(|d| d.column_names().to_vec()), Some(vec!["a".to_string()]));

        let outcome = loader.load_bytes(&mut session, None, "");
        assert_eq!(outcome.status, NO_FILE);
    }

    #[test]
    fn malformed_file_reports_the_reason() {
        let loader = DatasetLoader::default();
        let mut session = Session::new();
        loader.load_bytes(&mut session, Some(b"a\n1\n"), "first.csv");

        let outcome = loader.load_bytes(&mut session, Some(b"a,b\n1,2,3\n"), "bad.csv");
        assert!(outcome.status.starts_with("Error loading file: "));
        assert!(!outcome.loaded);
        assert_eq!(session.dataset().map(|d| d.column_count()), Some(1));
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let loader = DatasetLoader::default();
        let mut session = Session::new();
        let outcome = loader.load_path(&mut session, Some(Path::new("/nonexistent/data.csv")));
        assert!(outcome.status.starts_with("Error loading file: "));
        assert!(!session.has_dataset());
    }
}
