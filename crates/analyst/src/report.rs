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

//! PDF export of the question/answer history.

use crate::error::{AnalystError, AnalystResult};
use crate::history::QaRecord;
use chrono::{DateTime, Local};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::info;

pub const EMPTY_HISTORY: &str = "There is no data to generate the PDF.";
pub const FILE_PREFIX: &str = "relatorio_perguntas_respostas_";
const TIMESTAMP_DIGITS: usize = 14;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const LINE_HEIGHT: f32 = 8.0;
const GAP_AFTER_QUESTION: f32 = 2.0;
const GAP_AFTER_ANSWER: f32 = 6.0;
const QUESTION_SIZE: f32 = 14.0;
const ANSWER_SIZE: f32 = 12.0;
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph advance as a fraction of the font size.
const REGULAR_ADVANCE: f32 = 0.5;
const BOLD_ADVANCE: f32 = 0.55;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    Empty { message: String },
    Written { path: PathBuf, file_name: String },
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writer rooted in a per-session subdirectory, so concurrent sessions never
    /// share a file. `session_id` must be a single plain path component.
    pub fn for_session(&self, session_id: &str) -> Option<Self> {
        let mut parts = Path::new(session_id).components();
        match (parts.next(), parts.next()) {
            (Some(Component::Normal(_)), None) => Some(Self::new(self.output_dir.join(session_id))),
            _ => None,
        }
    }

    pub fn file_name_at(at: DateTime<Local>) -> String {
        format!("{FILE_PREFIX}{}.pdf", at.format("%Y%m%d%H%M%S"))
    }

    /// Only names this writer could have produced are served back.
    pub fn is_report_file_name(name: &str) -> bool {
        name.strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(".pdf"))
            .is_some_and(|stamp| {
                stamp.len() == TIMESTAMP_DIGITS && stamp.bytes().all(|b| b.is_ascii_digit())
            })
    }

    /// Resolves a served file name inside the output directory.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        Self::is_report_file_name(name).then(|| self.output_dir.join(name))
    }

    pub fn write(&self, records: &[QaRecord]) -> AnalystResult<ReportOutcome> {
        if records.is_empty() {
            return Ok(ReportOutcome::Empty {
                message: EMPTY_HISTORY.to_string(),
            });
        }
        std::fs::create_dir_all(&self.output_dir)?;
        let file_name = Self::file_name_at(Local::now());
        let path = self.output_dir.join(&file_name);

        let doc = render(records)?;
        let mut out = BufWriter::new(File::create(&path)?);
        doc.save(&mut out).map_err(pdf_error)?;
        out.flush()?;

        info!(path = %path.display(), records = records.len(), "report written");
        Ok(ReportOutcome::Written { path, file_name })
    }

    /// Same as [`write`](Self::write), off the async worker threads.
    pub async fn write_async(&self, records: Vec<QaRecord>) -> AnalystResult<ReportOutcome> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write(&records))
            .await
            .map_err(|e| AnalystError::Report(format!("report task failed: {e}")))?
    }
}

fn pdf_error(e: printpdf::Error) -> AnalystError {
    AnalystError::Report(e.to_string())
}

/// Tracks the write position and breaks pages at the bottom margin.
struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl Cursor<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        if self.y - LINE_HEIGHT < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
        self.y -= LINE_HEIGHT;
        self.layer
            .use_text(text, size, Mm(MARGIN), Mm(self.y + LINE_HEIGHT * 0.25), font);
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }
}

fn render(records: &[QaRecord]) -> AnalystResult<PdfDocumentReference> {
    let (doc, page, layer) = PdfDocument::new(
        "Questions and answers",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;

    let text_width = PAGE_WIDTH - 2.0 * MARGIN;
    let question_chars = chars_per_line(text_width, QUESTION_SIZE, BOLD_ADVANCE);
    let answer_chars = chars_per_line(text_width, ANSWER_SIZE, REGULAR_ADVANCE);

    let mut cursor = Cursor {
        layer: doc.get_page(page).get_layer(layer),
        doc: &doc,
        y: PAGE_HEIGHT - MARGIN,
    };
    for record in records {
        for line in wrap(&record.question, question_chars) {
            cursor.line(&line, QUESTION_SIZE, &bold);
        }
        cursor.gap(GAP_AFTER_QUESTION);
        for line in wrap(&record.answer, answer_chars) {
            cursor.line(&line, ANSWER_SIZE, &regular);
        }
        cursor.gap(GAP_AFTER_ANSWER);
    }
    Ok(doc)
}

fn chars_per_line(width_mm: f32, size_pt: f32, advance: f32) -> usize {
    ((width_mm / (size_pt * PT_TO_MM * advance)).floor() as usize).max(1)
}

/// Greedy word wrap; explicit newlines are kept and over-long words are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > width && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(question: &str, answer: &str) -> QaRecord {
        QaRecord {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn empty_history_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ReportWriter::new(dir.path()).write(&[]).unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::Empty {
                message: EMPTY_HISTORY.to_string()
            }
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn report_is_written_with_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record("How many rows are there?", "There are 2 rows. The code used was len(df)"),
            record("Oldest?", &"ann is the oldest. ".repeat(200)),
        ];
        let outcome = ReportWriter::new(dir.path()).write(&records).unwrap();
        let ReportOutcome::Written { path, file_name } = outcome else {
            panic!("expected a written report");
        };
        assert!(ReportWriter::is_report_file_name(&file_name));
        assert!(path.starts_with(dir.path()));
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn sessions_writing_together_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = ReportWriter::new(dir.path());
        let first = root.for_session("first").unwrap();
        let second = root.for_session("second").unwrap();

        let ReportOutcome::Written { path: a, .. } = first.write(&[record("Rows?", "Two.")]).unwrap() else {
            panic!("expected a written report");
        };
        let ReportOutcome::Written { path: b, .. } = second.write(&[record("Mean age?", "19.")]).unwrap()
        else {
            panic!("expected a written report");
        };
        assert_ne!(a, b);
        assert!(a.starts_with(dir.path().join("first")));
        assert!(b.starts_with(dir.path().join("second")));
        assert!(a.exists() && b.exists());
        assert_eq!(std::fs::read_dir(first.output_dir()).unwrap().count(), 1);
    }

    #[test]
    fn session_directories_must_be_plain_names() {
        let root = ReportWriter::new("/tmp/reports");
        assert!(root.for_session("../other").is_none());
        assert!(root.for_session("a/b").is_none());
        assert!(root.for_session("").is_none());
        assert_eq!(
            root.for_session("abc").unwrap().output_dir(),
            Path::new("/tmp/reports/abc")
        );
    }

    #[test]
    fn file_names() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            ReportWriter::file_name_at(at),
            "relatorio_perguntas_respostas_20240309140507.pdf"
        );
        assert!(!ReportWriter::is_report_file_name("../etc/passwd"));
        assert!(!ReportWriter::is_report_file_name("relatorio_perguntas_respostas_2024.pdf"));
        assert!(ReportWriter::new("/tmp").resolve("secret.pdf").is_none());
    }

    #[test]
    fn wrapping_respects_width() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("one\n\ntwo", 10), vec!["one", "", "two"]);
        assert_eq!(wrap("", 10), vec![""]);
    }
}
