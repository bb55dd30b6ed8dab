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

use crate::history::History;
use chrono::{DateTime, TimeDelta, Utc};
use tabula::Dataset;

/// Everything one user has uploaded and collected.
#[derive(Debug, Clone)]
pub struct Session {
    dataset: Option<Dataset>,
    history: History,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            dataset: None,
            history: History::new(),
            created_at: now,
            last_used: now,
        }
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn has_dataset(&self) -> bool {
        self.dataset.is_some()
    }

    /// Replaces any previous dataset.
    pub fn set_dataset(&mut self, dataset: Dataset) {
        self.dataset = Some(dataset);
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    pub fn touch_at(&mut self, at: DateTime<Utc>) {
        self.last_used = self.last_used.max(at);
    }

    /// Nothing has used the session for longer than `ttl` as of `now`.
    pub fn is_idle(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now.signed_duration_since(self.last_used) > ttl
    }

    /// Drops the dataset and the history.
    pub fn reset(&mut self) {
        self.dataset = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula::CsvReader;

    #[test]
    fn reset_clears_dataset_and_history() {
        let mut session = Session::new();
        session.set_dataset(CsvReader::new().read_bytes(b"a\n1\n", "t").unwrap());
        session.history_mut().append("q", "a");
        session.reset();
        assert!(!session.has_dataset());
        assert!(session.history().is_empty());
    }

    #[test]
    fn idle_is_measured_from_last_use() {
        let mut session = Session::new();
        let ttl = TimeDelta::minutes(10);
        let start = session.created_at();
        assert!(!session.is_idle(start + TimeDelta::minutes(9), ttl));
        assert!(session.is_idle(start + TimeDelta::minutes(11), ttl));

        session.touch_at(start + TimeDelta::minutes(8));
        assert!(!session.is_idle(start + TimeDelta::minutes(11), ttl));
        assert_eq!(session.created_at(), start);
    }
}
