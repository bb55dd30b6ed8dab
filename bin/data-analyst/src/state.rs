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

use crate::config::AppConfig;
use analyst::{ApiClient, DatasetLoader, Pipeline, ReportWriter, Session};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory sessions keyed by a random id. Idle sessions are evicted; nothing
/// survives a restart.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    idle_ttl: TimeDelta,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl: TimeDelta::from_std(idle_ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    pub async fn create(&self) -> Uuid {
        self.evict_idle().await;
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(Session::new())));
        info!(session_id = %id, "session created");
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Utc::now()).await
    }

    /// Drops sessions idle longer than the TTL as of `now`. A session whose lock
    /// is held is in use and stays.
    pub async fn evict_idle_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| match session.try_lock() {
            Ok(session) if session.is_idle(now, self.idle_ttl) => {
                info!(
                    session_id = %id,
                    age_seconds = now.signed_duration_since(session.created_at()).num_seconds(),
                    "idle session evicted"
                );
                false
            }
            _ => true,
        });
        before - sessions.len()
    }

    /// Runs [`evict_idle`](Self::evict_idle) every `period` until the runtime stops.
    pub fn sweep_every(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle().await;
                if evicted > 0 {
                    debug!(evicted, "session sweep");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<Pipeline>,
    pub loader: Arc<DatasetLoader>,
    /// Root writer; each session writes below its own directory.
    pub reports: Arc<ReportWriter>,
}

impl AppState {
    pub fn new(config: &AppConfig, client: Arc<dyn ApiClient>) -> Self {
        let pipeline = Pipeline::new(client, &config.llm).with_preview_rows(config.dataset.preview_rows);
        let loader = DatasetLoader::new(config.csv_reader()).with_preview_rows(config.dataset.preview_rows);
        Self {
            sessions: Arc::new(SessionStore::new(config.server.session_idle_ttl())),
            pipeline: Arc::new(pipeline),
            loader: Arc::new(loader),
            reports: Arc::new(ReportWriter::new(config.report.output_dir.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new(HOUR);
        let a = store.create().await;
        let b = store.create().await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);

        let first = store.get(&a).await.unwrap();
        first.lock().await.history_mut().append("q", "a");
        let second = store.get(&b).await.unwrap();
        assert!(second.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn unknown_ids() {
        let store = SessionStore::new(HOUR);
        assert!(store.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_gone() {
        let store = SessionStore::new(Duration::from_secs(60));
        let stale = store.create().await;
        let fresh = store.create().await;
        let now = Utc::now();
        store
            .get(&fresh)
            .await
            .unwrap()
            .lock()
            .await
            .touch_at(now + TimeDelta::seconds(50));

        assert_eq!(store.evict_idle_at(now + TimeDelta::seconds(30)).await, 0);
        assert_eq!(store.evict_idle_at(now + TimeDelta::seconds(90)).await, 1);
        assert!(store.get(&stale).await.is_none());
        assert!(store.get(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn busy_sessions_are_kept() {
        let store = SessionStore::new(Duration::from_secs(1));
        let id = store.create().await;
        let session = store.get(&id).await.unwrap();
        let _held = session.lock().await;
        assert_eq!(store.evict_idle_at(Utc::now() + TimeDelta::hours(1)).await, 0);
        assert_eq!(store.len().await, 1);
    }
}
