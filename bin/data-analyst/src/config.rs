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

use anyhow::{Context, Result};
use llm_contracts::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "data-analyst.toml";
pub const ENV_PREFIX: &str = "ANALYST";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: ProviderConfig,
    pub report: ReportConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub body_limit_bytes: usize,
    /// Sessions untouched for this long are dropped with their dataset.
    pub session_idle_ttl_seconds: u64,
}

impl ServerConfig {
    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            body_limit_bytes: 16 * 1024 * 1024,
            session_idle_ttl_seconds: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub preview_rows: usize,
    pub max_field_bytes: usize,
    pub max_columns: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            preview_rows: tabula::DEFAULT_PREVIEW_ROWS,
            max_field_bytes: 1024 * 1024,
            max_columns: 10_000,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `ANALYST_*` variables
    /// (`ANALYST_LLM__MODEL`, `ANALYST_SERVER__ADDR`, ...).
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::build(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn build(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("failed to serialise default configuration")?;

        config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(file.as_path()).required(required))
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to load configuration from {}", file.display()))?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn csv_reader(&self) -> tabula::CsvReader {
        tabula::CsvReader::new().with_limits(self.dataset.max_field_bytes, self.dataset.max_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX).source(Some(config::Map::new()))
    }

    #[test]
    fn defaults_without_file() {
        let cfg = AppConfig::build(None, no_env()).unwrap();
        assert_eq!(cfg.server.addr, "127.0.0.1:8080");
        assert_eq!(cfg.llm.model, "llama-3.1-8b-instant");
        assert_eq!(cfg.llm.api_key_env, "GROQ_API_KEY");
        assert_eq!(cfg.dataset.preview_rows, 5);
        assert_eq!(cfg.server.session_idle_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nmodel = \"llama-3.3-70b-versatile\"\nmax_retries = 4\n\n[report]\noutput_dir = \"reports\""
        )
        .unwrap();

        let env = config::Environment::with_prefix(ENV_PREFIX).source(Some(
            [
                ("ANALYST_SERVER__ADDR".to_string(), "0.0.0.0:9000".to_string()),
                ("ANALYST_SERVER__SESSION_IDLE_TTL_SECONDS".to_string(), "120".to_string()),
            ]
            .into_iter()
            .collect(),
        ));
        let cfg = AppConfig::build(Some(file.path()), env).unwrap();
        assert_eq!(cfg.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(cfg.llm.max_retries, 4);
        assert_eq!(cfg.llm.timeout_seconds, 30);
        assert_eq!(cfg.report.output_dir, PathBuf::from("reports"));
        assert_eq!(cfg.server.addr, "0.0.0.0:9000");
        assert_eq!(cfg.server.session_idle_ttl_seconds, 120);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(AppConfig::build(Some(Path::new("/nonexistent/analyst.toml")), no_env()).is_err());
    }
}
