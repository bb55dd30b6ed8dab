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

use analyst::{
    ApiClient, ChatCompletionsClient, DatasetLoader, EvaluationOutcome, Pipeline, ReportOutcome,
    ReportWriter, Session,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use data_analyst::{build_router, AppConfig, AppState};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Parser, Debug, Clone)]
#[command(name = "data-analyst", about = "Ask questions about a CSV file in plain language")]
struct Cli {
    /// TOML configuration file (defaults to ./data-analyst.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the HTTP server and web page.
    Serve,
    /// Answer one question about a CSV file and exit.
    Ask {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        question: String,
        /// Also write a one-entry PDF report.
        #[arg(long)]
        report: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.cmd.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Ask {
            csv,
            question,
            report,
        } => run_once(config, csv, question, report).await,
    }
}

fn model_client(config: &AppConfig) -> Result<Arc<dyn ApiClient>> {
    let client = ChatCompletionsClient::from_env(&config.llm).context("model client unavailable")?;
    info!(endpoint = client.endpoint(), model = %config.llm.model, "model client ready");
    Ok(Arc::new(client))
}

async fn run_server(config: AppConfig) -> Result<()> {
    let state = AppState::new(&config, model_client(&config)?);
    let sweep_period = config
        .server
        .session_idle_ttl()
        .clamp(Duration::from_secs(1), MAX_SWEEP_PERIOD);
    let sweeper = state.sessions.clone().sweep_every(sweep_period);
    let app = build_router(state, config.server.body_limit_bytes);

    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("invalid server address '{}'", config.server.addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr()?;
    info!(%local, reports = %config.report.output_dir.display(), "data-analyst listening");

    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        _ = tokio::signal::ctrl_c() => {}
    }
    sweeper.abort();
    info!("data-analyst shutting down");
    Ok(())
}

async fn run_once(config: AppConfig, csv: PathBuf, question: String, report: bool) -> Result<()> {
    let loader = DatasetLoader::new(config.csv_reader()).with_preview_rows(config.dataset.preview_rows);
    let mut session = Session::new();
    let loaded = loader.load_path(&mut session, Some(csv.as_path()));
    if !loaded.loaded {
        anyhow::bail!(loaded.status);
    }

    let pipeline = Pipeline::new(model_client(&config)?, &config.llm)
        .with_preview_rows(config.dataset.preview_rows);
    let answer = pipeline
        .answer(&question, session.dataset())
        .await
        .map_err(|e| {
            if e.is_upstream() {
                anyhow::Error::new(e).context("the language model did not answer")
            } else {
                e.into()
            }
        })?;

    if let Some(expression) = &answer.expression {
        println!("Expression: {expression}");
    }
    match &answer.outcome {
        Some(EvaluationOutcome::Success { rendered }) => println!("Result:\n{rendered}"),
        Some(EvaluationOutcome::Failure { kind, message }) => {
            println!("Evaluation failed ({kind}): {message}")
        }
        None => {}
    }
    println!("\n{}", answer.text);

    if report {
        session.history_mut().append(question, answer.text);
        let writer = ReportWriter::new(config.report.output_dir);
        match writer.write_async(session.history().records().to_vec()).await? {
            ReportOutcome::Written { path, .. } => println!("\nReport written to {}", path.display()),
            ReportOutcome::Empty { message } => println!("\n{message}"),
        }
    }
    Ok(())
}
