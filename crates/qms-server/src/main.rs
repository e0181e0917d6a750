//! qms-server binary.
//!
//! Reads `qms.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the deviation API over HTTP.
//!
//! ```text
//! qms-server --config /etc/qms/qms.toml serve
//! qms-server reminders --as-of 2026-06-01T00:00:00Z
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use qms_core::store::DeviationStore;
use qms_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Deviation management server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "qms.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Print due review reminders as JSON lines and exit.
  Reminders {
    /// Evaluate as of this instant instead of now.
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let server_cfg = settings::load(&cli.config)?;

  let store_path = settings::expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, &server_cfg).await,
    Command::Reminders { as_of } => {
      let as_of = as_of.unwrap_or_else(Utc::now);
      let due = store
        .due_reminders(as_of, server_cfg.reminder_after())
        .await
        .context("failed to compute reminders")?;
      for reminder in &due {
        println!("{}", serde_json::to_string(reminder)?);
      }
      tracing::info!(count = due.len(), %as_of, "reminders listed");
      Ok(())
    }
  }
}

async fn serve(store: SqliteStore, server_cfg: &settings::ServerConfig) -> anyhow::Result<()> {
  let app = Router::new()
    .nest(
      "/api",
      qms_api::api_router(Arc::new(store), server_cfg.reminder_after()),
    )
    .layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
