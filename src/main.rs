//! Viva · Active Expression Backend
//!
//! - Axum HTTP API under `/api/v1`
//! - Essay segmentation into Chinese → English active-expression mappings
//! - SM-2 spaced repetition for collected words
//! - OpenAI-compatible completion client (via environment variables)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   OPENAI_API_KEY     : enables the completion client if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_MODEL       : default "gpt-4o"
//!   OPENAI_MAX_TOKENS  : default 1000
//!   VIVA_CONFIG_PATH   : path to TOML config (prompts, thresholds, data paths)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"
//!
//! The lexicon and frequency table under `data/` are generated from WordNet 3.0 and a
//! ranked word list with `cargo run --bin import_lexicon` (see that binary's docs).

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod llm;
mod lexicon;
mod segmentation;
mod srs;
mod store;
mod essays;
mod reviews;
mod state;
mod protocol;
mod routes;
mod pinyin;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Load data files, config and the completion client; wire services.
  let state = Arc::new(AppState::new()?);

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "viva_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "viva_backend", error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "viva_backend", "shutdown signal received");
}
