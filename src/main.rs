//! BugHunt · Code Review Game Backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional adversarial generation pipeline (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT          : u16 (default 3000)
//!   PIPELINE_BASE_URL    : enables the generation pipeline if present
//!   PIPELINE_TIMEOUT_SECS  : request timeout, default 300
//!   PIPELINE_MAX_RETRIES   : per-generation retry budget, default 3 (1..=5)
//!   GAME_CONFIG_PATH   : path to TOML config (pipeline defaults + question bank)
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod annotate;
mod scoring;
mod config;
mod seeds;
mod state;
mod protocol;
mod pipeline;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (question stores, sessions, pipeline client).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "bughunt_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
