//! # Arena Engine
//!
//! Headless duel runner for Project Arena.
//!
//! Runs AI-versus-AI rounds on the fixed-timestep combat loop:
//! - Config: `arena.toml` (or `ARENA_CONFIG`)
//! - Logging: `RUST_LOG`, plus `ARENA_LOG_JSON=1` for JSON lines
//! - Knowledge: one JSON knowledge base per fighter

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("arena=info".parse()?);
    let json = std::env::var("ARENA_LOG_JSON").is_ok_and(|v| v == "1");

    // Initialize tracing
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Project Arena starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    app::run()?;

    info!("Project Arena shutdown complete");
    Ok(())
}
