//! ==============================================================================
//! main.rs - bioreactor host entry point
//! ==============================================================================
//!
//! purpose:
//!     runs on the raspberry pi next to a small algae bioreactor. it keeps the
//!     culture in range: reads temperature and pH on a fixed period, switches
//!     a cooling fan, and serves the readings over a small json api.
//!
//! responsibilities:
//!     - load configuration (config/bioreactor.toml + env overrides)
//!     - set up logging (console + append-only tick log)
//!     - build the monitor and start its background loop
//!     - serve the http api until ctrl-c
//!     - stop the loop and release the fan on the way out
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌──────────────────────┐      ┌──────────────────────────┐  │
//!     │  │ monitor loop         │      │ web server (api.rs)      │  │
//!     │  │ (2s tick, background)│      │ status/history/fan/config│  │
//!     │  └──────────┬───────────┘      └────────────┬─────────────┘  │
//!     │             │   Arc<Monitor> (monitor.rs)   │                │
//!     │             └───────────────┬───────────────┘                │
//!     └─────────────────────────────┼────────────────────────────────┘
//!                 ┌─────────────────┼──────────────────┐
//!                 ▼                 ▼                  ▼
//!          ┌────────────┐    ┌────────────┐     ┌─────────────┐
//!          │ DS18B20    │    │ pH probe   │     │ fan relay   │
//!          │ (1-Wire)   │    │ (MCP3008)  │     │ (GPIO)      │
//!          └────────────┘    └────────────┘     └─────────────┘
//!
//! ==============================================================================

mod acidity;
mod actuator;
mod api;
mod config;
mod error;
mod hal;
mod history;
mod logging;
mod monitor;
mod status;
mod temperature;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Bioreactor Host");
    println!("  temperature · pH · cooling");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::ReactorConfig::load_or_default();
    logging::init(&config.logging)?;
    config.print_summary();
    let period = Duration::try_from_secs_f64(config.polling.interval_seconds)
        .with_context(|| format!("invalid polling interval {}", config.polling.interval_seconds))?;

    // step 2: build the monitor (probes + fan)
    let monitor = match monitor::Monitor::new(&config) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            tracing::error!("Fatal: failed to initialize monitor: {:#}", e);
            return Err(e);
        }
    };

    // step 3: start the monitor loop in background
    if let Err(e) = monitor.start(period) {
        monitor.stop().await;
        return Err(e.into());
    }

    // step 4: serve the api until ctrl-c
    let served = serve(&config.server.bind, api::router(monitor.clone())).await;

    // step 5: stop the loop and release the fan, whatever happened above
    monitor.stop().await;
    served
}

async fn serve(bind: &str, app: axum::Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    tracing::info!("API live at http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server error")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down..."),
        Err(e) => {
            tracing::error!("Cannot listen for ctrl-c ({}); serving until killed", e);
            std::future::pending::<()>().await;
        }
    }
}
