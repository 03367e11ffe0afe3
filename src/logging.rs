//! ==============================================================================
//! logging.rs - tracing setup
//! ==============================================================================
//!
//! purpose:
//!     console logging plus an append-only plain-text log file. every tick
//!     writes one line to both (target `bioreactor::tick`), which makes the
//!     file a human-readable record of the reactor over time. it is never
//!     read back.
//!
//!     RUST_LOG overrides the configured level. the file layer always lets
//!     the tick record through at INFO, even when the level is quieter.
//!
//! ==============================================================================

use crate::config::LoggingConfig;
use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Target of the one-line-per-tick record.
pub const TICK_TARGET: &str = "bioreactor::tick";

pub fn init(config: &LoggingConfig) -> Result<()> {
    let mut file_problem = None;
    let file_layer = match &config.file {
        Some(path) => match open_append(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(file_filter(level_filter(&config.level))?),
            ),
            Err(e) => {
                file_problem = Some(format!("{:#}", e));
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(level_filter(&config.level)))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    if let Some(problem) = file_problem {
        tracing::warn!("Log file disabled, console only: {}", problem);
    }
    Ok(())
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// The file keeps every tick record, whatever level the console runs at.
fn file_filter(base: EnvFilter) -> Result<EnvFilter> {
    let tick: Directive = format!("{}=info", TICK_TARGET)
        .parse()
        .context("tick log directive")?;
    Ok(base.add_directive(tick))
}

/// Open (creating if needed) a log file for appending.
pub fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("bioreactor.log");

        writeln!(open_append(&path).unwrap(), "first").unwrap();
        writeln!(open_append(&path).unwrap(), "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_file_keeps_ticks_below_configured_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bioreactor.log");
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(open_append(&path).unwrap()))
            .with_filter(file_filter(EnvFilter::new("warn")).unwrap());

        tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
            tracing::info!(target: TICK_TARGET, "T: 27.10°C, pH: 7.00, Fan: false");
            tracing::info!("routine chatter");
            tracing::warn!("sensor trouble");
        });

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("T: 27.10°C, pH: 7.00"));
        assert!(written.contains("sensor trouble"));
        assert!(!written.contains("routine chatter"));
    }
}
