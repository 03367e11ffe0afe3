//! ==============================================================================
//! temperature.rs - DS18B20 temperature probe
//! ==============================================================================
//!
//! purpose:
//!     reads the reactor temperature from a DS18B20 on the 1-Wire bus via the
//!     kernel's sysfs interface (`/sys/bus/w1/devices/28-*/w1_slave`).
//!
//!     the w1_slave payload looks like:
//!
//!         72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//!         72 01 4b 46 7f ff 0e 10 57 t=23125
//!
//!     line 1 must end in YES (crc ok), line 2 carries millidegrees after `t=`.
//!
//! behaviour:
//!     - the device is located once, at construction.
//!     - no device at all -> synthetic readings (25°C baseline, -2..+5 jitter)
//!       so the rest of the system still runs on a dev machine.
//!     - a present device that keeps returning garbage -> `None` after the
//!       configured number of attempts. callers treat that as "no data".
//!
//! ==============================================================================

use crate::config::TemperatureConfig;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SYNTHETIC_BASELINE_C: f64 = 25.0;

#[derive(Debug, Clone)]
enum Source {
    OneWire(PathBuf),
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct TemperatureProbe {
    source: Source,
    attempts: u32,
    retry_delay: Duration,
}

impl TemperatureProbe {
    /// Look for a DS18B20 under `config.device_root`; fall back to synthetic.
    pub fn discover(config: &TemperatureConfig) -> Self {
        let source = match find_device(&config.device_root) {
            Some(path) => {
                tracing::info!("Temperature sensor found at: {}", path.display());
                Source::OneWire(path)
            }
            None => {
                tracing::warn!(
                    "No DS18B20 temperature sensor under {} - using synthetic readings",
                    config.device_root.display()
                );
                Source::Synthetic
            }
        };
        Self {
            source,
            attempts: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    #[allow(dead_code)]
    pub fn synthetic() -> Self {
        Self { source: Source::Synthetic, attempts: 1, retry_delay: Duration::ZERO }
    }

    #[allow(dead_code)]
    pub fn is_synthetic(&self) -> bool {
        matches!(self.source, Source::Synthetic)
    }

    /// Temperature in °C, or `None` when the sensor gave nothing usable.
    ///
    /// Blocking: sleeps between attempts.
    pub fn read_celsius(&self) -> Option<f64> {
        let path = match &self.source {
            Source::Synthetic => {
                return Some(SYNTHETIC_BASELINE_C + rand::rng().random_range(-2.0..=5.0));
            }
            Source::OneWire(path) => path,
        };

        for attempt in 1..=self.attempts {
            match std::fs::read_to_string(path) {
                Ok(payload) => {
                    if let Some(celsius) = parse_w1_slave(&payload) {
                        return Some(celsius);
                    }
                    tracing::debug!("DS18B20 attempt {}/{}: unparseable payload", attempt, self.attempts);
                }
                Err(e) => {
                    tracing::debug!("DS18B20 attempt {}/{}: {}", attempt, self.attempts, e);
                }
            }
            if attempt < self.attempts {
                std::thread::sleep(self.retry_delay);
            }
        }

        tracing::warn!("Temperature unavailable after {} attempts", self.attempts);
        None
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Parse a w1_slave payload into °C. `None` on a bad CRC or missing marker.
pub fn parse_w1_slave(payload: &str) -> Option<f64> {
    let mut lines = payload.lines();
    let status = lines.next()?.trim();
    if !status.ends_with("YES") {
        return None;
    }
    let (_, millidegrees) = lines.next()?.split_once("t=")?;
    let millidegrees: i64 = millidegrees.trim().parse().ok()?;
    Some(millidegrees as f64 / 1000.0)
}

/// First `28-*` family device (DS18B20) with a readable w1_slave file.
fn find_device(root: &Path) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("cannot list {}: {}", root.display(), e);
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("28-"))
        .map(|entry| entry.path().join("w1_slave"))
        .filter(|path| path.is_file())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
    const BAD_CRC: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=00 NO\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    fn sysfs_with(payload: &str) -> (tempfile::TempDir, TemperatureConfig) {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("28-0316a2791dff");
        std::fs::create_dir(&device).unwrap();
        std::fs::write(device.join("w1_slave"), payload).unwrap();
        // bus master entries must not be mistaken for sensors
        std::fs::create_dir(dir.path().join("w1_bus_master1")).unwrap();
        let config = TemperatureConfig {
            device_root: dir.path().to_path_buf(),
            retries: 3,
            retry_delay_ms: 1,
        };
        (dir, config)
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_w1_slave(GOOD), Some(23.125));
        assert_eq!(parse_w1_slave("xx : crc=1 YES\nxx t=-1500"), Some(-1.5));
        assert_eq!(parse_w1_slave(BAD_CRC), None);
        assert_eq!(parse_w1_slave("xx : crc=1 YES\nxx"), None);
        assert_eq!(parse_w1_slave(""), None);
    }

    #[test]
    fn test_reads_real_device() {
        let (_dir, config) = sysfs_with(GOOD);
        let probe = TemperatureProbe::discover(&config);
        assert!(!probe.is_synthetic());
        assert_eq!(probe.read_celsius(), Some(23.125));
    }

    #[test]
    fn test_garbage_exhausts_retries() {
        let (_dir, config) = sysfs_with(BAD_CRC);
        let probe = TemperatureProbe::discover(&config);
        assert!(!probe.is_synthetic());
        assert_eq!(probe.read_celsius(), None);
    }

    #[test]
    fn test_missing_device_is_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let config = TemperatureConfig {
            device_root: dir.path().join("nope"),
            ..TemperatureConfig::default()
        };
        let probe = TemperatureProbe::discover(&config);
        assert!(probe.is_synthetic());
        for _ in 0..50 {
            let t = probe.read_celsius().unwrap();
            assert!((22.99..=30.01).contains(&t), "synthetic reading {} out of range", t);
        }
    }

    #[test]
    fn test_fahrenheit() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert!((celsius_to_fahrenheit(23.125) - 73.625).abs() < 1e-9);
    }
}
