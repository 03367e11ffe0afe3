//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `bioreactor.toml`.
//!     loads configuration from file or falls back to defaults, then lets a
//!     handful of environment variables override individual values.
//!
//! structure:
//!     - PollingConfig: How often the monitor ticks.
//!     - FanConfig: Relay GPIO pin, switch-on threshold, relay polarity.
//!     - PhConfig: Override value, calibration, and reading source.
//!     - TemperatureConfig: 1-Wire sysfs root and read retry policy.
//!     - ServerConfig / LoggingConfig: HTTP bind address, log level and file.
//!
//! environment overrides (each optional, each ignored when unparseable):
//!     PH_OVERRIDE, PH_VALUE, FAN_PIN, FAN_TEMP_THRESHOLD
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReactorConfig {
    pub polling: PollingConfig,
    pub fan: FanConfig,
    pub ph: PhConfig,
    pub temperature: TemperatureConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 2.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FanConfig {
    pub gpio_pin: u8,
    pub temp_threshold: f64,
    /// relay boards that switch on a LOW input
    pub active_low: bool,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self { gpio_pin: 18, temp_threshold: 28.0, active_low: false }
    }
}

/// Where simulated-or-real pH values come from when no override is active.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhSource {
    #[default]
    Simulated,
    Adc,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PhConfig {
    pub override_enabled: bool,
    pub override_value: f64,
    pub calibration_offset: f64,
    pub source: PhSource,
    /// `{ "a": slope, "b": intercept }` for the ADC millivolt conversion
    pub calibration_file: PathBuf,
}

impl Default for PhConfig {
    fn default() -> Self {
        Self {
            override_enabled: false,
            override_value: 7.0,
            calibration_offset: 0.0,
            source: PhSource::Simulated,
            calibration_file: PathBuf::from("ph_cal.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TemperatureConfig {
    pub device_root: PathBuf,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            device_root: PathBuf::from("/sys/bus/w1/devices"),
            retries: 3,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5050".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// append-only tick log; `None` keeps logging on the console only
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: Some(PathBuf::from("bioreactor.log")) }
    }
}

impl ReactorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: ReactorConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback, then apply environment overrides.
    ///
    /// Runs before the tracing subscriber exists (the log level lives in here),
    /// so problems are reported on stderr.
    pub fn load_or_default() -> Self {
        let mut paths = vec![
            PathBuf::from("config").join("bioreactor.toml"),
            PathBuf::from("..").join("config").join("bioreactor.toml"),
        ];
        if let Ok(explicit) = std::env::var("BIOREACTOR_CONFIG") {
            paths.insert(0, PathBuf::from(explicit));
        }

        let mut config = None;
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(loaded) => {
                        eprintln!("[CONFIG] Loaded from {}", path.display());
                        config = Some(loaded);
                        break;
                    }
                    Err(e) => {
                        eprintln!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        let mut config = config.unwrap_or_else(|| {
            eprintln!("[CONFIG] Warning: No config file found - using defaults");
            Self::default()
        });
        let mut warnings = config.sanitize();
        warnings.extend(config.apply_overrides(|key| std::env::var(key).ok()));
        for warning in warnings {
            eprintln!("[CONFIG] Warning: {}", warning);
        }
        config
    }

    /// Reset file values the monitor cannot run with back to their defaults.
    ///
    /// TOML accepts `nan` and `inf`, and nothing stops a zero, negative or
    /// out-of-range interval. Each setting is checked on its own.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        let period = Duration::try_from_secs_f64(self.polling.interval_seconds);
        if period.map_or(true, |p| p.is_zero()) {
            let fallback = PollingConfig::default().interval_seconds;
            warnings.push(format!(
                "polling.interval_seconds = {} is not a positive number, using {}",
                self.polling.interval_seconds, fallback
            ));
            self.polling.interval_seconds = fallback;
        }
        if !self.fan.temp_threshold.is_finite() {
            let fallback = FanConfig::default().temp_threshold;
            warnings.push(format!(
                "fan.temp_threshold = {} is not a finite number, using {}",
                self.fan.temp_threshold, fallback
            ));
            self.fan.temp_threshold = fallback;
        }
        if !self.ph.override_value.is_finite() {
            let fallback = PhConfig::default().override_value;
            warnings.push(format!(
                "ph.override_value = {} is not a finite number, using {}",
                self.ph.override_value, fallback
            ));
            self.ph.override_value = fallback;
        }
        if !self.ph.calibration_offset.is_finite() {
            let fallback = PhConfig::default().calibration_offset;
            warnings.push(format!(
                "ph.calibration_offset = {} is not a finite number, using {}",
                self.ph.calibration_offset, fallback
            ));
            self.ph.calibration_offset = fallback;
        }

        warnings
    }

    /// Apply `PH_OVERRIDE`, `PH_VALUE`, `FAN_PIN`, `FAN_TEMP_THRESHOLD`.
    ///
    /// Each variable is independent: a bad value leaves that one setting alone
    /// and is reported back as a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();

        if let Some(raw) = lookup("PH_OVERRIDE") {
            match parse_flag(&raw) {
                Some(flag) => self.ph.override_enabled = flag,
                None => warnings.push(format!("ignoring PH_OVERRIDE={:?} (not a boolean)", raw)),
            }
        }
        if let Some(raw) = lookup("PH_VALUE") {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => self.ph.override_value = v,
                _ => warnings.push(format!("ignoring PH_VALUE={:?} (not a number)", raw)),
            }
        }
        if let Some(raw) = lookup("FAN_PIN") {
            match raw.trim().parse::<u8>() {
                Ok(pin) => self.fan.gpio_pin = pin,
                Err(_) => warnings.push(format!("ignoring FAN_PIN={:?} (not a pin number)", raw)),
            }
        }
        if let Some(raw) = lookup("FAN_TEMP_THRESHOLD") {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => self.fan.temp_threshold = v,
                _ => warnings.push(format!("ignoring FAN_TEMP_THRESHOLD={:?} (not a number)", raw)),
            }
        }

        warnings
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let ph_mode = if self.ph.override_enabled {
            format!("override {:.2}", self.ph.override_value)
        } else {
            format!("{:?}", self.ph.source).to_lowercase()
        };
        println!("┌─────────────────────────────────────────┐");
        println!("│        BIOREACTOR CONFIGURATION         │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Poll Interval: {}s", self.polling.interval_seconds);
        println!("│ Fan: GPIO {} @ {:.1}°C", self.fan.gpio_pin, self.fan.temp_threshold);
        println!("│ pH: {}", ph_mode);
        println!("│ Bind: {}", self.server.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ReactorConfig = toml::from_str(
            r#"
[fan]
temp_threshold = 30.5

[ph]
source = "adc"
"#,
        )
        .unwrap();

        assert_eq!(config.fan.temp_threshold, 30.5);
        assert_eq!(config.fan.gpio_pin, 18);
        assert_eq!(config.ph.source, PhSource::Adc);
        assert_eq!(config.polling.interval_seconds, 2.0);
        assert_eq!(config.temperature.retries, 3);
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = ReactorConfig::default();
        let warnings = config.apply_overrides(env(&[
            ("PH_OVERRIDE", "true"),
            ("PH_VALUE", "6.8"),
            ("FAN_PIN", "12"),
            ("FAN_TEMP_THRESHOLD", "24"),
        ]));

        assert!(warnings.is_empty());
        assert!(config.ph.override_enabled);
        assert_eq!(config.ph.override_value, 6.8);
        assert_eq!(config.fan.gpio_pin, 12);
        assert_eq!(config.fan.temp_threshold, 24.0);
    }

    #[test]
    fn test_bad_env_values_are_independent() {
        let mut config = ReactorConfig::default();
        let warnings = config.apply_overrides(env(&[
            ("PH_OVERRIDE", "maybe"),
            ("PH_VALUE", "7.4"),
            ("FAN_PIN", "gpio18"),
            ("FAN_TEMP_THRESHOLD", "NaN"),
        ]));

        assert_eq!(warnings.len(), 3);
        assert!(!config.ph.override_enabled);
        assert_eq!(config.ph.override_value, 7.4);
        assert_eq!(config.fan.gpio_pin, 18);
        assert_eq!(config.fan.temp_threshold, 28.0);
    }

    #[test]
    fn test_nan_threshold_in_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bioreactor.toml");
        std::fs::write(&path, "[fan]\ngpio_pin = 23\ntemp_threshold = nan\n").unwrap();

        let mut config = ReactorConfig::load(&path).unwrap();
        let warnings = config.sanitize();

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("fan.temp_threshold"));
        assert_eq!(config.fan.temp_threshold, 28.0);
        assert_eq!(config.fan.gpio_pin, 23);
    }

    #[test]
    fn test_unusable_file_values_are_independent() {
        let mut config: ReactorConfig = toml::from_str(
            r#"
[polling]
interval_seconds = -1.0

[fan]
temp_threshold = 26.0

[ph]
override_value = inf
calibration_offset = nan
"#,
        )
        .unwrap();

        let warnings = config.sanitize();
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.polling.interval_seconds, 2.0);
        assert_eq!(config.fan.temp_threshold, 26.0);
        assert_eq!(config.ph.override_value, 7.0);
        assert_eq!(config.ph.calibration_offset, 0.0);

        for interval in [0.0, 1e300] {
            config.polling.interval_seconds = interval;
            assert_eq!(config.sanitize().len(), 1, "interval {}", interval);
            assert_eq!(config.polling.interval_seconds, 2.0);
        }
        assert!(config.sanitize().is_empty());
    }
}
