//! ==============================================================================
//! acidity.rs - pH probe
//! ==============================================================================
//!
//! purpose:
//!     produces the reactor pH. three ways to get a raw value:
//!     - override:  a fixed configured value (bench testing, broken probe)
//!     - simulated: 7.2 baseline with ±0.3 jitter
//!     - adc:       DFRobot pH V2 analog output through an MCP3008, converted
//!                  with a linear millivolt -> pH calibration
//!
//!     every mode then adds the calibration offset and clamps to [0, 14].
//!
//! relationships:
//!     - used by: monitor.rs (one read per tick), api.rs (calibrate)
//!     - uses: hal.rs (AdcChannel)
//!
//! ==============================================================================

use crate::config::{PhConfig, PhSource};
use crate::error::{ReactorError, ReactorResult};
use crate::hal::{self, AdcChannel};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;

const SIMULATED_BASELINE: f64 = 7.2;
const SIMULATED_JITTER: f64 = 0.3;

/// `ph = a * millivolts + b`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LinearCalibration {
    pub a: f64,
    pub b: f64,
}

impl Default for LinearCalibration {
    /// Rough two-point fit for the DFRobot V2 board: ~1650 mV at pH 7,
    /// ~1800 mV at pH 4.
    fn default() -> Self {
        Self::two_point((7.0, 1650.0), (4.0, 1800.0))
    }
}

impl LinearCalibration {
    /// Fit through two `(ph, millivolts)` buffer measurements.
    pub fn two_point(first: (f64, f64), second: (f64, f64)) -> Self {
        let a = (second.0 - first.0) / (second.1 - first.1);
        let b = first.0 - a * first.1;
        Self { a, b }
    }

    /// Read `{ "a": .., "b": .. }` from disk, defaulting on any problem.
    pub fn load_or_default(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<LinearCalibration>(&content)?));
        match parsed {
            Ok(cal) if cal.a.is_finite() && cal.b.is_finite() => {
                tracing::info!("pH calibration loaded from {}", path.display());
                cal
            }
            Ok(_) => {
                tracing::warn!("pH calibration in {} is not finite - using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::info!("pH calibration not loaded from {} ({:#}) - using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn ph(&self, millivolts: f64) -> f64 {
        self.a * millivolts + self.b
    }
}

enum Mode {
    Override(f64),
    Simulated,
    Adc { adc: Box<dyn AdcChannel>, calibration: LinearCalibration },
}

pub struct AcidityProbe {
    mode: Mode,
    offset: f64,
}

impl AcidityProbe {
    pub fn from_config(config: &PhConfig) -> Self {
        let mode = if config.override_enabled {
            tracing::info!("pH override active: {:.2}", config.override_value);
            Mode::Override(config.override_value)
        } else {
            match config.source {
                PhSource::Simulated => Mode::Simulated,
                PhSource::Adc => match hal::open_ph_adc() {
                    Ok(adc) => Mode::Adc {
                        adc,
                        calibration: LinearCalibration::load_or_default(&config.calibration_file),
                    },
                    Err(e) => {
                        tracing::warn!("pH ADC unavailable ({:#}) - simulating pH", e);
                        Mode::Simulated
                    }
                },
            }
        };

        let probe = Self { mode, offset: config.calibration_offset };
        tracing::info!("pH sensor initialized ({})", probe.mode_name());
        probe
    }

    #[allow(dead_code)]
    pub fn simulated() -> Self {
        Self { mode: Mode::Simulated, offset: 0.0 }
    }

    #[allow(dead_code)]
    pub fn overridden(value: f64) -> Self {
        Self { mode: Mode::Override(value), offset: 0.0 }
    }

    #[allow(dead_code)]
    pub fn with_adc(adc: Box<dyn AdcChannel>, calibration: LinearCalibration) -> Self {
        Self { mode: Mode::Adc { adc, calibration }, offset: 0.0 }
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            Mode::Override(_) => "override",
            Mode::Simulated => "simulated",
            Mode::Adc { .. } => "adc",
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Current pH in [0, 14]. Only the ADC mode can come back empty.
    pub fn read(&mut self) -> Option<f64> {
        let raw = match &mut self.mode {
            Mode::Override(value) => *value,
            Mode::Simulated => {
                SIMULATED_BASELINE + rand::rng().random_range(-SIMULATED_JITTER..=SIMULATED_JITTER)
            }
            Mode::Adc { adc, calibration } => match adc.read_millivolts() {
                Ok(mv) => calibration.ph(mv),
                Err(e) => {
                    tracing::error!("Error reading pH: {:#}", e);
                    return None;
                }
            },
        };
        let ph = raw + self.offset;
        if !ph.is_finite() {
            return None;
        }
        Some(ph.clamp(0.0, 14.0))
    }

    /// Single-point calibration against a buffer of known pH.
    /// Returns the new offset.
    pub fn calibrate(&mut self, known_ph: f64, measured_ph: f64) -> ReactorResult<f64> {
        if !known_ph.is_finite() || !measured_ph.is_finite() {
            return Err(ReactorError::InvalidCalibration(format!(
                "known_ph and measured_ph must be finite, got {} and {}",
                known_ph, measured_ph
            )));
        }
        self.offset = known_ph - measured_ph;
        tracing::info!("pH sensor calibrated with offset: {:.3}", self.offset);
        Ok(self.offset)
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdc(anyhow::Result<f64>);

    impl AdcChannel for FixedAdc {
        fn read_millivolts(&mut self) -> anyhow::Result<f64> {
            match &self.0 {
                Ok(mv) => Ok(*mv),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    #[test]
    fn test_simulated_stays_near_baseline() {
        let mut probe = AcidityProbe::simulated();
        for _ in 0..100 {
            let ph = probe.read().unwrap();
            assert!((6.89..=7.51).contains(&ph), "pH {} outside jitter band", ph);
        }
    }

    #[test]
    fn test_override_with_offset_and_clamp() {
        let mut probe = AcidityProbe::overridden(6.5);
        assert_eq!(probe.read(), Some(6.5));

        probe.calibrate(7.0, 6.5).unwrap();
        assert_eq!(probe.offset(), 0.5);
        assert_eq!(probe.read(), Some(7.0));

        let mut high = AcidityProbe::overridden(13.8);
        high.calibrate(9.0, 8.0).unwrap();
        assert_eq!(high.read(), Some(14.0));

        let mut low = AcidityProbe::overridden(0.2);
        low.calibrate(4.0, 5.0).unwrap();
        assert_eq!(low.read(), Some(0.0));
    }

    #[test]
    fn test_calibrate_rejects_nan() {
        let mut probe = AcidityProbe::overridden(7.0);
        assert!(matches!(
            probe.calibrate(f64::NAN, 7.0),
            Err(ReactorError::InvalidCalibration(_))
        ));
        assert_eq!(probe.offset(), 0.0);
    }

    #[test]
    fn test_adc_conversion() {
        let cal = LinearCalibration::default();
        assert!((cal.ph(1650.0) - 7.0).abs() < 1e-9);
        assert!((cal.ph(1800.0) - 4.0).abs() < 1e-9);

        let mut probe = AcidityProbe::with_adc(Box::new(FixedAdc(Ok(1650.0))), cal);
        let ph = probe.read().unwrap();
        assert!((ph - 7.0).abs() < 1e-9);

        let mut broken = AcidityProbe::with_adc(Box::new(FixedAdc(Err(anyhow::anyhow!("spi")))), cal);
        assert_eq!(broken.read(), None);
    }

    #[test]
    fn test_calibration_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ph_cal.json");

        assert_eq!(LinearCalibration::load_or_default(&path), LinearCalibration::default());

        std::fs::write(&path, r#"{"a": -0.0175, "b": 35.9}"#).unwrap();
        assert_eq!(LinearCalibration::load_or_default(&path), LinearCalibration { a: -0.0175, b: 35.9 });

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(LinearCalibration::load_or_default(&path), LinearCalibration::default());
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_adc_source_falls_back_without_hardware() {
        let config = PhConfig { source: PhSource::Adc, ..PhConfig::default() };
        let probe = AcidityProbe::from_config(&config);
        assert_eq!(probe.mode_name(), "simulated");

        let config = PhConfig { override_enabled: true, source: PhSource::Adc, ..PhConfig::default() };
        assert_eq!(AcidityProbe::from_config(&config).mode_name(), "override");
    }
}
