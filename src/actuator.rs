//! ==============================================================================
//! actuator.rs - cooling fan with hysteresis
//! ==============================================================================
//!
//! purpose:
//!     owns the fan relay output and decides when it should run.
//!
//!     automatic policy (once per tick):
//!
//!         temp >  threshold            -> start (if stopped)
//!         temp <= threshold - 1.0      -> stop  (if running)
//!         otherwise (dead band)        -> leave it alone
//!
//!     manual override (HTTP) calls start()/stop() directly. there is no
//!     lockout: a manual stop above threshold is undone by the next tick.
//!
//! concurrency:
//!     everything lives behind ONE mutex - the policy decision, the relay
//!     write and the `running` flag change together, so the flag can never
//!     disagree with the last level written to the pin.
//!
//! ==============================================================================

use crate::config::FanConfig;
use crate::error::{ReactorError, ReactorResult};
use crate::hal::{self, OutputPin};
use std::sync::{Mutex, MutexGuard};

/// Width of the band below the threshold in which the fan keeps its state.
pub const HYSTERESIS_C: f64 = 1.0;

/// Point-in-time copy of the actuator, for the API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorState {
    pub pin_id: u8,
    pub threshold: f64,
    pub running: bool,
}

struct FanState {
    threshold: f64,
    running: bool,
    released: bool,
    output: Box<dyn OutputPin>,
}

impl FanState {
    fn drive(&mut self, on: bool) -> ReactorResult<bool> {
        if self.released {
            return Err(ReactorError::ActuatorReleased);
        }
        self.output.set_level(on)?;
        let changed = self.running != on;
        self.running = on;
        if changed {
            tracing::info!("Cooling fan {}", if on { "started" } else { "stopped" });
        }
        Ok(changed)
    }
}

pub struct CoolingActuator {
    pin_id: u8,
    state: Mutex<FanState>,
}

impl CoolingActuator {
    pub fn new(pin_id: u8, threshold: f64, output: Box<dyn OutputPin>) -> ReactorResult<Self> {
        check_threshold(threshold)?;
        let mut state = FanState { threshold, running: false, released: false, output };
        // known state on boot: fan off
        state.output.set_level(false)?;
        tracing::info!(
            "Fan controller initialized on {}, threshold: {:.1}°C",
            state.output.describe(),
            threshold
        );
        Ok(Self { pin_id, state: Mutex::new(state) })
    }

    pub fn from_config(config: &FanConfig) -> ReactorResult<Self> {
        let output = hal::open_output_pin(config.gpio_pin, config.active_low);
        Self::new(config.gpio_pin, config.temp_threshold, output)
    }

    fn lock(&self) -> MutexGuard<'_, FanState> {
        // a panic elsewhere must not take fan control down with it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply the hysteresis policy to the latest temperature.
    pub fn control(&self, temperature: f64) -> ReactorResult<()> {
        let mut state = self.lock();
        if temperature > state.threshold && !state.running {
            state.drive(true)?;
        } else if temperature <= state.threshold - HYSTERESIS_C && state.running {
            state.drive(false)?;
        }
        Ok(())
    }

    /// Switch the fan on. Re-asserts the output when already running.
    /// Returns whether `running` changed.
    pub fn start(&self) -> ReactorResult<bool> {
        self.lock().drive(true)
    }

    /// Switch the fan off. Re-asserts the output when already stopped.
    /// Returns whether `running` changed.
    pub fn stop(&self) -> ReactorResult<bool> {
        self.lock().drive(false)
    }

    pub fn set_threshold(&self, threshold: f64) -> ReactorResult<f64> {
        check_threshold(threshold)?;
        let mut state = self.lock();
        state.threshold = threshold;
        tracing::info!("Fan threshold set to {:.2}°C", threshold);
        Ok(threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.lock().threshold
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn snapshot(&self) -> ActuatorState {
        let state = self.lock();
        ActuatorState { pin_id: self.pin_id, threshold: state.threshold, running: state.running }
    }

    /// Release the output. Only the first call does anything; errors are
    /// logged because shutdown has to go on regardless.
    pub fn cleanup(&self) {
        let mut state = self.lock();
        if state.released {
            return;
        }
        state.released = true;
        state.running = false;
        match state.output.release() {
            Ok(()) => tracing::info!("Fan output released"),
            Err(e) => tracing::warn!("Fan output release failed: {:#}", e),
        }
    }
}

fn check_threshold(threshold: f64) -> ReactorResult<()> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(ReactorError::InvalidThreshold(threshold.to_string()))
    }
}
