//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the two peripherals the bioreactor
//!     drives directly: the fan relay (one GPIO output) and the pH probe ADC
//!     (an MCP3008 on SPI). abstracts away the difference between running on a
//!     real Raspberry Pi (using `rppal`) and a development machine (simulated).
//!
//! design philosophy:
//!     - "Compile Anywhere": without feature="hardware" nothing links rppal.
//!     - "Pick at construction": the monitor asks for a pin once and never
//!       checks again which variant it got.
//!
//! relationships:
//!     - used by: actuator.rs (OutputPin), acidity.rs (AdcChannel)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single binary output. `on` is the logical level (fan running); any
/// relay polarity is handled by the implementation.
pub trait OutputPin: Send {
    fn set_level(&mut self, on: bool) -> Result<()>;
    /// Give the pin back to the system. Called at most once by the owner.
    fn release(&mut self) -> Result<()>;
    fn describe(&self) -> String;
}

/// A single analog input, already scaled to millivolts.
pub trait AdcChannel: Send {
    fn read_millivolts(&mut self) -> Result<f64>;
}

// ==============================================================================================
// SIMULATED IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================

/// Observable state of a [`SimulatedPin`], shared with whoever wants to look.
#[derive(Debug, Default)]
pub struct SimulatedPinState {
    level: AtomicBool,
    writes: AtomicUsize,
    releases: AtomicUsize,
    fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl SimulatedPinState {
    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Make every following write (and release) fail, like a relay board that
    /// dropped off the bus.
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

pub struct SimulatedPin {
    pin: u8,
    state: Arc<SimulatedPinState>,
}

impl SimulatedPin {
    pub fn new(pin: u8) -> Self {
        Self { pin, state: Arc::new(SimulatedPinState::default()) }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> Arc<SimulatedPinState> {
        self.state.clone()
    }
}

impl OutputPin for SimulatedPin {
    fn set_level(&mut self, on: bool) -> Result<()> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated write failure on GPIO {}", self.pin);
        }
        tracing::info!("[MOCK GPIO] Pin {} set to {}", self.pin, if on { "HIGH" } else { "LOW" });
        self.state.level.store(on, Ordering::SeqCst);
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated release failure on GPIO {}", self.pin);
        }
        self.state.level.store(false, Ordering::SeqCst);
        tracing::debug!("[MOCK GPIO] Pin {} released", self.pin);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated GPIO {}", self.pin)
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub struct RelayPin {
    pin: u8,
    active_low: bool,
    output: Option<rppal::gpio::OutputPin>,
}

#[cfg(feature = "hardware")]
impl RelayPin {
    pub fn open(pin: u8, active_low: bool) -> Result<Self> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new()?;
        let mut output = gpio.get(pin)?.into_output();
        // the relay must keep its level between our writes
        output.set_reset_on_drop(false);
        let mut relay = Self { pin, active_low, output: Some(output) };
        relay.set_level(false)?;
        Ok(relay)
    }
}

#[cfg(feature = "hardware")]
impl OutputPin for RelayPin {
    fn set_level(&mut self, on: bool) -> Result<()> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("GPIO {} already released", self.pin))?;
        // active-low relay: LOW = relay ON
        if on != self.active_low {
            output.set_high();
        } else {
            output.set_low();
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut output) = self.output.take() {
            if self.active_low {
                output.set_high();
            } else {
                output.set_low();
            }
            // hand the line back as an input on drop
            output.set_reset_on_drop(true);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("rppal GPIO {}{}", self.pin, if self.active_low { " (active low)" } else { "" })
    }
}

/// MCP3008 10-bit ADC on SPI0/CE0, single-ended channel.
#[cfg(feature = "hardware")]
pub struct Mcp3008 {
    spi: rppal::spi::Spi,
    channel: u8,
    vref: f64,
}

#[cfg(feature = "hardware")]
impl Mcp3008 {
    pub fn open(channel: u8, vref: f64) -> Result<Self> {
        use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_350_000, Mode::Mode0)?;
        Ok(Self { spi, channel, vref })
    }
}

#[cfg(feature = "hardware")]
impl AdcChannel for Mcp3008 {
    fn read_millivolts(&mut self) -> Result<f64> {
        let command = mcp3008_command(self.channel);
        let mut response = [0u8; 3];
        self.spi.transfer(&mut response, &command)?;
        Ok(mcp3008_millivolts(response, self.vref).1)
    }
}

#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
/// Single-ended read command: start bit, then SGL=1 + channel in the high nibble.
pub fn mcp3008_command(channel: u8) -> [u8; 3] {
    [1, (8 + (channel & 0x07)) << 4, 0]
}

#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
/// Decode a 3-byte MCP3008 response into `(raw 0..=1023, millivolts)`.
pub fn mcp3008_millivolts(response: [u8; 3], vref: f64) -> (u16, f64) {
    let raw = (((response[1] & 0x03) as u16) << 8) | response[2] as u16;
    let mv = raw as f64 * vref / 1023.0 * 1000.0;
    (raw, mv)
}

// ==============================================================================================
// CONSTRUCTION
// ==============================================================================================

/// Open the fan output: the relay on a Pi, otherwise a simulated pin.
pub fn open_output_pin(pin: u8, active_low: bool) -> Box<dyn OutputPin> {
    #[cfg(feature = "hardware")]
    {
        match RelayPin::open(pin, active_low) {
            Ok(relay) => {
                tracing::info!("Using REAL HARDWARE HAL (rppal) for fan on GPIO {}", pin);
                return Box::new(relay);
            }
            Err(e) => {
                tracing::warn!("GPIO {} unavailable ({:#}), falling back to simulation", pin, e);
            }
        }
    }
    #[cfg(not(feature = "hardware"))]
    let _ = active_low;

    tracing::info!("Using MOCK HAL for fan on GPIO {} (no hardware access)", pin);
    Box::new(SimulatedPin::new(pin))
}

/// Open the pH ADC. Fails when built without hardware support or when SPI is
/// not available.
pub fn open_ph_adc() -> Result<Box<dyn AdcChannel>> {
    #[cfg(feature = "hardware")]
    {
        let adc = Mcp3008::open(0, 3.3)?;
        tracing::info!("pH ADC: MCP3008 channel 0 on SPI0/CE0");
        Ok(Box::new(adc))
    }
    #[cfg(not(feature = "hardware"))]
    {
        anyhow::bail!("built without the \"hardware\" feature")
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp3008_decode() {
        assert_eq!(mcp3008_command(0), [1, 0x80, 0]);
        assert_eq!(mcp3008_command(3), [1, 0xB0, 0]);

        // upper bits of byte 1 are noise and must be masked off
        let (raw, mv) = mcp3008_millivolts([0xFF, 0xFE, 0x00], 3.3);
        assert_eq!(raw, 512);
        assert!((mv - 1651.613).abs() < 0.01);

        let (raw, mv) = mcp3008_millivolts([0, 0x03, 0xFF], 3.3);
        assert_eq!(raw, 1023);
        assert!((mv - 3300.0).abs() < 1e-9);
    }

    #[test]
    fn test_simulated_pin_tracks_level() {
        let mut pin = SimulatedPin::new(18);
        let state = pin.state();

        pin.set_level(true).unwrap();
        assert!(state.level());
        pin.release().unwrap();
        assert!(!state.level());
        assert_eq!(state.writes(), 1);
        assert_eq!(state.releases(), 1);

        state.set_failing(true);
        assert!(pin.set_level(true).is_err());
        assert!(!state.level());
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_software_build_has_no_adc() {
        assert!(open_ph_adc().is_err());
    }
}
