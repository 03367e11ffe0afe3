//! ==============================================================================
//! monitor.rs - the bioreactor monitor loop
//! ==============================================================================
//!
//! purpose:
//!     one tick = read temperature -> read pH -> fan policy -> classify ->
//!     publish the reading -> append to history. the loop runs that tick on a
//!     fixed period in a background task until stopped.
//!
//! lifecycle:
//!
//!     new() ──start(period)──> running ──stop().await──> stopped (fan released)
//!
//!     stop() waits for the in-flight tick before releasing the fan output,
//!     so cleanup never races a relay write. it is idempotent, and concurrent
//!     callers all return only after the loop has exited. the fan is
//!     released for good, so a stopped monitor cannot be started again.
//!
//! shared state:
//!     the loop and the HTTP handlers share this struct through an Arc:
//!     - current reading: RwLock, replaced wholesale each tick
//!     - history: Mutex, appended by the loop, queried by HTTP
//!     - fan: CoolingActuator (its own mutex), driven by both sides
//!
//!     sensor reads block (file io, retry sleeps) so each tick runs on the
//!     blocking pool via spawn_blocking.
//!
//! relationships:
//!     - used by: main.rs (lifecycle), api.rs (reads + commands)
//!     - uses: temperature.rs, acidity.rs, actuator.rs, status.rs, history.rs
//!
//! ==============================================================================

use crate::acidity::AcidityProbe;
use crate::actuator::CoolingActuator;
use crate::config::ReactorConfig;
use crate::error::{ReactorError, ReactorResult};
use crate::history::{HistoryEntry, HistoryStore};
use crate::logging::TICK_TARGET;
use crate::status::{classify, AlgaeStatus};
use crate::temperature::{celsius_to_fahrenheit, TemperatureProbe};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What the reactor looked like at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub ph: Option<f64>,
    pub fan_running: bool,
    /// ISO-8601; `None` only before the first tick
    pub timestamp: Option<String>,
    pub status: AlgaeStatus,
}

impl Default for Reading {
    fn default() -> Self {
        Self {
            temperature_c: None,
            temperature_f: None,
            ph: None,
            fan_running: false,
            timestamp: None,
            status: classify(None, None),
        }
    }
}

struct Shared {
    temperature: TemperatureProbe,
    acidity: Mutex<AcidityProbe>,
    fan: CoolingActuator,
    current: RwLock<Reading>,
    history: Mutex<HistoryStore>,
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Monitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    /// held for the whole of `stop`, so every caller waits for the same join
    stopping: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn show(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

impl Shared {
    fn tick(&self) -> ReactorResult<Reading> {
        let temperature_c = self.temperature.read_celsius();
        let ph = lock(&self.acidity).read();

        if let Some(celsius) = temperature_c {
            self.fan.control(celsius)?;
        }
        let status = classify(temperature_c, ph);

        let now = chrono::Local::now();
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, false);
        let reading = Reading {
            temperature_c: temperature_c.map(round2),
            temperature_f: temperature_c.map(celsius_to_fahrenheit).map(round2),
            ph: ph.map(round2),
            fan_running: self.fan.is_running(),
            timestamp: Some(timestamp.clone()),
            status,
        };

        *self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = reading.clone();
        lock(&self.history).append(HistoryEntry {
            epoch_ms: now.timestamp_millis(),
            timestamp,
            temperature_c: reading.temperature_c,
            ph: reading.ph,
            fan_running: reading.fan_running,
        });

        tracing::info!(
            target: TICK_TARGET,
            "T: {}°C, pH: {}, Fan: {}, Status: {}",
            show(reading.temperature_c),
            show(reading.ph),
            reading.fan_running,
            reading.status.message
        );
        Ok(reading)
    }
}

impl Monitor {
    /// Build the probes and the fan from config. Nothing runs until `start`.
    pub fn new(config: &ReactorConfig) -> anyhow::Result<Self> {
        let fan = CoolingActuator::from_config(&config.fan)?;
        let monitor = Self::from_parts(
            TemperatureProbe::discover(&config.temperature),
            AcidityProbe::from_config(&config.ph),
            fan,
        );
        tracing::info!("Bioreactor monitor initialized");
        Ok(monitor)
    }

    pub fn from_parts(temperature: TemperatureProbe, acidity: AcidityProbe, fan: CoolingActuator) -> Self {
        Self {
            shared: Arc::new(Shared {
                temperature,
                acidity: Mutex::new(acidity),
                fan,
                current: RwLock::new(Reading::default()),
                history: Mutex::new(HistoryStore::default()),
            }),
            worker: Mutex::new(None),
            stopping: tokio::sync::Mutex::new(()),
        }
    }

    /// Run a single tick on the calling thread. Blocking.
    #[allow(dead_code)]
    pub fn tick(&self) -> ReactorResult<Reading> {
        self.shared.tick()
    }

    /// Spawn the background loop. Must be called from inside a tokio runtime.
    pub fn start(&self, period: Duration) -> ReactorResult<()> {
        if period.is_zero() {
            return Err(ReactorError::InvalidInterval(format!("{:?}", period)));
        }
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(ReactorError::AlreadyRunning);
        }
        if self.shared.fan.is_released() {
            return Err(ReactorError::ActuatorReleased);
        }

        let (shutdown, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_loop(self.shared.clone(), period, stop_rx));
        *worker = Some(Worker { shutdown, handle });
        tracing::info!("Monitoring started ({:?} interval)", period);
        Ok(())
    }

    /// Stop the loop, wait for the last tick, release the fan. Idempotent.
    pub async fn stop(&self) {
        let _stopping = self.stopping.lock().await;
        let worker = lock(&self.worker).take();
        if let Some(Worker { shutdown, handle }) = worker {
            // the loop may already be gone; the join below covers that
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                tracing::error!("Monitoring loop ended abnormally: {}", e);
            }
        }
        self.shared.fan.cleanup();
        tracing::info!("Monitoring stopped");
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    pub fn current(&self) -> Reading {
        self.shared.current.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn history(&self, minutes: i64) -> Vec<HistoryEntry> {
        lock(&self.shared.history).query(minutes)
    }

    pub fn fan(&self) -> &CoolingActuator {
        &self.shared.fan
    }

    pub fn calibrate_ph(&self, known_ph: f64, measured_ph: f64) -> ReactorResult<f64> {
        lock(&self.shared.acidity).calibrate(known_ph, measured_ph)
    }

    #[allow(dead_code)]
    pub fn ph_offset(&self) -> f64 {
        lock(&self.shared.acidity).offset()
    }
}

async fn run_loop(shared: Arc<Shared>, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(period);
    // a slow sensor read delays the schedule instead of bunching ticks up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let tick_shared = shared.clone();
                match tokio::task::spawn_blocking(move || tick_shared.tick()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!("Error in monitoring loop: {}", e),
                    Err(e) => tracing::error!("Monitoring tick panicked: {}", e),
                }
            }
        }
    }
    tracing::debug!("Monitoring loop exited");
}
