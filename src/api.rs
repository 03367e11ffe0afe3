//! ==============================================================================
//! api.rs - json http api
//! ==============================================================================
//!
//! routes:
//!     GET  /api/status              current reading
//!     GET  /api/history?minutes=N   { minutes, data } (default 30, clamped 1..=1440)
//!     POST /api/fan                 { "action": "start" | "stop" } -> { fan_running }
//!     GET  /api/config              { fan_temp_threshold, fan_pin, fan_running }
//!     POST /api/config              { "fan_temp_threshold": 27.5 } -> echo
//!     POST /api/ph/calibrate        { known_ph, measured_ph } -> { calibration_offset }
//!
//! bodies are parsed leniently: a body that is not json is treated as `{}`,
//! so the handler answers with its normal "missing field" behaviour instead
//! of a framework rejection.
//!
//! ==============================================================================

use crate::error::{ReactorError, ReactorResult};
use crate::history::{clamp_window, HistoryEntry, DEFAULT_WINDOW_MINUTES};
use crate::monitor::{Monitor, Reading};

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub fn router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/api/fan", post(fan_handler))
        .route("/api/config", get(get_config_handler).post(set_config_handler))
        .route("/api/ph/calibrate", post(calibrate_handler))
        .layer(CorsLayer::permissive())
        .with_state(monitor)
}

fn lenient_json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

async fn status_handler(State(monitor): State<Arc<Monitor>>) -> Json<Reading> {
    Json(monitor.current())
}

#[derive(Deserialize)]
struct HistoryParams {
    minutes: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    minutes: i64,
    data: Vec<HistoryEntry>,
}

async fn history_handler(
    State(monitor): State<Arc<Monitor>>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryResponse> {
    let requested = params
        .minutes
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_WINDOW_MINUTES);
    let minutes = clamp_window(requested);
    Json(HistoryResponse { minutes, data: monitor.history(minutes) })
}

async fn fan_handler(State(monitor): State<Arc<Monitor>>, body: Bytes) -> ReactorResult<Json<Value>> {
    let body = lenient_json(&body);
    let action = body.get("action").and_then(Value::as_str).unwrap_or("").to_lowercase();
    match action.as_str() {
        "start" => monitor.fan().start()?,
        "stop" => monitor.fan().stop()?,
        _ => return Err(ReactorError::InvalidAction(action)),
    };
    Ok(Json(json!({ "fan_running": monitor.fan().is_running() })))
}

async fn get_config_handler(State(monitor): State<Arc<Monitor>>) -> Json<Value> {
    let fan = monitor.fan().snapshot();
    Json(json!({
        "fan_temp_threshold": fan.threshold,
        "fan_pin": fan.pin_id,
        "fan_running": fan.running,
    }))
}

/// Accepts a number or a numeric string.
fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn set_config_handler(State(monitor): State<Arc<Monitor>>, body: Bytes) -> ReactorResult<Json<Value>> {
    let body = lenient_json(&body);
    if let Some(raw) = body.get("fan_temp_threshold") {
        let threshold = number_field(raw).ok_or_else(|| ReactorError::InvalidThreshold(raw.to_string()))?;
        monitor.fan().set_threshold(threshold)?;
    }
    Ok(Json(json!({ "fan_temp_threshold": monitor.fan().threshold() })))
}

async fn calibrate_handler(State(monitor): State<Arc<Monitor>>, body: Bytes) -> ReactorResult<Json<Value>> {
    let body = lenient_json(&body);
    let field = |name: &str| {
        body.get(name)
            .and_then(number_field)
            .ok_or_else(|| ReactorError::InvalidCalibration(format!("{} must be a number", name)))
    };
    let offset = monitor.calibrate_ph(field("known_ph")?, field("measured_ph")?)?;
    Ok(Json(json!({ "calibration_offset": offset })))
}
