//! ==============================================================================
//! error.rs - monitor error taxonomy
//! ==============================================================================
//!
//! purpose:
//!     one error type for everything a caller of the monitor can get back.
//!     sensor dropouts are NOT errors (they surface as absent fields in a
//!     reading), so nothing here is raised for a missing temperature.
//!
//! relationships:
//!     - raised by: actuator.rs, monitor.rs, acidity.rs
//!     - rendered by: api.rs (IntoResponse -> json `{ "error": .. }`)
//!
//! ==============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    /// fan threshold was not a finite number
    #[error("fan_temp_threshold must be a finite number, got {0}")]
    InvalidThreshold(String),

    /// fan command other than start/stop
    #[error("Invalid action {0:?}. Use 'start' or 'stop'.")]
    InvalidAction(String),

    #[error("invalid pH calibration: {0}")]
    InvalidCalibration(String),

    #[error("polling interval must be positive, got {0}")]
    InvalidInterval(String),

    #[error("monitor is already running")]
    AlreadyRunning,

    /// the fan output was cleaned up at shutdown and can no longer be driven
    #[error("fan actuator has been released")]
    ActuatorReleased,

    /// relay or bus failure reported by the HAL
    #[error(transparent)]
    Hardware(#[from] anyhow::Error),
}

pub type ReactorResult<T> = Result<T, ReactorError>;

impl ReactorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReactorError::InvalidThreshold(_)
            | ReactorError::InvalidAction(_)
            | ReactorError::InvalidCalibration(_)
            | ReactorError::InvalidInterval(_) => StatusCode::BAD_REQUEST,
            ReactorError::AlreadyRunning | ReactorError::ActuatorReleased => StatusCode::CONFLICT,
            ReactorError::Hardware(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReactorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}
