use crate::api::responses::{
    BaysSuccessResponse, ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse,
};
use crate::state::{AppState, LotSnapshot};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const NO_DATA_MESSAGE: &str = "No lot snapshot available";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum BaysResponse {
    Success(BaysSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for BaysResponse {
    fn into_response(self) -> Response {
        match self {
            BaysResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            BaysResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_bays(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_bays_response(state, SystemTime::now())
}

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

pub enum StatusTextResponse {
    Success(String),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for StatusTextResponse {
    fn into_response(self) -> Response {
        match self {
            StatusTextResponse::Success(text) => (StatusCode::OK, text).into_response(),
            StatusTextResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_status(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_status_response(state, SystemTime::now())
}

fn read_snapshot(state: &Arc<RwLock<AppState>>) -> Result<Option<LotSnapshot>, ()> {
    let guard = state.read().map_err(|_| ())?;
    Ok(guard.snapshot().cloned())
}

fn build_bays_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> BaysResponse {
    let snapshot = match read_snapshot(&state) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            return match no_data_body(now) {
                Ok(body) => BaysResponse::Error {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body,
                },
                Err(_) => {
                    let (status, body) = internal_error("/api/bays", "timestamp formatting failure");
                    BaysResponse::Error { status, body }
                }
            };
        }
        Err(()) => {
            let (status, body) =
                internal_error("/api/bays", "state lock poisoned while reading snapshot");
            return BaysResponse::Error { status, body };
        }
    };

    match format_timestamp(snapshot.timestamp) {
        Ok(timestamp) => BaysResponse::Success(BaysSuccessResponse {
            free_count: snapshot.free_count(),
            bays: snapshot.bays,
            phase: snapshot.phase,
            notice: snapshot.notice,
            timestamp,
        }),
        Err(_err) => {
            let (status, body) = internal_error("/api/bays", "timestamp formatting failure");
            BaysResponse::Error { status, body }
        }
    }
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let snapshot = match read_snapshot(&state) {
        Ok(snapshot) => snapshot,
        Err(()) => {
            let (status, body) =
                internal_error("/api/health", "state lock poisoned while reading snapshot");
            return HealthResponse::Error { status, body };
        }
    };

    let health = derive_health_status(snapshot.as_ref());
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            let (status, body) = internal_error("/api/health", "timestamp formatting failure");
            return HealthResponse::Error { status, body };
        }
    };

    let status_code = match health {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status: health,
            timestamp,
        },
    }
}

fn derive_health_status(snapshot: Option<&LotSnapshot>) -> HealthStatus {
    let Some(snapshot) = snapshot else {
        return HealthStatus::Ko;
    };
    let unknown = snapshot.unknown_count();
    if snapshot.bays.is_empty() || unknown == snapshot.bays.len() {
        return HealthStatus::Ko;
    }
    if unknown > 0 || snapshot.fault_pending {
        return HealthStatus::Degraded;
    }
    HealthStatus::Ok
}

fn build_status_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> StatusTextResponse {
    match read_snapshot(&state) {
        Ok(Some(snapshot)) => StatusTextResponse::Success(snapshot.status_text),
        Ok(None) => match no_data_body(now) {
            Ok(body) => StatusTextResponse::Error {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body,
            },
            Err(_) => {
                let (status, body) =
                    internal_error("/api/status", "timestamp formatting failure");
                StatusTextResponse::Error { status, body }
            }
        },
        Err(()) => {
            let (status, body) =
                internal_error("/api/status", "state lock poisoned while reading snapshot");
            StatusTextResponse::Error { status, body }
        }
    }
}

fn no_data_body(now: SystemTime) -> Result<ErrorResponse, TimestampError> {
    Ok(ErrorResponse {
        error_code: ErrorCode::NoData,
        error_message: NO_DATA_MESSAGE.to_string(),
        timestamp: format_timestamp(now)?,
    })
}

fn internal_error(endpoint: &str, message: &str) -> (StatusCode, ErrorResponse) {
    error!(endpoint, message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    )
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
