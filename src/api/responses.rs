use crate::state::BaySnapshot;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BaysSuccessResponse {
    pub bays: Vec<BaySnapshot>,
    pub phase: String,
    pub free_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoData,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Occupancy;
    use serde_json::json;

    #[test]
    fn bays_response_serializes_lowercase_occupancy() {
        let response = BaysSuccessResponse {
            bays: vec![BaySnapshot {
                index: 2,
                occupancy: Occupancy::Occupied,
                angle: 150,
                duration_secs: 61,
                timer_running: true,
            }],
            phase: "IDLE".to_string(),
            free_count: 0,
            notice: None,
            timestamp: "2026-01-11T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize bays response");
        assert_eq!(
            value,
            json!({
                "bays": [{
                    "index": 2,
                    "occupancy": "occupied",
                    "angle": 150,
                    "duration_secs": 61,
                    "timer_running": true
                }],
                "phase": "IDLE",
                "free_count": 0,
                "timestamp": "2026-01-11T12:30:00Z"
            })
        );
    }

    #[test]
    fn error_response_uses_screaming_error_code() {
        let response = ErrorResponse {
            error_code: ErrorCode::NoData,
            error_message: "No lot snapshot available".to_string(),
            timestamp: "2026-01-11T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(value["error_code"], "NO_DATA");
    }
}
