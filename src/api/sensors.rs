use crate::directory::{SensorDirectory, SensorStatus};
use crate::reset::{ResetCoordinator, ResetError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Shared state for the sensor query/reset API
pub struct SensorAppState {
    pub directory: Arc<SensorDirectory>,
    pub reset: Arc<ResetCoordinator>,
}

/// Sensor response (dashboard listing shape)
#[derive(Serialize)]
pub struct SensorResponse {
    pub id: i64,
    pub location: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub ip: Option<String>,
    pub status: SensorStatus,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create sensor API router
pub fn create_sensor_router(state: Arc<SensorAppState>) -> Router {
    Router::new()
        .route("/api/sensors", get(list_sensors))
        .route("/api/sensors/:id/reset", post(reset_sensor))
        .with_state(state)
}

/// GET /api/sensors - all sensors that have reported at least once,
/// ordered by location ascending
async fn list_sensors(
    State(state): State<Arc<SensorAppState>>,
) -> Result<Json<Vec<SensorResponse>>, ApiError> {
    let records = state.directory.list_reported().map_err(ApiError::Internal)?;

    let response: Vec<SensorResponse> = records
        .into_iter()
        .map(|record| SensorResponse {
            id: record.id,
            location: record.location,
            sensor_type: record.sensor_type,
            ip: record.ip,
            status: record.status,
            updated_at: record.updated_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(response))
}

/// POST /api/sensors/:id/reset - command the device to reinitialize and
/// deregister its record
async fn reset_sensor(
    State(state): State<Arc<SensorAppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    match state.reset.reset(id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(ResetError::NotFound(_)) => Err(ApiError::NotFound(id)),
        Err(ResetError::Other(e)) => Err(ApiError::Internal(e)),
    }
}

/// Sensor API error types
#[derive(Debug)]
enum ApiError {
    NotFound(i64),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("sensor {} not found", id),
                }),
            )
                .into_response(),
            ApiError::Internal(e) => {
                error!(error = %e, "Sensor API request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "internal error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
