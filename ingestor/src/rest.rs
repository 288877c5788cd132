use crate::db::recent_readings;
use crate::model::ReadingsResponse;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::error;

const DEFAULT_WINDOW_MINUTES: i64 = 60;
const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;
const DEFAULT_LIMIT: i64 = 1000;
const MAX_LIMIT: i64 = 10_000;

#[derive(Debug, Clone)]
struct AppState {
    pool: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    minutes: Option<i64>,
    device_id: Option<String>,
    limit: Option<i64>,
}

impl ReadingsQuery {
    fn window_minutes(&self) -> i64 {
        self.minutes
            .unwrap_or(DEFAULT_WINDOW_MINUTES)
            .clamp(1, MAX_WINDOW_MINUTES)
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub fn create_router(pool: PgPool) -> Router {
    let state = AppState { pool };

    Router::new()
        .route("/api/v1/readings", get(get_readings))
        .with_state(state)
}

async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<ReadingsResponse>, AppError> {
    let window_minutes = params.window_minutes();
    let since = (Utc::now() - Duration::minutes(window_minutes)).naive_utc();

    let data = recent_readings(
        &state.pool,
        since,
        params.device_id.as_deref(),
        params.limit(),
    )
    .await
    .map_err(|e| AppError(anyhow::anyhow!("Database query failed: {}", e)))?;

    Ok(Json(ReadingsResponse {
        total: data.len(),
        data,
        window_minutes,
    }))
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}
