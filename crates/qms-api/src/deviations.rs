//! Handlers for `/deviations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/deviations` | Optional `?status=PENDING_QA_REVIEW` |
//! | `POST` | `/deviations` | Body: [`NewDeviation`]; returns 201 |
//! | `GET`  | `/deviations/:id` | 404 if not found |
//! | `GET`  | `/deviations/:id/history` | Status changes, oldest first |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use qms_core::{
  deviation::{Deviation, NewDeviation},
  lifecycle::HistoryEntry,
  status::DeviationStatus,
  store::DeviationStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<DeviationStatus>,
}

/// `GET /deviations[?status=<status>]`
pub async fn list<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Deviation>>, ApiError> {
  let deviations = state
    .store
    .list_deviations(params.status)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviations))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /deviations`. Returns 201 and the stored deviation.
pub async fn create<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewDeviation>,
) -> Result<impl IntoResponse, ApiError> {
  let deviation = state
    .store
    .create_deviation(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(deviation)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /deviations/:id`
pub async fn get_one<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .get_deviation(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("deviation {id} not found")))?;
  Ok(Json(deviation))
}

/// `GET /deviations/:id/history`
pub async fn history<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
  let entries = state.store.history(id).await.map_err(ApiError::store)?;
  Ok(Json(entries))
}
