//! Handlers for the approval ledger.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/deviations/:id/approvals` | Records with their resolving entry |
//! | `POST` | `/deviations/:id/approvals` | Body: [`NewApproval`]; returns 201 |
//! | `GET`  | `/deviations/:id/approvals/verify` | Hash-chain check |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use qms_core::{
  approval::{LedgerVerification, NewApproval, ResolvedApproval},
  store::DeviationStore,
};

use crate::{AppState, error::ApiError};

pub async fn list<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<ResolvedApproval>>, ApiError> {
  let approvals = state.store.approvals(id).await.map_err(ApiError::store)?;
  Ok(Json(approvals))
}

/// Appending never changes the deviation's status.
pub async fn create<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(mut body): Json<NewApproval>,
) -> Result<impl IntoResponse, ApiError> {
  body.deviation_id = id;
  let record = state
    .store
    .record_approval(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

pub async fn verify<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<LedgerVerification>, ApiError> {
  let verification = state
    .store
    .verify_ledger(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(verification))
}
