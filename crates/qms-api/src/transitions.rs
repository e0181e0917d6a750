//! Handlers that move a deviation through its review lifecycle.
//!
//! Every endpoint is a `POST` under `/deviations/:id/` and returns the
//! updated deviation. Bodies that carry `expected` name the status the caller
//! last saw; if the deviation has moved since, the response is 409.
//!
//! | Path | Body |
//! |------|------|
//! | `department-review/initiate` | [`ExpectedBody`] |
//! | `department-review/complete` | [`DecisionBody`] |
//! | `department-review/retry` | [`RetryBody`] |
//! | `cft` | [`AssignCftReviewer`]; `GET` lists assignments |
//! | `cft-review/initiate` | [`ExpectedBody`] |
//! | `cft-review/complete` | [`DecisionBody`] |
//! | `qa-review/escalate` | [`ExpectedBody`] |
//! | `final-approver` | [`FinalApproverBody`] |
//! | `final-approval` | [`NewApproval`] |
//! | `close` | [`ExpectedBody`] |

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use qms_core::{
  approval::{ApprovalRecord, NewApproval},
  cft::{AssignCftReviewer, CftAssignment, CftOutcome},
  deviation::Deviation,
  status::DeviationStatus,
  store::DeviationStore,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Bodies ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExpectedBody {
  pub expected: DeviationStatus,
}

/// A reviewer's outcome. `comments` doubles as the justification when the
/// outcome is a return or a drop.
#[derive(Debug, Deserialize)]
pub struct DecisionBody {
  pub decision: DeviationStatus,
  #[serde(alias = "remarks")]
  pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetryBody {
  pub remarks: String,
  /// Defaults to the time of the request.
  pub at:      Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct FinalApproverBody {
  pub approval_id: i64,
  pub user_id:     i64,
}

/// Response for operations that append to the approval ledger.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalOutcome {
  pub approval:  ApprovalRecord,
  pub deviation: Deviation,
}

// ─── Department review ───────────────────────────────────────────────────────

pub async fn initiate_department_review<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<ExpectedBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .initiate_department_review(id, body.expected)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

pub async fn complete_department_review<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<DecisionBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .complete_department_review(id, body.decision, body.comments)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

pub async fn retry_department_review<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<RetryBody>,
) -> Result<Json<Deviation>, ApiError> {
  let at = body.at.unwrap_or_else(Utc::now);
  let deviation = state
    .store
    .retry_department_review(id, body.remarks, at)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

// ─── CFT review ──────────────────────────────────────────────────────────────

/// `POST /deviations/:id/cft`. The path id overrides any `deviation_id` in
/// the body.
pub async fn assign_cft_reviewer<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(mut body): Json<AssignCftReviewer>,
) -> Result<Json<CftOutcome>, ApiError> {
  body.deviation_id = id;
  let outcome = state
    .store
    .assign_cft_reviewer(body)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}

pub async fn cft_assignments<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<CftAssignment>>, ApiError> {
  let assignments = state
    .store
    .cft_assignments(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(assignments))
}

pub async fn initiate_cft_review<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<ExpectedBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .initiate_cft_review(id, body.expected)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

pub async fn complete_cft_review<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<DecisionBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .complete_cft_review(id, body.decision, body.comments)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

// ─── QA and closure ──────────────────────────────────────────────────────────

pub async fn escalate_to_qa_review<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<ExpectedBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .escalate_to_qa_review(id, body.expected)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

pub async fn assign_final_approver<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<FinalApproverBody>,
) -> Result<Json<ApprovalOutcome>, ApiError> {
  let (approval, deviation) = state
    .store
    .assign_final_approver(id, body.approval_id, body.user_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(ApprovalOutcome {
    approval,
    deviation,
  }))
}

pub async fn grant_final_approval<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(mut body): Json<NewApproval>,
) -> Result<Json<ApprovalOutcome>, ApiError> {
  body.deviation_id = id;
  let (approval, deviation) = state
    .store
    .grant_final_approval(body)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(ApprovalOutcome {
    approval,
    deviation,
  }))
}

pub async fn close<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<ExpectedBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .close_deviation(id, body.expected)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}
