//! Handlers for assessments and investigation outcomes.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/deviations/:id/assessments` | |
//! | `POST`   | `/deviations/:id/assessments` | Body: [`NewAssessment`]; forces pending QA review |
//! | `DELETE` | `/assessments/:id` | 204 |
//! | `POST`   | `/deviations/:id/investigations` | Body: `{"summary":"..."}` |
//! | `POST`   | `/deviations/:id/investigation-outcome` | Body: [`FindingsBody`] |
//! | `POST`   | `/investigations/:id/outcome` | Body: [`RemediationBody`] |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use qms_core::{
  assessment::{Assessment, NewAssessment},
  deviation::Deviation,
  investigation::NewInvestigation,
  store::DeviationStore,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Assessments ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AssessmentOutcome {
  pub assessment: Assessment,
  pub deviation:  Deviation,
}

pub async fn list<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<Assessment>>, ApiError> {
  let assessments = state.store.assessments(id).await.map_err(ApiError::store)?;
  Ok(Json(assessments))
}

pub async fn create<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(mut body): Json<NewAssessment>,
) -> Result<impl IntoResponse, ApiError> {
  body.deviation_id = id;
  let (assessment, deviation) = state
    .store
    .create_assessment(body)
    .await
    .map_err(ApiError::store)?;
  Ok((
    StatusCode::CREATED,
    Json(AssessmentOutcome {
      assessment,
      deviation,
    }),
  ))
}

pub async fn delete_one<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  state
    .store
    .delete_assessment(id)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Investigations ──────────────────────────────────────────────────────────

pub async fn record_investigation<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(mut body): Json<NewInvestigation>,
) -> Result<impl IntoResponse, ApiError> {
  body.deviation_id = id;
  let investigation = state
    .store
    .record_investigation(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(investigation)))
}

#[derive(Debug, Deserialize)]
pub struct FindingsBody {
  pub findings:        String,
  /// Absent keeps the current risk assessment.
  pub risk_assessment: Option<String>,
}

pub async fn link_outcome<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<FindingsBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .link_investigation_outcome(id, body.findings, body.risk_assessment)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}

#[derive(Debug, Deserialize)]
pub struct RemediationBody {
  pub remediation:     String,
  pub risk_assessment: Option<String>,
}

pub async fn capture_outcome<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Path(investigation_id): Path<i64>,
  Json(body): Json<RemediationBody>,
) -> Result<Json<Deviation>, ApiError> {
  let deviation = state
    .store
    .capture_investigation_outcome(
      investigation_id,
      body.remediation,
      body.risk_assessment,
    )
    .await
    .map_err(ApiError::store)?;
  Ok(Json(deviation))
}
