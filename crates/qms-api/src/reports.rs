//! Read-only reporting endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/reports/compliance` | Optional `deviation_id`, `start_date`, `end_date`, `approval_date` |
//! | `GET`  | `/reports/reminders` | Optional `as_of` (RFC 3339); defaults to now |

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use qms_core::{
  report::{ComplianceQuery, ComplianceRow, ReviewReminder},
  store::DeviationStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// `GET /reports/compliance`
pub async fn compliance<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Query(query): Query<ComplianceQuery>,
) -> Result<Json<Vec<ComplianceRow>>, ApiError> {
  let rows = state
    .store
    .compliance_report(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ReminderParams {
  pub as_of: Option<DateTime<Utc>>,
}

/// `GET /reports/reminders[?as_of=<rfc3339>]`
pub async fn reminders<S: DeviationStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ReminderParams>,
) -> Result<Json<Vec<ReviewReminder>>, ApiError> {
  let as_of = params.as_of.unwrap_or_else(Utc::now);
  let due = state
    .store
    .due_reminders(as_of, state.reminder_after)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(due))
}
