//! JSON REST API for the deviation workflow.
//!
//! Exposes an axum [`Router`] backed by any [`qms_core::store::DeviationStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", qms_api::api_router(store.clone(), Duration::days(7)))
//! ```

pub mod approvals;
pub mod assessments;
pub mod deviations;
pub mod error;
pub mod reports;
pub mod transitions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use chrono::Duration;
use qms_core::store::DeviationStore;

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:          Arc<S>,
  /// How long a deviation may sit in one status before a reminder is due.
  pub reminder_after: Duration,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:          Arc::clone(&self.store),
      reminder_after: self.reminder_after,
    }
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, reminder_after: Duration) -> Router<()>
where
  S: DeviationStore + 'static,
{
  let state = AppState {
    store,
    reminder_after,
  };

  Router::new()
    // Deviations
    .route("/deviations", get(deviations::list::<S>).post(deviations::create::<S>))
    .route("/deviations/{id}", get(deviations::get_one::<S>))
    .route("/deviations/{id}/history", get(deviations::history::<S>))
    // Department review
    .route(
      "/deviations/{id}/department-review/initiate",
      post(transitions::initiate_department_review::<S>),
    )
    .route(
      "/deviations/{id}/department-review/complete",
      post(transitions::complete_department_review::<S>),
    )
    .route(
      "/deviations/{id}/department-review/retry",
      post(transitions::retry_department_review::<S>),
    )
    // CFT review
    .route(
      "/deviations/{id}/cft",
      get(transitions::cft_assignments::<S>).post(transitions::assign_cft_reviewer::<S>),
    )
    .route(
      "/deviations/{id}/cft-review/initiate",
      post(transitions::initiate_cft_review::<S>),
    )
    .route(
      "/deviations/{id}/cft-review/complete",
      post(transitions::complete_cft_review::<S>),
    )
    // QA and closure
    .route(
      "/deviations/{id}/qa-review/escalate",
      post(transitions::escalate_to_qa_review::<S>),
    )
    .route(
      "/deviations/{id}/final-approver",
      post(transitions::assign_final_approver::<S>),
    )
    .route(
      "/deviations/{id}/final-approval",
      post(transitions::grant_final_approval::<S>),
    )
    .route("/deviations/{id}/close", post(transitions::close::<S>))
    // Approval ledger
    .route(
      "/deviations/{id}/approvals",
      get(approvals::list::<S>).post(approvals::create::<S>),
    )
    .route("/deviations/{id}/approvals/verify", get(approvals::verify::<S>))
    // Assessments and investigations
    .route(
      "/deviations/{id}/assessments",
      get(assessments::list::<S>).post(assessments::create::<S>),
    )
    .route("/assessments/{id}", delete(assessments::delete_one::<S>))
    .route(
      "/deviations/{id}/investigations",
      post(assessments::record_investigation::<S>),
    )
    .route(
      "/deviations/{id}/investigation-outcome",
      post(assessments::link_outcome::<S>),
    )
    .route(
      "/investigations/{id}/outcome",
      post(assessments::capture_outcome::<S>),
    )
    // Reports
    .route("/reports/compliance", get(reports::compliance::<S>))
    .route("/reports/reminders", get(reports::reminders::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
