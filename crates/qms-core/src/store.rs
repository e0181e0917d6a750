//! The `DeviationStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `qms-store-sqlite`).
//! Higher layers (`qms-api`, `qms-server`) depend on this abstraction, not on
//! any concrete backend.
//!
//! Every status-changing method is atomic: the status write, its history
//! entry and any side writes (CFT assignment, approval record, assessment)
//! commit together or not at all. Preconditions that do not need storage are
//! checked before the backend is touched.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};

use crate::{
  Classify,
  approval::{ApprovalRecord, LedgerVerification, NewApproval, ResolvedApproval},
  assessment::{Assessment, NewAssessment},
  cft::{AssignCftReviewer, CftAssignment, CftOutcome},
  deviation::{Deviation, NewDeviation},
  investigation::{Investigation, NewInvestigation},
  lifecycle::HistoryEntry,
  report::{ComplianceQuery, ComplianceRow, ReviewReminder},
  status::DeviationStatus,
};

/// Abstraction over a deviation store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DeviationStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Deviations ────────────────────────────────────────────────────────

  /// Validate and persist a new deviation in
  /// [`DeviationStatus::PendingDepartmentReview`], assigning its number.
  fn create_deviation(
    &self,
    input: NewDeviation,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// Retrieve a deviation by id. Returns `None` if not found.
  fn get_deviation(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Deviation>, Self::Error>> + Send + '_;

  /// List deviations, optionally filtered by status, oldest first.
  fn list_deviations(
    &self,
    status: Option<DeviationStatus>,
  ) -> impl Future<Output = Result<Vec<Deviation>, Self::Error>> + Send + '_;

  // ── Department review ─────────────────────────────────────────────────

  /// `PENDING_DEPARTMENT_REVIEW → ONGOING_DEPARTMENT_REVIEW`.
  fn initiate_department_review(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// Apply the reviewer's `decision` (completed, returned or dropped) and
  /// store `comments` as the review comment. Returning or dropping requires
  /// non-empty comments, which are also kept as the history remark.
  fn complete_department_review(
    &self,
    id: i64,
    decision: DeviationStatus,
    comments: Option<String>,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// `DEVIATION_RETURNED → PENDING_DEPARTMENT_REVIEW`, recording `remarks`
  /// with the caller's timestamp.
  fn retry_department_review(
    &self,
    id: i64,
    remarks: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  // ── CFT review ────────────────────────────────────────────────────────

  /// Take the CFT branch: assign a reviewer and wait for CFT review, or skip
  /// CFT and go straight to QA.
  fn assign_cft_reviewer(
    &self,
    input: AssignCftReviewer,
  ) -> impl Future<Output = Result<CftOutcome, Self::Error>> + Send + '_;

  /// Start CFT review; `expected` is the caller's view of the current status.
  fn initiate_cft_review(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// Apply the CFT reviewer's `decision` (complete or returned). Only legal
  /// from `ONGOING_CFT_REVIEW`.
  fn complete_cft_review(
    &self,
    id: i64,
    decision: DeviationStatus,
    remarks: Option<String>,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// Return every CFT assignment made for a deviation, oldest first.
  fn cft_assignments(
    &self,
    deviation_id: i64,
  ) -> impl Future<Output = Result<Vec<CftAssignment>, Self::Error>> + Send + '_;

  // ── QA and closure ────────────────────────────────────────────────────

  /// Shortcut to `PENDING_QA_REVIEW` from a completed department or CFT
  /// review.
  fn escalate_to_qa_review(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// Resolve the pending approval `approval_id` as approved by `user_id` and
  /// move the deviation to `PENDING_FINAL_APPROVAL`.
  fn assign_final_approver(
    &self,
    deviation_id: i64,
    approval_id: i64,
    user_id: i64,
  ) -> impl Future<Output = Result<(ApprovalRecord, Deviation), Self::Error>>
  + Send
  + '_;

  /// Append the QA sign-off (must be `approved`) and move the deviation to
  /// `APPROVED_BY_QA`.
  fn grant_final_approval(
    &self,
    approval: NewApproval,
  ) -> impl Future<Output = Result<(ApprovalRecord, Deviation), Self::Error>>
  + Send
  + '_;

  /// `APPROVED_BY_QA → CLOSED`. Terminal.
  fn close_deviation(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Append an approval record. Never changes the deviation's status.
  fn record_approval(
    &self,
    approval: NewApproval,
  ) -> impl Future<Output = Result<ApprovalRecord, Self::Error>> + Send + '_;

  /// All approval records for a deviation in creation order, each with the
  /// id of the later record that resolved it.
  fn approvals(
    &self,
    deviation_id: i64,
  ) -> impl Future<Output = Result<Vec<ResolvedApproval>, Self::Error>> + Send + '_;

  /// Recompute the approval hash chain for a deviation.
  fn verify_ledger(
    &self,
    deviation_id: i64,
  ) -> impl Future<Output = Result<LedgerVerification, Self::Error>> + Send + '_;

  /// Status-change history, oldest first.
  fn history(
    &self,
    deviation_id: i64,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;

  // ── Assessments and investigations ────────────────────────────────────

  /// Insert an assessment and force the deviation to `PENDING_QA_REVIEW`.
  fn create_assessment(
    &self,
    input: NewAssessment,
  ) -> impl Future<Output = Result<(Assessment, Deviation), Self::Error>> + Send + '_;

  fn assessments(
    &self,
    deviation_id: i64,
  ) -> impl Future<Output = Result<Vec<Assessment>, Self::Error>> + Send + '_;

  /// Remove an erroneous assessment. Other assessments and the deviation's
  /// status are untouched.
  fn delete_assessment(
    &self,
    assessment_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn record_investigation(
    &self,
    input: NewInvestigation,
  ) -> impl Future<Output = Result<Investigation, Self::Error>> + Send + '_;

  /// Store investigation findings and the revised risk assessment on the
  /// deviation. No status change.
  fn link_investigation_outcome(
    &self,
    id: i64,
    findings: String,
    risk_assessment: Option<String>,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  /// Like [`Self::link_investigation_outcome`], but addressed by
  /// investigation id and recording the remediation action taken.
  fn capture_investigation_outcome(
    &self,
    investigation_id: i64,
    remediation: String,
    risk_assessment: Option<String>,
  ) -> impl Future<Output = Result<Deviation, Self::Error>> + Send + '_;

  // ── Queries ───────────────────────────────────────────────────────────

  /// Cross-entity read for compliance reporting.
  fn compliance_report<'a>(
    &'a self,
    query: &'a ComplianceQuery,
  ) -> impl Future<Output = Result<Vec<ComplianceRow>, Self::Error>> + Send + 'a;

  /// Deviations that have sat in a non-terminal status since before
  /// `as_of - stale_after`.
  fn due_reminders(
    &self,
    as_of: DateTime<Utc>,
    stale_after: Duration,
  ) -> impl Future<Output = Result<Vec<ReviewReminder>, Self::Error>> + Send + '_;
}
