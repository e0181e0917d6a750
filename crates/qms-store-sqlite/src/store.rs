//! [`SqliteStore`], the SQLite implementation of [`DeviationStore`].

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior, params};
use tracing::{debug, info, warn};

use qms_core::{
  Classify, ErrorKind,
  approval::{
    ApprovalRecord, ApprovalStatus, LedgerVerification, NewApproval,
    ResolvedApproval, first_broken_link,
  },
  assessment::{Assessment, NewAssessment},
  cft::{AssignCftReviewer, CftAssignment, CftDecision, CftOutcome},
  deviation::{Deviation, NewDeviation},
  investigation::{Investigation, NewInvestigation},
  lifecycle::{HistoryEntry, TransitionCommand, assessment_triggers_qa_escalation},
  report::{ComplianceQuery, ComplianceRow, ReviewReminder},
  status::{DeviationStatus, Transition},
  store::DeviationStore,
};

use crate::{
  Error, Result,
  encode::{APPROVAL_COLUMNS, DEVIATION_COLUMNS, RawApproval, RawDeviation, encode_date},
  ops,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A deviation store backed by a single SQLite file.
///
/// Clones share one connection thread.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside a `BEGIN IMMEDIATE` transaction. The transaction commits
  /// only if `f` succeeds; any error rolls back every write it made.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = f(&*tx);
        if outcome.is_ok() {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(&*conn))).await?
  }

  /// Apply `cmd` to deviation `id` and run `side` in the same transaction,
  /// after the status write. `side` sees the updated deviation.
  async fn transition_with<R, F>(
    &self,
    id: i64,
    cmd: TransitionCommand,
    side: F,
  ) -> Result<(Deviation, R)>
  where
    F: FnOnce(&Connection, &Deviation, DateTime<Utc>) -> Result<R>
      + Send
      + 'static,
    R: Send + 'static,
  {
    let transition = cmd.transition;
    if let Err(e) = cmd.validate(id) {
      debug!(deviation_id = id, %transition, error = %e, "transition rejected");
      return Err(e.into());
    }

    let at = cmd.at.unwrap_or_else(Utc::now);
    let result = self
      .write(move |conn| {
        let updated = ops::apply_transition(conn, id, &cmd, at)?;
        let extra = side(conn, &updated, at)?;
        Ok((ops::require_deviation(conn, id)?, extra))
      })
      .await;

    match &result {
      Ok((deviation, _)) => info!(
        deviation_id = id,
        %transition,
        status = %deviation.status,
        version = deviation.version,
        "status changed"
      ),
      Err(e) if e.kind() == ErrorKind::Storage => {
        warn!(deviation_id = id, %transition, error = %e, "transition rolled back")
      }
      Err(e) => {
        debug!(deviation_id = id, %transition, error = %e, "transition rejected")
      }
    }
    result
  }

  async fn transition(&self, id: i64, cmd: TransitionCommand) -> Result<Deviation> {
    self
      .transition_with(id, cmd, |_, _, _| Ok(()))
      .await
      .map(|(deviation, ())| deviation)
  }
}

fn require_text(text: &str, what: &str) -> Result<()> {
  if text.trim().is_empty() {
    return Err(qms_core::Error::InvalidInput(format!("{what} must not be empty")).into());
  }
  Ok(())
}

// ─── DeviationStore impl ─────────────────────────────────────────────────────

impl DeviationStore for SqliteStore {
  type Error = Error;

  // ── Deviations ────────────────────────────────────────────────────────────

  async fn create_deviation(&self, input: NewDeviation) -> Result<Deviation> {
    input.validate()?;
    let now = Utc::now();
    let deviation = self
      .write(move |conn| ops::insert_deviation(conn, &input, now))
      .await?;
    info!(
      deviation_id = deviation.id,
      number = %deviation.deviation_number,
      severity = %deviation.severity,
      "deviation created"
    );
    Ok(deviation)
  }

  async fn get_deviation(&self, id: i64) -> Result<Option<Deviation>> {
    self.read(move |conn| ops::select_deviation(conn, id)).await
  }

  async fn list_deviations(
    &self,
    status: Option<DeviationStatus>,
  ) -> Result<Vec<Deviation>> {
    self.read(move |conn| ops::select_deviations(conn, status)).await
  }

  // ── Department review ─────────────────────────────────────────────────────

  async fn initiate_department_review(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> Result<Deviation> {
    let cmd = TransitionCommand::new(Transition::InitiateDepartmentReview)
      .expecting(expected);
    self.transition(id, cmd).await
  }

  async fn complete_department_review(
    &self,
    id: i64,
    decision: DeviationStatus,
    comments: Option<String>,
  ) -> Result<Deviation> {
    let transition = Transition::department_decision(decision)?;
    let cmd = TransitionCommand::new(transition).with_remark(comments.clone());
    self
      .transition_with(id, cmd, move |conn, _, _| {
        if let Some(comment) = comments {
          conn.execute(
            "UPDATE deviations SET review_comment = ?1 WHERE id = ?2",
            params![comment, id],
          )?;
        }
        Ok(())
      })
      .await
      .map(|(deviation, ())| deviation)
  }

  async fn retry_department_review(
    &self,
    id: i64,
    remarks: String,
    at: DateTime<Utc>,
  ) -> Result<Deviation> {
    let cmd = TransitionCommand::new(Transition::RetryDepartmentReview)
      .with_remark(Some(remarks.clone()))
      .at(at);
    self
      .transition_with(id, cmd, move |conn, _, _| {
        conn.execute(
          "UPDATE deviations SET remarks = ?1 WHERE id = ?2",
          params![remarks, id],
        )?;
        Ok(())
      })
      .await
      .map(|(deviation, ())| deviation)
  }

  // ── CFT review ────────────────────────────────────────────────────────────

  async fn assign_cft_reviewer(
    &self,
    input: AssignCftReviewer,
  ) -> Result<CftOutcome> {
    let decision = input.decision()?;
    let id = input.deviation_id;
    let cmd = TransitionCommand::new(decision.transition()).by(input.actor_id);

    let (deviation, assignment) = self
      .transition_with(id, cmd, move |conn, _, at| {
        let cft_department_id = match decision {
          CftDecision::NotRequired => None,
          CftDecision::Required { cft_department_id, .. } => Some(cft_department_id),
        };
        conn.execute(
          "UPDATE deviations SET cft_required = ?1, cft_department_id = ?2
           WHERE id = ?3",
          params![input.cft_required, cft_department_id, id],
        )?;
        match decision {
          CftDecision::NotRequired => Ok(None),
          CftDecision::Required {
            cft_department_id,
            reviewer_id,
          } => ops::insert_cft_assignment(
            conn,
            id,
            input.department_id,
            cft_department_id,
            reviewer_id,
            input.actor_id,
            at,
          )
          .map(Some),
        }
      })
      .await?;

    Ok(CftOutcome {
      deviation,
      assignment,
    })
  }

  async fn initiate_cft_review(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> Result<Deviation> {
    let cmd =
      TransitionCommand::new(Transition::InitiateCftReview).expecting(expected);
    self.transition(id, cmd).await
  }

  async fn complete_cft_review(
    &self,
    id: i64,
    decision: DeviationStatus,
    remarks: Option<String>,
  ) -> Result<Deviation> {
    let transition = Transition::cft_decision(decision)?;
    let cmd = TransitionCommand::new(transition).with_remark(remarks.clone());
    self
      .transition_with(id, cmd, move |conn, _, _| {
        if let Some(remarks) = remarks {
          conn.execute(
            "UPDATE deviations SET remarks = ?1 WHERE id = ?2",
            params![remarks, id],
          )?;
        }
        Ok(())
      })
      .await
      .map(|(deviation, ())| deviation)
  }

  async fn cft_assignments(&self, deviation_id: i64) -> Result<Vec<CftAssignment>> {
    self
      .read(move |conn| {
        ops::require_deviation(conn, deviation_id)?;
        ops::select_cft_assignments(conn, deviation_id)
      })
      .await
  }

  // ── QA and closure ────────────────────────────────────────────────────────

  async fn escalate_to_qa_review(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> Result<Deviation> {
    let cmd =
      TransitionCommand::new(Transition::EscalateToQaReview).expecting(expected);
    self.transition(id, cmd).await
  }

  async fn assign_final_approver(
    &self,
    deviation_id: i64,
    approval_id: i64,
    user_id: i64,
  ) -> Result<(ApprovalRecord, Deviation)> {
    let cmd = TransitionCommand::new(Transition::AssignFinalApprover).by(user_id);
    let (deviation, record) = self
      .transition_with(deviation_id, cmd, move |conn, _, at| {
        let pending = ops::select_approval(conn, approval_id)?
          .ok_or(qms_core::Error::ApprovalNotFound(approval_id))?;
        if pending.deviation_id != deviation_id {
          return Err(
            qms_core::Error::InvalidInput(format!(
              "approval {approval_id} belongs to deviation {}",
              pending.deviation_id
            ))
            .into(),
          );
        }
        if pending.status != ApprovalStatus::Pending {
          return Err(qms_core::Error::ApprovalNotPending(approval_id).into());
        }
        if ops::resolved_by(conn, approval_id)?.is_some() {
          return Err(qms_core::Error::ApprovalAlreadyResolved(approval_id).into());
        }

        let resolution = NewApproval {
          deviation_id,
          approval_date: at.date_naive(),
          status: ApprovalStatus::Approved,
          approver_id: user_id,
          approver_role: pending.approver_role,
          approver_name: pending.approver_name,
          comments: Some(format!(
            "final approver assigned for approval {approval_id}"
          )),
        };
        ops::insert_approval(conn, resolution, Some(approval_id), at)
      })
      .await?;
    Ok((record, deviation))
  }

  async fn grant_final_approval(
    &self,
    approval: NewApproval,
  ) -> Result<(ApprovalRecord, Deviation)> {
    approval.validate()?;
    if approval.status != ApprovalStatus::Approved {
      return Err(
        qms_core::Error::InvalidInput(format!(
          "final approval must be approved, got {}",
          approval.status
        ))
        .into(),
      );
    }

    let id = approval.deviation_id;
    let cmd = TransitionCommand::new(Transition::GrantFinalApproval)
      .by(approval.approver_id)
      .with_remark(approval.comments.clone());
    let (deviation, record) = self
      .transition_with(id, cmd, move |conn, _, at| {
        ops::insert_approval(conn, approval, None, at)
      })
      .await?;
    Ok((record, deviation))
  }

  async fn close_deviation(
    &self,
    id: i64,
    expected: DeviationStatus,
  ) -> Result<Deviation> {
    let cmd = TransitionCommand::new(Transition::Close).expecting(expected);
    self.transition(id, cmd).await
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn record_approval(&self, approval: NewApproval) -> Result<ApprovalRecord> {
    approval.validate()?;
    let now = Utc::now();
    let record = self
      .write(move |conn| {
        ops::require_deviation(conn, approval.deviation_id)?;
        ops::insert_approval(conn, approval, None, now)
      })
      .await?;
    info!(
      deviation_id = record.deviation_id,
      approval_id = record.approval_id,
      status = %record.status,
      "approval recorded"
    );
    Ok(record)
  }

  async fn approvals(&self, deviation_id: i64) -> Result<Vec<ResolvedApproval>> {
    let rows: Vec<(RawApproval, Option<i64>)> = self
      .read(move |conn| {
        ops::require_deviation(conn, deviation_id)?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {APPROVAL_COLUMNS}, r.approval_id AS resolved_by
           FROM approvals a
           LEFT JOIN approvals r ON r.resolves = a.approval_id
           WHERE a.deviation_id = ?1
           ORDER BY a.approval_id"
        ))?;
        let rows = stmt
          .query_map(params![deviation_id], |row| {
            Ok((RawApproval::from_row(row)?, row.get(12)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(raw, resolved_by)| {
        Ok(ResolvedApproval {
          record: raw.into_record()?,
          resolved_by,
        })
      })
      .collect()
  }

  async fn verify_ledger(&self, deviation_id: i64) -> Result<LedgerVerification> {
    let records = self
      .read(move |conn| {
        ops::require_deviation(conn, deviation_id)?;
        ops::select_approvals(conn, deviation_id)
      })
      .await?;

    let verification = LedgerVerification {
      deviation_id,
      entries: records.len(),
      first_broken: first_broken_link(&records),
    };
    if let Some(approval_id) = verification.first_broken {
      warn!(deviation_id, approval_id, "approval ledger hash chain is broken");
    }
    Ok(verification)
  }

  async fn history(&self, deviation_id: i64) -> Result<Vec<HistoryEntry>> {
    self
      .read(move |conn| {
        ops::require_deviation(conn, deviation_id)?;
        ops::select_history(conn, deviation_id)
      })
      .await
  }

  // ── Assessments and investigations ────────────────────────────────────────

  async fn create_assessment(
    &self,
    input: NewAssessment,
  ) -> Result<(Assessment, Deviation)> {
    input.validate()?;
    let now = Utc::now();
    let (assessment, deviation) = self
      .write(move |conn| {
        let current = ops::require_deviation(conn, input.deviation_id)?;
        let assessment = ops::insert_assessment(conn, &input, now)?;
        let target = assessment_triggers_qa_escalation(current.status);
        let remark = format!("assessment {} recorded", assessment.assessment_id);
        let deviation = ops::write_status(
          conn,
          &current,
          target,
          Transition::AssessmentEscalation,
          Some(&remark),
          None,
          now,
        )?;
        Ok((assessment, deviation))
      })
      .await?;
    info!(
      deviation_id = deviation.id,
      assessment_id = assessment.assessment_id,
      status = %deviation.status,
      "assessment recorded"
    );
    Ok((assessment, deviation))
  }

  async fn assessments(&self, deviation_id: i64) -> Result<Vec<Assessment>> {
    self
      .read(move |conn| {
        ops::require_deviation(conn, deviation_id)?;
        ops::select_assessments(conn, deviation_id)
      })
      .await
  }

  async fn delete_assessment(&self, assessment_id: i64) -> Result<()> {
    self
      .write(move |conn| {
        let removed = conn.execute(
          "DELETE FROM assessments WHERE assessment_id = ?1",
          params![assessment_id],
        )?;
        if removed == 0 {
          return Err(qms_core::Error::AssessmentNotFound(assessment_id).into());
        }
        Ok(())
      })
      .await?;
    info!(assessment_id, "assessment deleted");
    Ok(())
  }

  async fn record_investigation(
    &self,
    input: NewInvestigation,
  ) -> Result<Investigation> {
    require_text(&input.summary, "investigation summary")?;
    let now = Utc::now();
    self
      .write(move |conn| {
        ops::require_deviation(conn, input.deviation_id)?;
        ops::insert_investigation(conn, &input, now)
      })
      .await
  }

  async fn link_investigation_outcome(
    &self,
    id: i64,
    findings: String,
    risk_assessment: Option<String>,
  ) -> Result<Deviation> {
    require_text(&findings, "investigation findings")?;
    self
      .write(move |conn| {
        ops::require_deviation(conn, id)?;
        conn.execute(
          "UPDATE deviations
           SET remarks = ?1, risk_assessment = COALESCE(?2, risk_assessment)
           WHERE id = ?3",
          params![findings, risk_assessment, id],
        )?;
        ops::require_deviation(conn, id)
      })
      .await
  }

  async fn capture_investigation_outcome(
    &self,
    investigation_id: i64,
    remediation: String,
    risk_assessment: Option<String>,
  ) -> Result<Deviation> {
    require_text(&remediation, "remediation action")?;
    self
      .write(move |conn| {
        let investigation = ops::select_investigation(conn, investigation_id)?
          .ok_or(qms_core::Error::InvestigationNotFound(investigation_id))?;
        let id = investigation.deviation_id;
        conn.execute(
          "UPDATE deviations
           SET remediation_action_taken = ?1,
               risk_assessment = COALESCE(?2, risk_assessment)
           WHERE id = ?3",
          params![remediation, risk_assessment, id],
        )?;
        ops::require_deviation(conn, id)
      })
      .await
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  async fn compliance_report<'a>(
    &'a self,
    query: &'a ComplianceQuery,
  ) -> Result<Vec<ComplianceRow>> {
    query.validate()?;
    let query = query.clone();
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DEVIATION_COLUMNS} FROM deviations d
           WHERE (?1 IS NULL OR d.id = ?1)
             AND (?2 IS NULL OR d.date_of_occurrence >= ?2)
             AND (?3 IS NULL OR d.date_of_occurrence <= ?3)
             AND (?4 IS NULL OR EXISTS (
               SELECT 1 FROM approvals a
               WHERE a.deviation_id = d.id AND a.approval_date = ?4
             ))
           ORDER BY d.id"
        ))?;
        let raws = stmt
          .query_map(
            params![
              query.deviation_id,
              query.start_date.map(encode_date),
              query.end_date.map(encode_date),
              query.approval_date.map(encode_date),
            ],
            RawDeviation::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        raws
          .into_iter()
          .map(|raw| {
            let deviation = raw.into_deviation()?;
            Ok(ComplianceRow {
              approvals: ops::select_approvals(conn, deviation.id)?,
              assessments: ops::select_assessments(conn, deviation.id)?,
              deviation,
            })
          })
          .collect()
      })
      .await
  }

  async fn due_reminders(
    &self,
    as_of: DateTime<Utc>,
    stale_after: Duration,
  ) -> Result<Vec<ReviewReminder>> {
    let deviations = self.read(ops::select_open_deviations).await?;

    // A window that overflows the calendar is never due.
    let mut reminders: Vec<ReviewReminder> = deviations
      .into_iter()
      .filter_map(|d| {
        let due_at = d.status_changed_at.checked_add_signed(stale_after)?;
        (due_at <= as_of).then(|| ReviewReminder {
          deviation_id: d.id,
          deviation_number: d.deviation_number,
          status: d.status,
          waiting_since: d.status_changed_at,
          due_at,
        })
      })
      .collect();
    reminders.sort_by_key(|r| (r.due_at, r.deviation_id));
    debug!(count = reminders.len(), %as_of, "review reminders computed");
    Ok(reminders)
  }
}
