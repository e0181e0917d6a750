//! Synchronous building blocks that run on the database thread.
//!
//! Every function here takes a plain `&Connection`; callers in
//! [`crate::store`] decide whether it runs inside the write transaction.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params};

use qms_core::{
  approval::{ApprovalRecord, NewApproval},
  assessment::{Assessment, NewAssessment},
  cft::CftAssignment,
  deviation::{Deviation, NewDeviation, deviation_number},
  investigation::{Investigation, NewInvestigation},
  lifecycle::{HistoryEntry, TransitionCommand},
  status::{DeviationStatus, Transition},
};

use crate::{
  Result,
  encode::{
    APPROVAL_COLUMNS, ASSESSMENT_COLUMNS, DEVIATION_COLUMNS, HISTORY_COLUMNS,
    RawApproval, RawAssessment, RawCftAssignment, RawDeviation, RawHistory,
    RawInvestigation, encode_date, encode_dt,
  },
};

// ─── Deviations ──────────────────────────────────────────────────────────────

pub fn select_deviation(conn: &Connection, id: i64) -> Result<Option<Deviation>> {
  let raw = conn
    .query_row(
      &format!("SELECT {DEVIATION_COLUMNS} FROM deviations WHERE id = ?1"),
      params![id],
      RawDeviation::from_row,
    )
    .optional()?;
  raw.map(RawDeviation::into_deviation).transpose()
}

pub fn require_deviation(conn: &Connection, id: i64) -> Result<Deviation> {
  select_deviation(conn, id)?
    .ok_or_else(|| qms_core::Error::DeviationNotFound(id).into())
}

pub fn select_deviations(
  conn: &Connection,
  status: Option<DeviationStatus>,
) -> Result<Vec<Deviation>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {DEVIATION_COLUMNS} FROM deviations
     WHERE (?1 IS NULL OR status = ?1)
     ORDER BY id"
  ))?;
  let raws = stmt
    .query_map(params![status.map(DeviationStatus::as_str)], RawDeviation::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawDeviation::into_deviation).collect()
}

/// Deviations still moving through review, oldest first.
pub fn select_open_deviations(conn: &Connection) -> Result<Vec<Deviation>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {DEVIATION_COLUMNS} FROM deviations
     WHERE status NOT IN (?1, ?2)
     ORDER BY id"
  ))?;
  let raws = stmt
    .query_map(
      params![
        DeviationStatus::Closed.as_str(),
        DeviationStatus::DeviationDropped.as_str()
      ],
      RawDeviation::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawDeviation::into_deviation).collect()
}

/// Insert a new deviation, numbering it from the next row id. Must run inside
/// the write transaction so two creations cannot claim the same number.
pub fn insert_deviation(
  conn: &Connection,
  input: &NewDeviation,
  now: DateTime<Utc>,
) -> Result<Deviation> {
  let id: i64 = conn.query_row(
    "SELECT COALESCE(MAX(id), 0) + 1 FROM deviations",
    [],
    |r| r.get(0),
  )?;
  let number = deviation_number(input.identified_at, id);
  let now_str = encode_dt(now);
  let link = &input.linkage;

  conn.execute(
    "INSERT INTO deviations (
       id, deviation_number, deviation_type, severity, status, version,
       date_of_occurrence, identified_at, justification_for_delay,
       description, standard_procedure, risk_assessment, remarks,
       root_cause, immediate_actions, impact_on_batches,
       product_id, material_id, equipment_id, batch_id, document_id,
       material_lot_number, created_at, status_changed_at
     ) VALUES (
       ?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
       ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?22
     )",
    params![
      id,
      number,
      <&str>::from(input.deviation_type),
      <&str>::from(input.severity),
      DeviationStatus::PendingDepartmentReview.as_str(),
      encode_date(input.date_of_occurrence),
      encode_dt(input.identified_at),
      input.justification_for_delay,
      input.description,
      input.standard_procedure,
      input.risk_assessment,
      input.remarks,
      input.root_cause,
      input.immediate_actions,
      input.impact_on_batches,
      link.product_id,
      link.material_id,
      link.equipment_id,
      link.batch_id,
      link.document_id,
      link.material_lot_number,
      now_str,
    ],
  )?;

  require_deviation(conn, id)
}

// ─── Status writes ───────────────────────────────────────────────────────────

/// Resolve `cmd` against the stored status and write the result.
pub fn apply_transition(
  conn: &Connection,
  id: i64,
  cmd: &TransitionCommand,
  at: DateTime<Utc>,
) -> Result<Deviation> {
  let current = require_deviation(conn, id)?;
  let target = cmd.resolve(id, current.status)?;
  write_status(
    conn,
    &current,
    target,
    cmd.transition,
    cmd.remark.as_deref(),
    cmd.actor_id,
    at,
  )
}

/// Conditional status write plus its history row. The update only matches
/// the exact status and version that were read, so a writer that lost a race
/// gets [`qms_core::Error::StaleVersion`] instead of overwriting.
pub fn write_status(
  conn: &Connection,
  current: &Deviation,
  target: DeviationStatus,
  transition: Transition,
  remark: Option<&str>,
  actor_id: Option<i64>,
  at: DateTime<Utc>,
) -> Result<Deviation> {
  let at_str = encode_dt(at);
  let changed = conn.execute(
    "UPDATE deviations
     SET status = ?1, version = version + 1, status_changed_at = ?2
     WHERE id = ?3 AND status = ?4 AND version = ?5",
    params![
      target.as_str(),
      at_str,
      current.id,
      current.status.as_str(),
      current.version,
    ],
  )?;
  if changed == 0 {
    return Err(
      qms_core::Error::StaleVersion {
        id:      current.id,
        version: current.version,
      }
      .into(),
    );
  }

  conn.execute(
    "INSERT INTO deviation_history (
       deviation_id, from_status, to_status, transition, remark, actor_id,
       recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      current.id,
      current.status.as_str(),
      target.as_str(),
      transition.as_str(),
      remark,
      actor_id,
      at_str,
    ],
  )?;

  require_deviation(conn, current.id)
}

pub fn select_history(
  conn: &Connection,
  deviation_id: i64,
) -> Result<Vec<HistoryEntry>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {HISTORY_COLUMNS} FROM deviation_history
     WHERE deviation_id = ?1 ORDER BY history_id"
  ))?;
  let raws = stmt
    .query_map(params![deviation_id], RawHistory::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawHistory::into_entry).collect()
}

// ─── Approvals ───────────────────────────────────────────────────────────────

/// Append a record to the deviation's hash chain.
pub fn insert_approval(
  conn: &Connection,
  approval: NewApproval,
  resolves: Option<i64>,
  recorded_at: DateTime<Utc>,
) -> Result<ApprovalRecord> {
  let previous_hash: Option<String> = conn
    .query_row(
      "SELECT entry_hash FROM approvals
       WHERE deviation_id = ?1 ORDER BY approval_id DESC LIMIT 1",
      params![approval.deviation_id],
      |r| r.get(0),
    )
    .optional()?;

  let mut record = approval.into_record(previous_hash, resolves, recorded_at);

  conn.execute(
    "INSERT INTO approvals (
       deviation_id, approval_date, status, approver_id, approver_role,
       approver_name, comments, resolves, recorded_at, previous_hash,
       entry_hash
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    params![
      record.deviation_id,
      encode_date(record.approval_date),
      <&str>::from(record.status),
      record.approver_id,
      record.approver_role,
      record.approver_name,
      record.comments,
      record.resolves,
      encode_dt(record.recorded_at),
      record.previous_hash,
      record.entry_hash,
    ],
  )?;
  record.approval_id = conn.last_insert_rowid();
  Ok(record)
}

pub fn select_approval(
  conn: &Connection,
  approval_id: i64,
) -> Result<Option<ApprovalRecord>> {
  let raw = conn
    .query_row(
      &format!("SELECT {APPROVAL_COLUMNS} FROM approvals a WHERE a.approval_id = ?1"),
      params![approval_id],
      RawApproval::from_row,
    )
    .optional()?;
  raw.map(RawApproval::into_record).transpose()
}

/// The id of the record that resolved `approval_id`, if one exists.
pub fn resolved_by(conn: &Connection, approval_id: i64) -> Result<Option<i64>> {
  Ok(
    conn
      .query_row(
        "SELECT approval_id FROM approvals WHERE resolves = ?1",
        params![approval_id],
        |r| r.get(0),
      )
      .optional()?,
  )
}

/// A deviation's approval records in chain order.
pub fn select_approvals(
  conn: &Connection,
  deviation_id: i64,
) -> Result<Vec<ApprovalRecord>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {APPROVAL_COLUMNS} FROM approvals a
     WHERE a.deviation_id = ?1 ORDER BY a.approval_id"
  ))?;
  let raws = stmt
    .query_map(params![deviation_id], RawApproval::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawApproval::into_record).collect()
}

// ─── Assessments ─────────────────────────────────────────────────────────────

pub fn insert_assessment(
  conn: &Connection,
  input: &NewAssessment,
  recorded_at: DateTime<Utc>,
) -> Result<Assessment> {
  conn.execute(
    "INSERT INTO assessments (
       deviation_id, assessment_date, assessment_type, result, score,
       severity, probability_of_recurrence, is_repeated,
       historical_recurrences, market_action_required,
       expected_closure_date, comments, file_attachment_id, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    params![
      input.deviation_id,
      encode_date(input.assessment_date),
      <&str>::from(input.assessment_type),
      input.result,
      input.score,
      input.severity.map(<&str>::from),
      input.probability_of_recurrence,
      input.is_repeated,
      input.historical_recurrences,
      input.market_action_required,
      input.expected_closure_date.map(encode_date),
      input.comments,
      input.file_attachment_id,
      encode_dt(recorded_at),
    ],
  )?;
  let id = conn.last_insert_rowid();
  let raw = conn.query_row(
    &format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE assessment_id = ?1"),
    params![id],
    RawAssessment::from_row,
  )?;
  raw.into_assessment()
}

pub fn select_assessments(
  conn: &Connection,
  deviation_id: i64,
) -> Result<Vec<Assessment>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ASSESSMENT_COLUMNS} FROM assessments
     WHERE deviation_id = ?1 ORDER BY assessment_id"
  ))?;
  let raws = stmt
    .query_map(params![deviation_id], RawAssessment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAssessment::into_assessment).collect()
}

// ─── CFT assignments ─────────────────────────────────────────────────────────

const CFT_COLUMNS: &str = "assignment_id, deviation_id, department_id, \
                           cft_department_id, reviewer_id, assigned_by, \
                           assigned_at";

pub fn insert_cft_assignment(
  conn: &Connection,
  deviation_id: i64,
  department_id: i64,
  cft_department_id: i64,
  reviewer_id: i64,
  assigned_by: i64,
  at: DateTime<Utc>,
) -> Result<CftAssignment> {
  conn.execute(
    "INSERT INTO cft_assignments (
       deviation_id, department_id, cft_department_id, reviewer_id,
       assigned_by, assigned_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      deviation_id,
      department_id,
      cft_department_id,
      reviewer_id,
      assigned_by,
      encode_dt(at),
    ],
  )?;
  Ok(CftAssignment {
    assignment_id: conn.last_insert_rowid(),
    deviation_id,
    department_id,
    cft_department_id,
    reviewer_id,
    assigned_by,
    assigned_at: at,
  })
}

pub fn select_cft_assignments(
  conn: &Connection,
  deviation_id: i64,
) -> Result<Vec<CftAssignment>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {CFT_COLUMNS} FROM cft_assignments
     WHERE deviation_id = ?1 ORDER BY assignment_id"
  ))?;
  let raws = stmt
    .query_map(params![deviation_id], RawCftAssignment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawCftAssignment::into_assignment).collect()
}

// ─── Investigations ──────────────────────────────────────────────────────────

pub fn insert_investigation(
  conn: &Connection,
  input: &NewInvestigation,
  at: DateTime<Utc>,
) -> Result<Investigation> {
  conn.execute(
    "INSERT INTO investigations (deviation_id, summary, opened_at)
     VALUES (?1, ?2, ?3)",
    params![input.deviation_id, input.summary, encode_dt(at)],
  )?;
  Ok(Investigation {
    investigation_id: conn.last_insert_rowid(),
    deviation_id:     input.deviation_id,
    summary:          input.summary.clone(),
    opened_at:        at,
  })
}

pub fn select_investigation(
  conn: &Connection,
  investigation_id: i64,
) -> Result<Option<Investigation>> {
  let raw = conn
    .query_row(
      "SELECT investigation_id, deviation_id, summary, opened_at
       FROM investigations WHERE investigation_id = ?1",
      params![investigation_id],
      |row| {
        Ok(RawInvestigation {
          investigation_id: row.get(0)?,
          deviation_id:     row.get(1)?,
          summary:          row.get(2)?,
          opened_at:        row.get(3)?,
        })
      },
    )
    .optional()?;
  raw.map(RawInvestigation::into_investigation).transpose()
}
