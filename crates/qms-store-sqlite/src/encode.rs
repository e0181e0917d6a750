//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as `YYYY-MM-DD`.
//! Enums are stored as their `strum` string form.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use qms_core::{
  approval::ApprovalRecord,
  assessment::Assessment,
  cft::CftAssignment,
  deviation::{Deviation, Linkage},
  investigation::Investigation,
  lifecycle::HistoryEntry,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_enum<T: FromStr>(what: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownVariant {
    what,
    value: s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawDeviation::from_row`].
pub const DEVIATION_COLUMNS: &str = "
  id, deviation_number, deviation_type, severity, status, version,
  date_of_occurrence, identified_at, justification_for_delay, description,
  standard_procedure, risk_assessment, remarks, review_comment, root_cause,
  immediate_actions, remediation_action_taken, impact_on_batches,
  product_id, material_id, equipment_id, batch_id, document_id,
  material_lot_number, cft_required, cft_department_id, created_at,
  status_changed_at";

/// Raw values read directly from a `deviations` row.
pub struct RawDeviation {
  pub id:                       i64,
  pub deviation_number:         String,
  pub deviation_type:           String,
  pub severity:                 String,
  pub status:                   String,
  pub version:                  i64,
  pub date_of_occurrence:       String,
  pub identified_at:            String,
  pub justification_for_delay:  Option<String>,
  pub description:              String,
  pub standard_procedure:       Option<String>,
  pub risk_assessment:          Option<String>,
  pub remarks:                  Option<String>,
  pub review_comment:           Option<String>,
  pub root_cause:               Option<String>,
  pub immediate_actions:        Option<String>,
  pub remediation_action_taken: Option<String>,
  pub impact_on_batches:        bool,
  pub product_id:               Option<i64>,
  pub material_id:              Option<i64>,
  pub equipment_id:             Option<i64>,
  pub batch_id:                 Option<i64>,
  pub document_id:              Option<i64>,
  pub material_lot_number:      Option<String>,
  pub cft_required:             bool,
  pub cft_department_id:        Option<i64>,
  pub created_at:               String,
  pub status_changed_at:        String,
}

impl RawDeviation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                       row.get(0)?,
      deviation_number:         row.get(1)?,
      deviation_type:           row.get(2)?,
      severity:                 row.get(3)?,
      status:                   row.get(4)?,
      version:                  row.get(5)?,
      date_of_occurrence:       row.get(6)?,
      identified_at:            row.get(7)?,
      justification_for_delay:  row.get(8)?,
      description:              row.get(9)?,
      standard_procedure:       row.get(10)?,
      risk_assessment:          row.get(11)?,
      remarks:                  row.get(12)?,
      review_comment:           row.get(13)?,
      root_cause:               row.get(14)?,
      immediate_actions:        row.get(15)?,
      remediation_action_taken: row.get(16)?,
      impact_on_batches:        row.get(17)?,
      product_id:               row.get(18)?,
      material_id:              row.get(19)?,
      equipment_id:             row.get(20)?,
      batch_id:                 row.get(21)?,
      document_id:              row.get(22)?,
      material_lot_number:      row.get(23)?,
      cft_required:             row.get(24)?,
      cft_department_id:        row.get(25)?,
      created_at:               row.get(26)?,
      status_changed_at:        row.get(27)?,
    })
  }

  pub fn into_deviation(self) -> Result<Deviation> {
    Ok(Deviation {
      id:                       self.id,
      deviation_number:         self.deviation_number,
      deviation_type:           decode_enum("deviation type", &self.deviation_type)?,
      severity:                 decode_enum("severity", &self.severity)?,
      status:                   decode_enum("status", &self.status)?,
      version:                  self.version,
      date_of_occurrence:       decode_date(&self.date_of_occurrence)?,
      identified_at:            decode_dt(&self.identified_at)?,
      justification_for_delay:  self.justification_for_delay,
      description:              self.description,
      standard_procedure:       self.standard_procedure,
      risk_assessment:          self.risk_assessment,
      remarks:                  self.remarks,
      review_comment:           self.review_comment,
      root_cause:               self.root_cause,
      immediate_actions:        self.immediate_actions,
      remediation_action_taken: self.remediation_action_taken,
      impact_on_batches:        self.impact_on_batches,
      linkage:                  Linkage {
        product_id:          self.product_id,
        material_id:         self.material_id,
        equipment_id:        self.equipment_id,
        batch_id:            self.batch_id,
        document_id:         self.document_id,
        material_lot_number: self.material_lot_number,
      },
      cft_required:             self.cft_required,
      cft_department_id:        self.cft_department_id,
      created_at:               decode_dt(&self.created_at)?,
      status_changed_at:        decode_dt(&self.status_changed_at)?,
    })
  }
}

pub const HISTORY_COLUMNS: &str = "
  history_id, deviation_id, from_status, to_status, transition, remark,
  actor_id, recorded_at";

pub struct RawHistory {
  pub history_id:   i64,
  pub deviation_id: i64,
  pub from_status:  String,
  pub to_status:    String,
  pub transition:   String,
  pub remark:       Option<String>,
  pub actor_id:     Option<i64>,
  pub recorded_at:  String,
}

impl RawHistory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      history_id:   row.get(0)?,
      deviation_id: row.get(1)?,
      from_status:  row.get(2)?,
      to_status:    row.get(3)?,
      transition:   row.get(4)?,
      remark:       row.get(5)?,
      actor_id:     row.get(6)?,
      recorded_at:  row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      history_id:   self.history_id,
      deviation_id: self.deviation_id,
      from_status:  decode_enum("status", &self.from_status)?,
      to_status:    decode_enum("status", &self.to_status)?,
      transition:   decode_enum("transition", &self.transition)?,
      remark:       self.remark,
      actor_id:     self.actor_id,
      recorded_at:  decode_dt(&self.recorded_at)?,
    })
  }
}

/// Approval columns, prefixed with `a.` so the list can be reused in joins.
pub const APPROVAL_COLUMNS: &str = "
  a.approval_id, a.deviation_id, a.approval_date, a.status, a.approver_id,
  a.approver_role, a.approver_name, a.comments, a.resolves, a.recorded_at,
  a.previous_hash, a.entry_hash";

pub struct RawApproval {
  pub approval_id:   i64,
  pub deviation_id:  i64,
  pub approval_date: String,
  pub status:        String,
  pub approver_id:   i64,
  pub approver_role: String,
  pub approver_name: String,
  pub comments:      Option<String>,
  pub resolves:      Option<i64>,
  pub recorded_at:   String,
  pub previous_hash: Option<String>,
  pub entry_hash:    String,
}

impl RawApproval {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      approval_id:   row.get(0)?,
      deviation_id:  row.get(1)?,
      approval_date: row.get(2)?,
      status:        row.get(3)?,
      approver_id:   row.get(4)?,
      approver_role: row.get(5)?,
      approver_name: row.get(6)?,
      comments:      row.get(7)?,
      resolves:      row.get(8)?,
      recorded_at:   row.get(9)?,
      previous_hash: row.get(10)?,
      entry_hash:    row.get(11)?,
    })
  }

  pub fn into_record(self) -> Result<ApprovalRecord> {
    Ok(ApprovalRecord {
      approval_id:   self.approval_id,
      deviation_id:  self.deviation_id,
      approval_date: decode_date(&self.approval_date)?,
      status:        decode_enum("approval status", &self.status)?,
      approver_id:   self.approver_id,
      approver_role: self.approver_role,
      approver_name: self.approver_name,
      comments:      self.comments,
      resolves:      self.resolves,
      recorded_at:   decode_dt(&self.recorded_at)?,
      previous_hash: self.previous_hash,
      entry_hash:    self.entry_hash,
    })
  }
}

pub const ASSESSMENT_COLUMNS: &str = "
  assessment_id, deviation_id, assessment_date, assessment_type, result,
  score, severity, probability_of_recurrence, is_repeated,
  historical_recurrences, market_action_required, expected_closure_date,
  comments, file_attachment_id, recorded_at";

pub struct RawAssessment {
  pub assessment_id:             i64,
  pub deviation_id:              i64,
  pub assessment_date:           String,
  pub assessment_type:           String,
  pub result:                    String,
  pub score:                     f64,
  pub severity:                  Option<String>,
  pub probability_of_recurrence: Option<i64>,
  pub is_repeated:               bool,
  pub historical_recurrences:    Option<i64>,
  pub market_action_required:    bool,
  pub expected_closure_date:     Option<String>,
  pub comments:                  Option<String>,
  pub file_attachment_id:        Option<i64>,
  pub recorded_at:               String,
}

impl RawAssessment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      assessment_id:             row.get(0)?,
      deviation_id:              row.get(1)?,
      assessment_date:           row.get(2)?,
      assessment_type:           row.get(3)?,
      result:                    row.get(4)?,
      score:                     row.get(5)?,
      severity:                  row.get(6)?,
      probability_of_recurrence: row.get(7)?,
      is_repeated:               row.get(8)?,
      historical_recurrences:    row.get(9)?,
      market_action_required:    row.get(10)?,
      expected_closure_date:     row.get(11)?,
      comments:                  row.get(12)?,
      file_attachment_id:        row.get(13)?,
      recorded_at:               row.get(14)?,
    })
  }

  pub fn into_assessment(self) -> Result<Assessment> {
    Ok(Assessment {
      assessment_id:             self.assessment_id,
      deviation_id:              self.deviation_id,
      assessment_date:           decode_date(&self.assessment_date)?,
      assessment_type:           decode_enum("assessment type", &self.assessment_type)?,
      result:                    self.result,
      score:                     self.score,
      severity:                  self
        .severity
        .as_deref()
        .map(|s| decode_enum("severity", s))
        .transpose()?,
      probability_of_recurrence: self.probability_of_recurrence,
      is_repeated:               self.is_repeated,
      historical_recurrences:    self.historical_recurrences,
      market_action_required:    self.market_action_required,
      expected_closure_date:     self
        .expected_closure_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      comments:                  self.comments,
      file_attachment_id:        self.file_attachment_id,
      recorded_at:               decode_dt(&self.recorded_at)?,
    })
  }
}

pub struct RawCftAssignment {
  pub assignment_id:     i64,
  pub deviation_id:      i64,
  pub department_id:     i64,
  pub cft_department_id: i64,
  pub reviewer_id:       i64,
  pub assigned_by:       i64,
  pub assigned_at:       String,
}

impl RawCftAssignment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      assignment_id:     row.get(0)?,
      deviation_id:      row.get(1)?,
      department_id:     row.get(2)?,
      cft_department_id: row.get(3)?,
      reviewer_id:       row.get(4)?,
      assigned_by:       row.get(5)?,
      assigned_at:       row.get(6)?,
    })
  }

  pub fn into_assignment(self) -> Result<CftAssignment> {
    Ok(CftAssignment {
      assignment_id:     self.assignment_id,
      deviation_id:      self.deviation_id,
      department_id:     self.department_id,
      cft_department_id: self.cft_department_id,
      reviewer_id:       self.reviewer_id,
      assigned_by:       self.assigned_by,
      assigned_at:       decode_dt(&self.assigned_at)?,
    })
  }
}

pub struct RawInvestigation {
  pub investigation_id: i64,
  pub deviation_id:     i64,
  pub summary:          String,
  pub opened_at:        String,
}

impl RawInvestigation {
  pub fn into_investigation(self) -> Result<Investigation> {
    Ok(Investigation {
      investigation_id: self.investigation_id,
      deviation_id:     self.deviation_id,
      summary:          self.summary,
      opened_at:        decode_dt(&self.opened_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use qms_core::status::DeviationStatus;

  use super::*;

  #[test]
  fn dates_use_iso_format() {
    let d = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
    assert_eq!(encode_date(d), "2026-02-03");
    assert_eq!(decode_date("2026-02-03").unwrap(), d);
  }

  #[test]
  fn unknown_status_is_reported() {
    let err = decode_enum::<DeviationStatus>("status", "IN_LIMBO").unwrap_err();
    assert!(matches!(err, Error::UnknownVariant { what: "status", .. }));
  }
}
