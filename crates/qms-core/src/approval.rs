//! The approval ledger.
//!
//! Approval records are never updated. A pending record is "resolved" by
//! appending a later record that points back at it through `resolves`, the
//! same way a superseded fact points at its replacement. Each deviation's
//! records also form a SHA-256 hash chain so a rewritten row is detectable.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{EnumString, IntoStaticStr};

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
  Approved,
  Rejected,
  Pending,
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
  pub approval_id:   i64,
  pub deviation_id:  i64,
  pub approval_date: NaiveDate,
  pub status:        ApprovalStatus,
  pub approver_id:   i64,
  pub approver_role: String,
  pub approver_name: String,
  pub comments:      Option<String>,
  /// The earlier pending record this one settles, if any.
  pub resolves:      Option<i64>,
  pub recorded_at:   DateTime<Utc>,
  /// `entry_hash` of the previous record for the same deviation.
  pub previous_hash: Option<String>,
  pub entry_hash:    String,
}

impl ApprovalRecord {
  /// Hash over the previous link and every audited field. `approval_id` is
  /// excluded so the hash can be computed before the row id is known.
  pub fn compute_hash(&self) -> String {
    let mut hasher = Sha256::new();
    let h = &mut hasher;
    field(h, self.previous_hash.as_deref().unwrap_or("").as_bytes());
    field(h, &self.deviation_id.to_le_bytes());
    field(h, self.approval_date.to_string().as_bytes());
    field(h, <&str>::from(self.status).as_bytes());
    field(h, &self.approver_id.to_le_bytes());
    field(h, self.approver_role.as_bytes());
    field(h, self.approver_name.as_bytes());
    field(h, self.comments.as_deref().unwrap_or("").as_bytes());
    field(h, &self.resolves.unwrap_or(0).to_le_bytes());
    field(h, &self.recorded_at.timestamp_micros().to_le_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Length-prefixed so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, bytes: &[u8]) {
  hasher.update((bytes.len() as u64).to_le_bytes());
  hasher.update(bytes);
}

/// Check a deviation's records, oldest first, for broken links or rewritten
/// content. Returns the id of the first bad record.
pub fn first_broken_link(records: &[ApprovalRecord]) -> Option<i64> {
  let mut previous: Option<&str> = None;
  for record in records {
    if record.previous_hash.as_deref() != previous
      || record.entry_hash != record.compute_hash()
    {
      return Some(record.approval_id);
    }
    previous = Some(&record.entry_hash);
  }
  None
}

/// Outcome of [`crate::store::DeviationStore::verify_ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVerification {
  pub deviation_id: i64,
  pub entries:      usize,
  pub first_broken: Option<i64>,
}

impl LedgerVerification {
  pub fn is_intact(&self) -> bool { self.first_broken.is_none() }
}

// ─── Resolved view ───────────────────────────────────────────────────────────

/// A record together with the later entry that resolved it, if any.
/// Computed at query time; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedApproval {
  pub record:      ApprovalRecord,
  pub resolved_by: Option<i64>,
}

impl ResolvedApproval {
  pub fn is_open(&self) -> bool {
    self.record.status == ApprovalStatus::Pending && self.resolved_by.is_none()
  }
}

// ─── NewApproval ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::DeviationStore::record_approval`].
/// `recorded_at` and the hash chain are always set by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApproval {
  /// Taken from the URL path when submitted over HTTP.
  #[serde(default)]
  pub deviation_id:  i64,
  pub approval_date: NaiveDate,
  pub status:        ApprovalStatus,
  pub approver_id:   i64,
  pub approver_role: String,
  pub approver_name: String,
  pub comments:      Option<String>,
}

impl NewApproval {
  pub fn validate(&self) -> Result<()> {
    if self.approver_role.trim().is_empty() {
      return Err(Error::InvalidInput("approver role must not be empty".into()));
    }
    if self.approver_name.trim().is_empty() {
      return Err(Error::InvalidInput("approver name must not be empty".into()));
    }
    Ok(())
  }

  /// Build the record that will be appended after `previous_hash`.
  pub fn into_record(
    self,
    previous_hash: Option<String>,
    resolves: Option<i64>,
    recorded_at: DateTime<Utc>,
  ) -> ApprovalRecord {
    let mut record = ApprovalRecord {
      approval_id: 0,
      deviation_id: self.deviation_id,
      approval_date: self.approval_date,
      status: self.status,
      approver_id: self.approver_id,
      approver_role: self.approver_role,
      approver_name: self.approver_name,
      comments: self.comments,
      resolves,
      recorded_at,
      previous_hash,
      entry_hash: String::new(),
    };
    record.entry_hash = record.compute_hash();
    record
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn approval(status: ApprovalStatus) -> NewApproval {
    NewApproval {
      deviation_id:  9,
      approval_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
      status,
      approver_id:   21,
      approver_role: "QA Head".into(),
      approver_name: "R. Iyer".into(),
      comments:      None,
    }
  }

  fn chain() -> Vec<ApprovalRecord> {
    let at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
    let mut first =
      approval(ApprovalStatus::Pending).into_record(None, None, at);
    first.approval_id = 1;
    let mut second = approval(ApprovalStatus::Approved).into_record(
      Some(first.entry_hash.clone()),
      Some(1),
      at,
    );
    second.approval_id = 2;
    vec![first, second]
  }

  #[test]
  fn intact_chain_verifies() {
    assert_eq!(first_broken_link(&chain()), None);
  }

  #[test]
  fn rewritten_comment_breaks_the_chain() {
    let mut records = chain();
    records[0].comments = Some("edited later".into());
    assert_eq!(first_broken_link(&records), Some(1));
  }

  #[test]
  fn dropped_record_breaks_the_chain() {
    let records = chain();
    assert_eq!(first_broken_link(&records[1..]), Some(2));
  }

  #[test]
  fn blank_approver_is_rejected() {
    let mut a = approval(ApprovalStatus::Approved);
    a.approver_name = " ".into();
    assert!(a.validate().is_err());
  }
}
