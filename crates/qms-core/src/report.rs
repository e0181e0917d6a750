//! Read-only query types: the compliance report and review reminders.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  approval::ApprovalRecord,
  assessment::Assessment,
  deviation::Deviation,
  status::DeviationStatus,
};

// ─── Compliance report ───────────────────────────────────────────────────────

/// Parameters for [`crate::store::DeviationStore::compliance_report`].
/// Every filter is optional; an absent bound is unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceQuery {
  pub deviation_id:  Option<i64>,
  /// Inclusive lower bound on the date of occurrence.
  pub start_date:    Option<NaiveDate>,
  /// Inclusive upper bound on the date of occurrence.
  pub end_date:      Option<NaiveDate>,
  /// Only deviations with at least one approval dated this day.
  pub approval_date: Option<NaiveDate>,
}

impl ComplianceQuery {
  pub fn validate(&self) -> Result<()> {
    if let (Some(start), Some(end)) = (self.start_date, self.end_date)
      && start > end
    {
      return Err(Error::InvalidInput(format!(
        "start date {start} is after end date {end}"
      )));
    }
    Ok(())
  }
}

/// One deviation with its approval trail and assessments. Formatting and
/// aggregation are left to the reporting consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRow {
  pub deviation:   Deviation,
  pub approvals:   Vec<ApprovalRecord>,
  pub assessments: Vec<Assessment>,
}

// ─── Reminders ───────────────────────────────────────────────────────────────

/// A fact that a deviation has waited too long in its current status.
/// Delivering the reminder is someone else's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReminder {
  pub deviation_id:     i64,
  pub deviation_number: String,
  pub status:           DeviationStatus,
  pub waiting_since:    DateTime<Utc>,
  pub due_at:           DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_query_is_valid() {
    assert!(ComplianceQuery::default().validate().is_ok());
  }

  #[test]
  fn inverted_range_is_rejected() {
    let query = ComplianceQuery {
      start_date: NaiveDate::from_ymd_opt(2026, 6, 1),
      end_date: NaiveDate::from_ymd_opt(2026, 5, 1),
      ..Default::default()
    };
    assert!(query.validate().is_err());
  }
}
