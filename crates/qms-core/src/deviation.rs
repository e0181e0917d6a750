//! The deviation aggregate root.
//!
//! A deviation is created once in [`DeviationStatus::PendingDepartmentReview`]
//! and from then on changes status only through the transitions in
//! [`crate::status`]. It is never deleted; closing is a status.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::{Error, Result, status::DeviationStatus};

// ─── Classification ──────────────────────────────────────────────────────────

/// What kind of thing deviated. Decides which linkage ids must be present.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviationType {
  Product,
  Material,
  Equipment,
  Document,
}

/// Ordered from least to most severe.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
  Minor,
  Major,
  Critical,
}

// ─── Linkage ─────────────────────────────────────────────────────────────────

/// References into master data owned by other systems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Linkage {
  pub product_id:          Option<i64>,
  pub material_id:         Option<i64>,
  pub equipment_id:        Option<i64>,
  pub batch_id:            Option<i64>,
  pub document_id:         Option<i64>,
  pub material_lot_number: Option<String>,
}

impl Linkage {
  /// Exactly the ids relevant to `kind` may be populated; the primary one
  /// must be.
  pub fn validate_for(&self, kind: DeviationType) -> Result<()> {
    let (primary, name) = match kind {
      DeviationType::Product => (self.product_id, "product_id"),
      DeviationType::Material => (self.material_id, "material_id"),
      DeviationType::Equipment => (self.equipment_id, "equipment_id"),
      DeviationType::Document => (self.document_id, "document_id"),
    };
    if primary.is_none() {
      return Err(Error::InvalidInput(format!(
        "{kind} deviation requires {name}"
      )));
    }

    let allowed = |field: &str| -> bool {
      match kind {
        DeviationType::Product => matches!(field, "product_id" | "batch_id"),
        DeviationType::Material => matches!(
          field,
          "material_id" | "batch_id" | "material_lot_number"
        ),
        DeviationType::Equipment => field == "equipment_id",
        DeviationType::Document => field == "document_id",
      }
    };

    let populated = [
      ("product_id", self.product_id.is_some()),
      ("material_id", self.material_id.is_some()),
      ("equipment_id", self.equipment_id.is_some()),
      ("batch_id", self.batch_id.is_some()),
      ("document_id", self.document_id.is_some()),
      ("material_lot_number", self.material_lot_number.is_some()),
    ];
    for (field, set) in populated {
      if set && !allowed(field) {
        return Err(Error::InvalidInput(format!(
          "{field} is not applicable to a {kind} deviation"
        )));
      }
    }
    Ok(())
  }
}

// ─── Deviation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
  pub id:                       i64,
  /// Human-readable, unique, e.g. `DEV-2026-00042`.
  pub deviation_number:         String,
  pub deviation_type:           DeviationType,
  pub severity:                 Severity,
  pub status:                   DeviationStatus,
  /// Bumped on every status write.
  pub version:                  i64,

  pub date_of_occurrence:       NaiveDate,
  pub identified_at:            DateTime<Utc>,
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

  pub linkage:                  Linkage,

  pub cft_required:             bool,
  pub cft_department_id:        Option<i64>,

  pub created_at:               DateTime<Utc>,
  /// Time of the last status write; what reminders measure waiting from.
  pub status_changed_at:        DateTime<Utc>,
}

/// Format the deviation number for a given identification year and row id.
pub fn deviation_number(identified_at: DateTime<Utc>, id: i64) -> String {
  format!("DEV-{}-{id:05}", identified_at.year())
}

// ─── NewDeviation ────────────────────────────────────────────────────────────

/// Input to [`crate::store::DeviationStore::create_deviation`].
/// Status, number and timestamps are always assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeviation {
  pub deviation_type:          DeviationType,
  pub severity:                Severity,
  pub date_of_occurrence:      NaiveDate,
  pub identified_at:           DateTime<Utc>,
  pub justification_for_delay: Option<String>,
  pub description:             String,
  pub standard_procedure:      Option<String>,
  pub risk_assessment:         Option<String>,
  pub remarks:                 Option<String>,
  pub root_cause:              Option<String>,
  pub immediate_actions:       Option<String>,
  #[serde(default)]
  pub impact_on_batches:       bool,
  #[serde(default)]
  pub linkage:                 Linkage,
}

impl NewDeviation {
  /// Convenience constructor with all optional fields empty.
  pub fn new(
    deviation_type: DeviationType,
    severity: Severity,
    date_of_occurrence: NaiveDate,
    identified_at: DateTime<Utc>,
    description: impl Into<String>,
    linkage: Linkage,
  ) -> Self {
    Self {
      deviation_type,
      severity,
      date_of_occurrence,
      identified_at,
      justification_for_delay: None,
      description: description.into(),
      standard_procedure: None,
      risk_assessment: None,
      remarks: None,
      root_cause: None,
      immediate_actions: None,
      impact_on_batches: false,
      linkage,
    }
  }

  /// Identification on a later calendar day than the occurrence counts as
  /// delayed reporting.
  pub fn is_delayed(&self) -> bool {
    self.identified_at.date_naive() > self.date_of_occurrence
  }

  pub fn validate(&self) -> Result<()> {
    if self.description.trim().is_empty() {
      return Err(Error::InvalidInput("description must not be empty".into()));
    }
    if self.identified_at.date_naive() < self.date_of_occurrence {
      return Err(Error::InvalidInput(
        "identification cannot precede occurrence".into(),
      ));
    }
    let justified = self
      .justification_for_delay
      .as_deref()
      .is_some_and(|j| !j.trim().is_empty());
    if self.is_delayed() && !justified {
      return Err(Error::InvalidInput(
        "delayed identification requires a justification".into(),
      ));
    }
    self.linkage.validate_for(self.deviation_type)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn on(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn product_deviation(identified_day: u32) -> NewDeviation {
    NewDeviation::new(
      DeviationType::Product,
      Severity::Major,
      on(2026, 3, 10),
      Utc.with_ymd_and_hms(2026, 3, identified_day, 9, 30, 0).unwrap(),
      "tablet weight out of range",
      Linkage {
        product_id: Some(4),
        batch_id: Some(11),
        ..Default::default()
      },
    )
  }

  #[test]
  fn same_day_identification_is_valid() {
    assert!(product_deviation(10).validate().is_ok());
  }

  #[test]
  fn identification_before_occurrence_is_rejected() {
    assert!(matches!(
      product_deviation(9).validate(),
      Err(Error::InvalidInput(_))
    ));
  }

  #[test]
  fn delayed_identification_needs_justification() {
    let mut input = product_deviation(12);
    assert!(input.validate().is_err());
    input.justification_for_delay = Some("found during batch record review".into());
    assert!(input.validate().is_ok());
  }

  #[test]
  fn linkage_must_match_type() {
    let mut input = product_deviation(10);
    input.linkage.equipment_id = Some(2);
    assert!(input.validate().is_err());

    input.linkage = Linkage::default();
    assert!(input.validate().is_err(), "product_id is required");
  }

  #[test]
  fn material_deviation_accepts_lot_number() {
    let linkage = Linkage {
      material_id: Some(8),
      material_lot_number: Some("LOT-77".into()),
      ..Default::default()
    };
    assert!(linkage.validate_for(DeviationType::Material).is_ok());
    assert!(linkage.validate_for(DeviationType::Product).is_err());
  }

  #[test]
  fn severity_is_ordered() {
    assert!(Severity::Minor < Severity::Major);
    assert!(Severity::Major < Severity::Critical);
  }

  #[test]
  fn number_is_year_and_padded_id() {
    let at = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    assert_eq!(deviation_number(at, 42), "DEV-2026-00042");
  }
}
