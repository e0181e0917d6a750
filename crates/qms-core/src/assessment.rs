//! Scored assessments attached to a deviation.
//!
//! Recording an assessment also moves the parent deviation to pending QA
//! review; see [`crate::lifecycle::assessment_triggers_qa_escalation`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::{Error, Result, deviation::Severity};

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
pub enum AssessmentType {
  Cause,
  Impact,
  RecurrenceProbability,
  Risk,
  Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
  pub assessment_id:             i64,
  pub deviation_id:              i64,
  pub assessment_date:           NaiveDate,
  pub assessment_type:           AssessmentType,
  pub result:                    String,
  pub score:                     f64,
  pub severity:                  Option<Severity>,
  /// Percentage, 0–100.
  pub probability_of_recurrence: Option<i64>,
  pub is_repeated:               bool,
  pub historical_recurrences:    Option<i64>,
  pub market_action_required:    bool,
  pub expected_closure_date:     Option<NaiveDate>,
  pub comments:                  Option<String>,
  pub file_attachment_id:        Option<i64>,
  pub recorded_at:               DateTime<Utc>,
}

/// Input to [`crate::store::DeviationStore::create_assessment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssessment {
  #[serde(default)]
  pub deviation_id:              i64,
  pub assessment_date:           NaiveDate,
  pub assessment_type:           AssessmentType,
  pub result:                    String,
  pub score:                     f64,
  pub severity:                  Option<Severity>,
  pub probability_of_recurrence: Option<i64>,
  #[serde(default)]
  pub is_repeated:               bool,
  pub historical_recurrences:    Option<i64>,
  #[serde(default)]
  pub market_action_required:    bool,
  pub expected_closure_date:     Option<NaiveDate>,
  pub comments:                  Option<String>,
  pub file_attachment_id:        Option<i64>,
}

impl NewAssessment {
  pub fn new(
    deviation_id: i64,
    assessment_date: NaiveDate,
    assessment_type: AssessmentType,
    result: impl Into<String>,
    score: f64,
  ) -> Self {
    Self {
      deviation_id,
      assessment_date,
      assessment_type,
      result: result.into(),
      score,
      severity: None,
      probability_of_recurrence: None,
      is_repeated: false,
      historical_recurrences: None,
      market_action_required: false,
      expected_closure_date: None,
      comments: None,
      file_attachment_id: None,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.result.trim().is_empty() {
      return Err(Error::InvalidInput("assessment result must not be empty".into()));
    }
    if !self.score.is_finite() {
      return Err(Error::InvalidInput("assessment score must be finite".into()));
    }
    if let Some(p) = self.probability_of_recurrence
      && !(0..=100).contains(&p)
    {
      return Err(Error::InvalidInput(format!(
        "probability of recurrence {p} is outside 0..=100"
      )));
    }
    if self.historical_recurrences.is_some_and(|n| n < 0) {
      return Err(Error::InvalidInput(
        "historical recurrence count cannot be negative".into(),
      ));
    }
    if let Some(closure) = self.expected_closure_date
      && closure < self.assessment_date
    {
      return Err(Error::InvalidInput(
        "expected closure date precedes the assessment".into(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn input() -> NewAssessment {
    NewAssessment::new(
      1,
      NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
      AssessmentType::Impact,
      "no impact on released batches",
      2.5,
    )
  }

  #[test]
  fn minimal_assessment_is_valid() {
    assert!(input().validate().is_ok());
  }

  #[test]
  fn probability_is_a_percentage() {
    let mut a = input();
    a.probability_of_recurrence = Some(140);
    assert!(a.validate().is_err());
  }

  #[test]
  fn nan_score_is_rejected() {
    let mut a = input();
    a.score = f64::NAN;
    assert!(a.validate().is_err());
  }

  #[test]
  fn closure_cannot_precede_assessment() {
    let mut a = input();
    a.expected_closure_date = NaiveDate::from_ymd_opt(2026, 3, 1);
    assert!(a.validate().is_err());
  }
}
