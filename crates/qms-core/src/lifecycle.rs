//! Transition commands and the status-change history they leave behind.
//!
//! A [`TransitionCommand`] is checked twice: once against itself before any
//! storage access ([`TransitionCommand::validate`]) and once against the
//! stored status inside the write transaction ([`TransitionCommand::resolve`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  status::{DeviationStatus, Transition},
};

// ─── Command ─────────────────────────────────────────────────────────────────

/// A request to move one deviation along one edge of the status graph.
#[derive(Debug, Clone)]
pub struct TransitionCommand {
  pub transition: Transition,
  /// The status the caller believes the deviation is in. When set, a
  /// different stored status is reported as a concurrency conflict rather
  /// than an illegal transition.
  pub expected:   Option<DeviationStatus>,
  /// Justification or reviewer note recorded with the history entry.
  pub remark:     Option<String>,
  pub actor_id:   Option<i64>,
  /// Caller-supplied time of the change; defaults to the store's clock.
  pub at:         Option<DateTime<Utc>>,
}

impl TransitionCommand {
  pub fn new(transition: Transition) -> Self {
    Self {
      transition,
      expected: None,
      remark: None,
      actor_id: None,
      at: None,
    }
  }

  pub fn expecting(mut self, status: DeviationStatus) -> Self {
    self.expected = Some(status);
    self
  }

  pub fn with_remark(mut self, remark: Option<String>) -> Self {
    self.remark = remark;
    self
  }

  pub fn by(mut self, actor_id: i64) -> Self {
    self.actor_id = Some(actor_id);
    self
  }

  pub fn at(mut self, at: DateTime<Utc>) -> Self {
    self.at = Some(at);
    self
  }

  /// Storage-free checks: the justification is present when the transition
  /// needs one, and the expected status (if any) is a legal source.
  pub fn validate(&self, id: i64) -> Result<()> {
    if self.transition.requires_justification() && is_blank(&self.remark) {
      return Err(Error::MissingJustification(self.transition));
    }
    if let Some(expected) = self.expected
      && expected.next(self.transition).is_none()
    {
      return Err(Error::InvalidTransition {
        id,
        from: expected,
        transition: self.transition,
      });
    }
    Ok(())
  }

  /// Compute the target status given what is actually stored.
  pub fn resolve(
    &self,
    id: i64,
    current: DeviationStatus,
  ) -> Result<DeviationStatus> {
    if let Some(expected) = self.expected
      && expected != current
    {
      return Err(Error::Conflict {
        id,
        expected,
        actual: current,
      });
    }
    current
      .next(self.transition)
      .ok_or(Error::InvalidTransition {
        id,
        from: current,
        transition: self.transition,
      })
  }
}

fn is_blank(text: &Option<String>) -> bool {
  text.as_deref().is_none_or(|t| t.trim().is_empty())
}

// ─── Assessment hook ─────────────────────────────────────────────────────────

/// Recording an assessment sends the deviation to QA review whatever its
/// prior status, including past any pending CFT review. This is the only
/// status write that does not go through [`DeviationStatus::next`].
pub fn assessment_triggers_qa_escalation(
  _prior: DeviationStatus,
) -> DeviationStatus {
  DeviationStatus::PendingQaReview
}

// ─── History ─────────────────────────────────────────────────────────────────

/// One status change, append-only. Ordering by `history_id` reconstructs the
/// path a deviation took through the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub history_id:   i64,
  pub deviation_id: i64,
  pub from_status:  DeviationStatus,
  pub to_status:    DeviationStatus,
  pub transition:   Transition,
  pub remark:       Option<String>,
  pub actor_id:     Option<i64>,
  pub recorded_at:  DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn return_without_justification_is_rejected() {
    let cmd = TransitionCommand::new(Transition::ReturnFromDepartmentReview)
      .with_remark(Some("   ".into()));
    assert!(matches!(
      cmd.validate(1),
      Err(Error::MissingJustification(Transition::ReturnFromDepartmentReview))
    ));
  }

  #[test]
  fn completion_needs_no_justification() {
    let cmd = TransitionCommand::new(Transition::CompleteDepartmentReview);
    assert!(cmd.validate(1).is_ok());
  }

  #[test]
  fn expected_status_must_be_a_legal_source() {
    let cmd = TransitionCommand::new(Transition::Close)
      .expecting(DeviationStatus::PendingQaReview);
    assert!(matches!(
      cmd.validate(7),
      Err(Error::InvalidTransition { id: 7, .. })
    ));
  }

  #[test]
  fn resolve_reports_conflict_when_status_moved() {
    let cmd = TransitionCommand::new(Transition::EscalateToQaReview)
      .expecting(DeviationStatus::DepartmentReviewCompleted);
    let err = cmd.resolve(3, DeviationStatus::PendingCftReview).unwrap_err();
    assert!(matches!(err, Error::Conflict {
      expected: DeviationStatus::DepartmentReviewCompleted,
      actual: DeviationStatus::PendingCftReview,
      ..
    }));
  }

  #[test]
  fn resolve_without_expectation_uses_the_table() {
    let cmd = TransitionCommand::new(Transition::CompleteCftReview);
    assert_eq!(
      cmd.resolve(3, DeviationStatus::OngoingCftReview).unwrap(),
      DeviationStatus::CftReviewComplete
    );
    assert!(matches!(
      cmd.resolve(3, DeviationStatus::PendingCftReview),
      Err(Error::InvalidTransition { .. })
    ));
  }

  #[test]
  fn assessment_hook_ignores_prior_status() {
    use strum::IntoEnumIterator;
    for prior in DeviationStatus::iter() {
      assert_eq!(
        assessment_triggers_qa_escalation(prior),
        DeviationStatus::PendingQaReview
      );
    }
  }
}
