//! The deviation status graph.
//!
//! [`DeviationStatus::next`] is the single transition table. Every status
//! write in the system either looks its target up here or goes through the
//! assessment hook in [`crate::lifecycle`].

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where a deviation currently sits in its review lifecycle.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviationStatus {
  PendingDepartmentReview,
  OngoingDepartmentReview,
  DepartmentReviewCompleted,
  DeviationReturned,
  DeviationDropped,
  PendingCftReview,
  OngoingCftReview,
  CftReviewComplete,
  PendingQaReview,
  PendingFinalApproval,
  ApprovedByQa,
  Closed,
}

// ─── Transition ──────────────────────────────────────────────────────────────

/// A named edge in the status graph. Stored verbatim in the history table.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
  InitiateDepartmentReview,
  CompleteDepartmentReview,
  ReturnFromDepartmentReview,
  DropDeviation,
  RequireCftReview,
  BypassCftReview,
  InitiateCftReview,
  CompleteCftReview,
  ReturnFromCftReview,
  EscalateToQaReview,
  AssignFinalApprover,
  GrantFinalApproval,
  Close,
  RetryDepartmentReview,
  /// Not part of the table; recorded when an assessment forces the status to
  /// pending QA review.
  AssessmentEscalation,
}

impl DeviationStatus {
  /// The status reached by applying `transition` from `self`, or `None` if
  /// the graph has no such edge.
  pub fn next(self, transition: Transition) -> Option<Self> {
    use DeviationStatus as S;
    use Transition as T;

    match (self, transition) {
      (S::PendingDepartmentReview, T::InitiateDepartmentReview) => {
        Some(S::OngoingDepartmentReview)
      }
      (S::OngoingDepartmentReview, T::CompleteDepartmentReview) => {
        Some(S::DepartmentReviewCompleted)
      }
      (S::OngoingDepartmentReview, T::ReturnFromDepartmentReview) => {
        Some(S::DeviationReturned)
      }
      (S::OngoingDepartmentReview, T::DropDeviation) => {
        Some(S::DeviationDropped)
      }
      (S::DepartmentReviewCompleted, T::RequireCftReview) => {
        Some(S::PendingCftReview)
      }
      (S::DepartmentReviewCompleted, T::BypassCftReview) => {
        Some(S::PendingQaReview)
      }
      (S::DepartmentReviewCompleted | S::PendingCftReview, T::InitiateCftReview) => {
        Some(S::OngoingCftReview)
      }
      (S::OngoingCftReview, T::CompleteCftReview) => Some(S::CftReviewComplete),
      (S::OngoingCftReview, T::ReturnFromCftReview) => {
        Some(S::DeviationReturned)
      }
      (S::DepartmentReviewCompleted | S::CftReviewComplete, T::EscalateToQaReview) => {
        Some(S::PendingQaReview)
      }
      (S::PendingQaReview, T::AssignFinalApprover) => {
        Some(S::PendingFinalApproval)
      }
      (S::PendingFinalApproval, T::GrantFinalApproval) => Some(S::ApprovedByQa),
      (S::ApprovedByQa, T::Close) => Some(S::Closed),
      (S::DeviationReturned, T::RetryDepartmentReview) => {
        Some(S::PendingDepartmentReview)
      }
      _ => None,
    }
  }

  /// No transition leaves a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Closed | Self::DeviationDropped)
  }

  /// The column value stored in SQL.
  pub fn as_str(self) -> &'static str { self.into() }
}

impl Transition {
  /// Returning, dropping and retrying all have to say why.
  pub fn requires_justification(self) -> bool {
    matches!(
      self,
      Self::ReturnFromDepartmentReview
        | Self::DropDeviation
        | Self::ReturnFromCftReview
        | Self::RetryDepartmentReview
    )
  }

  /// Every status this transition may be applied from.
  pub fn sources(self) -> Vec<DeviationStatus> {
    DeviationStatus::iter()
      .filter(|s| s.next(self).is_some())
      .collect()
  }

  /// Map a department reviewer's chosen outcome to its transition.
  pub fn department_decision(decision: DeviationStatus) -> Result<Self> {
    match decision {
      DeviationStatus::DepartmentReviewCompleted => {
        Ok(Self::CompleteDepartmentReview)
      }
      DeviationStatus::DeviationReturned => Ok(Self::ReturnFromDepartmentReview),
      DeviationStatus::DeviationDropped => Ok(Self::DropDeviation),
      other => Err(Error::InvalidDecision {
        decision: other,
        stage:    "department review",
      }),
    }
  }

  /// Map a CFT reviewer's chosen outcome to its transition.
  pub fn cft_decision(decision: DeviationStatus) -> Result<Self> {
    match decision {
      DeviationStatus::CftReviewComplete => Ok(Self::CompleteCftReview),
      DeviationStatus::DeviationReturned => Ok(Self::ReturnFromCftReview),
      other => Err(Error::InvalidDecision {
        decision: other,
        stage:    "CFT review",
      }),
    }
  }

  pub fn as_str(self) -> &'static str { self.into() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn terminal_states_have_no_outgoing_edges() {
    for status in DeviationStatus::iter().filter(|s| s.is_terminal()) {
      for t in Transition::iter() {
        assert_eq!(status.next(t), None, "{status} --{t}--> should not exist");
      }
    }
  }

  #[test]
  fn every_non_terminal_state_has_a_way_out() {
    for status in DeviationStatus::iter().filter(|s| !s.is_terminal()) {
      assert!(
        Transition::iter().any(|t| status.next(t).is_some()),
        "{status} is a dead end"
      );
    }
  }

  #[test]
  fn assessment_escalation_is_not_in_the_table() {
    assert!(Transition::AssessmentEscalation.sources().is_empty());
  }

  #[test]
  fn escalation_only_from_completed_reviews() {
    assert_eq!(Transition::EscalateToQaReview.sources(), vec![
      DeviationStatus::DepartmentReviewCompleted,
      DeviationStatus::CftReviewComplete,
    ]);
  }

  #[test]
  fn close_only_from_approved_by_qa() {
    assert_eq!(Transition::Close.sources(), vec![
      DeviationStatus::ApprovedByQa
    ]);
  }

  #[test]
  fn retry_loop_returns_to_department_review() {
    assert_eq!(
      DeviationStatus::DeviationReturned.next(Transition::RetryDepartmentReview),
      Some(DeviationStatus::PendingDepartmentReview)
    );
  }

  #[test]
  fn cft_bypass_goes_straight_to_qa() {
    assert_eq!(
      DeviationStatus::DepartmentReviewCompleted.next(Transition::BypassCftReview),
      Some(DeviationStatus::PendingQaReview)
    );
  }

  #[test]
  fn department_decisions_map_to_transitions() {
    assert_eq!(
      Transition::department_decision(DeviationStatus::DeviationDropped).unwrap(),
      Transition::DropDeviation
    );
    let err =
      Transition::department_decision(DeviationStatus::Closed).unwrap_err();
    assert!(matches!(err, Error::InvalidDecision { .. }));
  }

  #[test]
  fn cft_decisions_reject_department_outcomes() {
    let err = Transition::cft_decision(DeviationStatus::DeviationDropped)
      .unwrap_err();
    assert!(matches!(err, Error::InvalidDecision { .. }));
  }

  #[test]
  fn status_strings_round_trip() {
    for status in DeviationStatus::iter() {
      let parsed: DeviationStatus = status.as_str().parse().unwrap();
      assert_eq!(parsed, status);
    }
    assert_eq!(DeviationStatus::ApprovedByQa.as_str(), "APPROVED_BY_QA");
    assert_eq!(DeviationStatus::CftReviewComplete.as_str(), "CFT_REVIEW_COMPLETE");
  }
}
