//! Cross-functional team (CFT) review assignment.
//!
//! The branch is taken once, when department review completes: either a CFT
//! department and reviewer are assigned and the deviation waits for CFT
//! review, or CFT is skipped and the deviation goes straight to QA.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, deviation::Deviation, status::Transition};

/// Input to [`crate::store::DeviationStore::assign_cft_reviewer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignCftReviewer {
  /// The user making the decision.
  pub actor_id:          i64,
  #[serde(default)]
  pub deviation_id:      i64,
  /// The department whose review just completed.
  pub department_id:     i64,
  pub cft_required:      bool,
  pub cft_department_id: Option<i64>,
  pub reviewer_id:       Option<i64>,
}

/// The validated branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CftDecision {
  NotRequired,
  Required {
    cft_department_id: i64,
    reviewer_id:       i64,
  },
}

impl AssignCftReviewer {
  /// A required review must name both the department and the reviewer.
  pub fn decision(&self) -> Result<CftDecision> {
    if !self.cft_required {
      return Ok(CftDecision::NotRequired);
    }
    match (self.cft_department_id, self.reviewer_id) {
      (Some(cft_department_id), Some(reviewer_id)) => Ok(CftDecision::Required {
        cft_department_id,
        reviewer_id,
      }),
      (None, _) => Err(Error::InvalidInput(
        "CFT review requires a CFT department".into(),
      )),
      (_, None) => Err(Error::InvalidInput(
        "CFT review requires a reviewer".into(),
      )),
    }
  }
}

impl CftDecision {
  pub fn transition(self) -> Transition {
    match self {
      Self::NotRequired => Transition::BypassCftReview,
      Self::Required { .. } => Transition::RequireCftReview,
    }
  }
}

/// Links a deviation to the department and user carrying out its CFT review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CftAssignment {
  pub assignment_id:     i64,
  pub deviation_id:      i64,
  pub department_id:     i64,
  pub cft_department_id: i64,
  pub reviewer_id:       i64,
  pub assigned_by:       i64,
  pub assigned_at:       DateTime<Utc>,
}

/// Result of assigning: the updated deviation plus the new assignment row
/// when CFT review was required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CftOutcome {
  pub deviation:  Deviation,
  pub assignment: Option<CftAssignment>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(required: bool) -> AssignCftReviewer {
    AssignCftReviewer {
      actor_id:          1,
      deviation_id:      2,
      department_id:     3,
      cft_required:      required,
      cft_department_id: None,
      reviewer_id:       None,
    }
  }

  #[test]
  fn not_required_ignores_missing_selections() {
    let decision = request(false).decision().unwrap();
    assert_eq!(decision, CftDecision::NotRequired);
    assert_eq!(decision.transition(), Transition::BypassCftReview);
  }

  #[test]
  fn required_without_reviewer_is_rejected() {
    let mut req = request(true);
    req.cft_department_id = Some(5);
    assert!(matches!(req.decision(), Err(Error::InvalidInput(_))));
  }

  #[test]
  fn required_with_selections_branches_to_cft() {
    let mut req = request(true);
    req.cft_department_id = Some(5);
    req.reviewer_id = Some(8);
    let decision = req.decision().unwrap();
    assert_eq!(decision, CftDecision::Required {
      cft_department_id: 5,
      reviewer_id:       8,
    });
    assert_eq!(decision.transition(), Transition::RequireCftReview);
  }
}
