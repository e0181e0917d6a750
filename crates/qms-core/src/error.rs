//! Error types for `qms-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::{DeviationStatus, Transition};

/// The four failure classes a caller can act on.
///
/// `Validation` is never worth retrying as-is, `ConcurrencyConflict` is worth
/// re-reading and retrying, `NotFound` means the referenced id is wrong, and
/// `Storage` is an infrastructure failure whose writes were rolled back.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  ConcurrencyConflict,
  Storage,
  NotFound,
}

/// Implemented by every error type in the workspace.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("deviation {id}: {transition} is not allowed from {from}")]
  InvalidTransition {
    id:         i64,
    from:       DeviationStatus,
    transition: Transition,
  },

  #[error("{0} requires a non-empty justification")]
  MissingJustification(Transition),

  #[error("{decision} is not a valid outcome of {stage}")]
  InvalidDecision {
    decision: DeviationStatus,
    stage:    &'static str,
  },

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error(
    "deviation {id} changed concurrently: expected {expected}, found {actual}"
  )]
  Conflict {
    id:       i64,
    expected: DeviationStatus,
    actual:   DeviationStatus,
  },

  #[error("deviation {id} was modified concurrently (version {version})")]
  StaleVersion { id: i64, version: i64 },

  #[error("deviation not found: {0}")]
  DeviationNotFound(i64),

  #[error("approval not found: {0}")]
  ApprovalNotFound(i64),

  #[error("assessment not found: {0}")]
  AssessmentNotFound(i64),

  #[error("investigation not found: {0}")]
  InvestigationNotFound(i64),

  #[error("approval {0} is not pending")]
  ApprovalNotPending(i64),

  #[error("approval {0} is already resolved")]
  ApprovalAlreadyResolved(i64),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidTransition { .. }
      | Self::MissingJustification(_)
      | Self::InvalidDecision { .. }
      | Self::InvalidInput(_)
      | Self::ApprovalNotPending(_)
      | Self::ApprovalAlreadyResolved(_) => ErrorKind::Validation,
      Self::Conflict { .. } | Self::StaleVersion { .. } => {
        ErrorKind::ConcurrencyConflict
      }
      Self::DeviationNotFound(_)
      | Self::ApprovalNotFound(_)
      | Self::AssessmentNotFound(_)
      | Self::InvestigationNotFound(_) => ErrorKind::NotFound,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
