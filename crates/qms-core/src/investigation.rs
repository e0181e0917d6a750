//! Investigations, the collaborator record an outcome is captured against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigation {
  pub investigation_id: i64,
  pub deviation_id:     i64,
  pub summary:          String,
  pub opened_at:        DateTime<Utc>,
}

/// Input to [`crate::store::DeviationStore::record_investigation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvestigation {
  #[serde(default)]
  pub deviation_id: i64,
  pub summary:      String,
}
