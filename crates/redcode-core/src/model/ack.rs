// ── Acknowledgment domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record_id::RecordId;

/// One station's receipt of an alert. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub id: RecordId,
    pub alert_id: RecordId,
    pub receiver_id: String,
    /// Human label of the receiving station, e.g. its department.
    pub receiver_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for recording an acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAcknowledgment {
    pub alert_id: RecordId,
    pub receiver_id: String,
    pub receiver_label: Option<String>,
}
