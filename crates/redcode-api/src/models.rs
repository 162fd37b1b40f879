// Wire types for the alert store tables.
//
// These mirror the PostgREST row shapes exactly. Conversion into the
// canonical domain types happens in `redcode-core`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key as it appears on the wire.
///
/// Tables created with `bigint generated always as identity` return JSON
/// numbers; `uuid` keys come back as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A row of the `alarms` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRow {
    pub id: RowId,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub department_source: Option<String>,
    pub code_type: String,
    #[serde(default)]
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the `alarms` table.
///
/// `id` and `created_at` are assigned by the database.
#[derive(Debug, Clone, Serialize)]
pub struct NewAlarmRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub department_source: String,
    pub code_type: String,
    pub message: String,
    pub status: String,
}

/// A row of the `acknowledgments` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckRow {
    pub id: RowId,
    pub alarm_id: RowId,
    pub receiver_id: String,
    #[serde(default)]
    pub receiver_department: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the `acknowledgments` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewAckRow {
    pub alarm_id: RowId,
    pub receiver_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_department: Option<String>,
}

/// PostgREST error body (`{code, message, details, hint}`).
#[derive(Debug, Deserialize)]
pub(crate) struct RestErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}
