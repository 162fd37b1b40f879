// ── Record identity ──
//
// Store rows are keyed by whatever the table uses: identity bigints,
// uuids, or opaque strings. RecordId carries any of them behind one
// comparable, hashable type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unique row identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Uuid(Uuid),
    Text(String),
}

impl RecordId {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        if let Ok(n) = s.parse::<i64>() {
            return Self::Number(n);
        }
        match Uuid::parse_str(&s) {
            Ok(u) => Self::Uuid(u),
            Err(_) => Self::Text(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<Uuid> for RecordId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_first() {
        let id: RecordId = "42".parse().unwrap();
        assert_eq!(id, RecordId::Number(42));
        assert_eq!(id.as_number(), Some(42));
    }

    #[test]
    fn parses_uuid_strings() {
        let id = RecordId::from("550e8400-e29b-41d4-a716-446655440000");
        assert!(matches!(id, RecordId::Uuid(_)));
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn anything_else_is_text() {
        let id = RecordId::from("alarm-7b");
        assert_eq!(id, RecordId::Text("alarm-7b".into()));
        assert!(id.as_number().is_none());
    }

    #[test]
    fn serde_matches_wire_shape() {
        let n: RecordId = serde_json::from_str("17").unwrap();
        assert_eq!(n, RecordId::Number(17));
        let u: RecordId = serde_json::from_str("\"550e8400-e29b-41d4-a716-446655440000\"").unwrap();
        assert!(matches!(u, RecordId::Uuid(_)));
        assert_eq!(serde_json::to_string(&RecordId::Number(3)).unwrap(), "3");
    }
}
