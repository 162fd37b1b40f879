// ── Alert domain types ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::record_id::RecordId;

// ── AlertCategory ───────────────────────────────────────────────────

/// What kind of emergency an alert announces.
///
/// The wire form is the code string stored in the alert table
/// (`"RED CODE 1"`, `"FIRE ALARM"`, ...). Codes outside the fixed set are
/// carried verbatim in [`Other`](Self::Other) so nothing from the store is
/// lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertCategory {
    /// `RED CODE 1`: cardiac or respiratory arrest.
    CardiacArrest,
    /// `RED CODE 2`: emergency resuscitation.
    Resuscitation,
    /// `BLUE CODE`: in-hospital emergency.
    InternalEmergency,
    /// `FIRE ALARM`.
    Fire,
    Other(String),
}

/// Color family a presentation surface uses for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Palette {
    Red,
    Blue,
}

impl AlertCategory {
    /// Every category in the fixed set, in dashboard order.
    pub const KNOWN: [Self; 4] = [
        Self::CardiacArrest,
        Self::Resuscitation,
        Self::InternalEmergency,
        Self::Fire,
    ];

    /// The code string stored in the alert table.
    pub fn code(&self) -> &str {
        match self {
            Self::CardiacArrest => "RED CODE 1",
            Self::Resuscitation => "RED CODE 2",
            Self::InternalEmergency => "BLUE CODE",
            Self::Fire => "FIRE ALARM",
            Self::Other(code) => code,
        }
    }

    /// Canonical human label. Used as the message when none is given.
    pub fn label(&self) -> &str {
        match self {
            Self::CardiacArrest => "Cardiac arrest",
            Self::Resuscitation => "Emergency resuscitation",
            Self::InternalEmergency => "Internal emergency",
            Self::Fire => "Fire",
            Self::Other(code) => code,
        }
    }

    /// Short kebab-case name accepted on the command line.
    pub fn slug(&self) -> Option<&'static str> {
        match self {
            Self::CardiacArrest => Some("red-1"),
            Self::Resuscitation => Some("red-2"),
            Self::InternalEmergency => Some("blue"),
            Self::Fire => Some("fire"),
            Self::Other(_) => None,
        }
    }

    /// Red for the RED CODE family and fire, blue otherwise.
    pub fn palette(&self) -> Palette {
        let code = self.code();
        if code.contains("RED") || code.contains("FIRE") {
            Palette::Red
        } else {
            Palette::Blue
        }
    }

    pub fn is_critical(&self) -> bool {
        self.palette() == Palette::Red
    }

    /// Map a stored code string to a category.
    pub fn from_code(code: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|c| c.code() == code)
            .unwrap_or_else(|| Self::Other(code.to_owned()))
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AlertCategory {
    type Err = std::convert::Infallible;

    /// Accepts the stored code (`"BLUE CODE"`), the slug (`"blue"`) or the
    /// code in any case with dashes for spaces (`"red-code-1"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let normalized = trimmed.replace(['-', '_'], " ").to_uppercase();
        let found = Self::KNOWN.into_iter().find(|c| {
            c.code() == normalized || c.slug().is_some_and(|slug| slug.eq_ignore_ascii_case(trimmed))
        });
        Ok(found.unwrap_or_else(|| Self::Other(trimmed.to_owned())))
    }
}

impl Serialize for AlertCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for AlertCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(&code))
    }
}

// ── AlertStatus ─────────────────────────────────────────────────────

/// Alert status. Transitions only from `Active` to `Resolved`.
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
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl AlertStatus {
    /// Lenient parse for store rows: anything other than `resolved` keeps
    /// the alert eligible for display.
    pub fn from_wire(raw: &str) -> Self {
        match raw.parse() {
            Ok(status) => status,
            Err(_) => {
                tracing::debug!(status = raw, "unknown alert status, treating as active");
                Self::Active
            }
        }
    }
}

// ── Alert ───────────────────────────────────────────────────────────

/// An alert row as the lifecycle sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: RecordId,
    pub category: AlertCategory,
    /// Free-text origin, typically the sending department.
    pub origin: String,
    pub message: String,
    pub status: AlertStatus,
    /// Authoritative origin of all timing. Never changes.
    pub created_at: DateTime<Utc>,
    pub sender_id: Option<String>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Fields for raising a new alert. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub category: AlertCategory,
    pub origin: String,
    pub message: String,
    pub sender_id: Option<String>,
}

impl NewAlert {
    /// A new alert whose message defaults to the category label.
    pub fn new(category: AlertCategory, origin: impl Into<String>) -> Self {
        let message = category.label().to_owned();
        Self {
            category,
            origin: origin.into(),
            message,
            sender_id: None,
        }
    }

    /// Set the message. Blank text keeps the category label.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.trim().is_empty() {
            self.message = message;
        }
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }
}
