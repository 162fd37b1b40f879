// ── Wire row ↔ domain conversions ──
//
// Store rows (redcode-api) become canonical domain types here and nowhere
// else. Row conversions are infallible: unknown codes and statuses are
// preserved or normalized rather than rejected.

use redcode_api::{AckRow, AlarmRow, NewAckRow, NewAlarmRow, RowId};

use crate::model::{
    Acknowledgment, Alert, AlertCategory, AlertStatus, NewAcknowledgment, NewAlert, RecordId,
};

impl From<RowId> for RecordId {
    fn from(id: RowId) -> Self {
        match id {
            RowId::Int(n) => Self::Number(n),
            RowId::Text(s) => Self::from(s),
        }
    }
}

impl From<&RecordId> for RowId {
    fn from(id: &RecordId) -> Self {
        match id {
            RecordId::Number(n) => Self::Int(*n),
            RecordId::Uuid(u) => Self::Text(u.to_string()),
            RecordId::Text(s) => Self::Text(s.clone()),
        }
    }
}

impl From<AlarmRow> for Alert {
    fn from(row: AlarmRow) -> Self {
        let category = AlertCategory::from_code(&row.code_type);
        let message = match row.message {
            Some(m) if !m.trim().is_empty() => m,
            _ => category.label().to_owned(),
        };

        Self {
            id: row.id.into(),
            category,
            origin: row.department_source.unwrap_or_default(),
            message,
            status: AlertStatus::from_wire(&row.status),
            created_at: row.created_at,
            sender_id: row.sender_id,
        }
    }
}

impl From<&NewAlert> for NewAlarmRow {
    fn from(alert: &NewAlert) -> Self {
        Self {
            sender_id: alert.sender_id.clone(),
            department_source: alert.origin.clone(),
            code_type: alert.category.code().to_owned(),
            message: alert.message.clone(),
            status: AlertStatus::Active.to_string(),
        }
    }
}

impl From<AckRow> for Acknowledgment {
    fn from(row: AckRow) -> Self {
        Self {
            id: row.id.into(),
            alert_id: row.alarm_id.into(),
            receiver_id: row.receiver_id,
            receiver_label: row.receiver_department,
            created_at: row.created_at,
        }
    }
}

impl From<&NewAcknowledgment> for NewAckRow {
    fn from(ack: &NewAcknowledgment) -> Self {
        Self {
            alarm_id: RowId::from(&ack.alert_id),
            receiver_id: ack.receiver_id.clone(),
            receiver_department: ack.receiver_label.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn row(code: &str, message: Option<&str>, status: &str) -> AlarmRow {
        AlarmRow {
            id: RowId::Int(12),
            sender_id: Some("u-1".into()),
            department_source: Some("Emergency".into()),
            code_type: code.into(),
            message: message.map(String::from),
            status: status.into(),
            created_at: Utc.with_ymd_and_hms(2025, 11, 20, 8, 15, 0).unwrap(),
        }
    }

    #[test]
    fn alarm_row_becomes_alert() {
        let alert = Alert::from(row("FIRE ALARM", Some("Kitchen, level 2"), "active"));
        assert_eq!(alert.id, RecordId::Number(12));
        assert_eq!(alert.category, AlertCategory::Fire);
        assert_eq!(alert.origin, "Emergency");
        assert_eq!(alert.message, "Kitchen, level 2");
        assert!(alert.is_active());
    }

    #[test]
    fn empty_message_defaults_to_label() {
        let alert = Alert::from(row("BLUE CODE", Some(""), "resolved"));
        assert_eq!(alert.message, "Internal emergency");
        assert_eq!(alert.status, AlertStatus::Resolved);

        let alert = Alert::from(row("GREEN CODE", None, "active"));
        assert_eq!(alert.message, "GREEN CODE");
    }

    #[test]
    fn uuid_ids_round_trip_as_text() {
        let id = RecordId::from("550e8400-e29b-41d4-a716-446655440000");
        let wire = RowId::from(&id);
        assert_eq!(wire, RowId::Text("550e8400-e29b-41d4-a716-446655440000".into()));
        assert_eq!(RecordId::from(wire), id);
    }

    #[test]
    fn new_alert_row_is_active() {
        let new = NewAlert::new(AlertCategory::Resuscitation, "Cardiology").with_sender("u-9");
        let row = NewAlarmRow::from(&new);
        assert_eq!(row.code_type, "RED CODE 2");
        assert_eq!(row.message, "Emergency resuscitation");
        assert_eq!(row.status, "active");
        assert_eq!(row.sender_id.as_deref(), Some("u-9"));
    }
}
