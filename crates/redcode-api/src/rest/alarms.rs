// Queries against the alarms table.

use serde::Serialize;

use super::{RestClient, eq};
use crate::Error;
use crate::models::{AlarmRow, NewAlarmRow, RowId};

#[derive(Serialize)]
struct StatusPatch<'a> {
    status: &'a str,
}

impl RestClient {
    /// The most recently created alarm whose status is `active`, if any.
    pub async fn latest_active_alarm(&self) -> Result<Option<AlarmRow>, Error> {
        let rows: Vec<AlarmRow> = self
            .select(
                &self.tables.alarms,
                &[
                    ("select", "*".into()),
                    ("status", eq("active")),
                    ("order", "created_at.desc".into()),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// The `limit` most recent alarms, newest first.
    pub async fn recent_alarms(&self, limit: u32) -> Result<Vec<AlarmRow>, Error> {
        self.select(
            &self.tables.alarms,
            &[
                ("select", "*".into()),
                ("order", "created_at.desc".into()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    pub async fn insert_alarm(&self, row: &NewAlarmRow) -> Result<AlarmRow, Error> {
        self.insert(&self.tables.alarms, row).await
    }

    /// Set the status of one alarm. Updating a row that no longer matches
    /// is not an error.
    pub async fn update_alarm_status(&self, id: &RowId, status: &str) -> Result<(), Error> {
        self.update(
            &self.tables.alarms,
            &[("id", eq(id))],
            &StatusPatch { status },
        )
        .await
    }
}
