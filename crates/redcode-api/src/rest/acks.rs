// Queries against the acknowledgments table.

use super::{RestClient, eq};
use crate::Error;
use crate::models::{AckRow, NewAckRow, RowId};

impl RestClient {
    /// All acknowledgments for an alarm, oldest first.
    pub async fn acks_for_alarm(&self, alarm_id: &RowId) -> Result<Vec<AckRow>, Error> {
        self.select(
            &self.tables.acknowledgments,
            &[
                ("select", "*".into()),
                ("alarm_id", eq(alarm_id)),
                ("order", "created_at.asc".into()),
            ],
        )
        .await
    }

    /// Acknowledgments a single receiver has sent for an alarm.
    pub async fn acks_for_receiver(
        &self,
        alarm_id: &RowId,
        receiver_id: &str,
    ) -> Result<Vec<AckRow>, Error> {
        self.select(
            &self.tables.acknowledgments,
            &[
                ("select", "*".into()),
                ("alarm_id", eq(alarm_id)),
                ("receiver_id", eq(receiver_id)),
            ],
        )
        .await
    }

    pub async fn insert_ack(&self, row: &NewAckRow) -> Result<AckRow, Error> {
        self.insert(&self.tables.acknowledgments, row).await
    }
}
