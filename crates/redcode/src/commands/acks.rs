//! `acks`: list who acknowledged an alert.

use tabled::Tabled;

use redcode_core::{AckStore, Acknowledgment, RemoteStore};

use crate::cli::{AcksArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AckRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Receiver")]
    receiver: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "At")]
    at: String,
}

impl From<&Acknowledgment> for AckRow {
    fn from(a: &Acknowledgment) -> Self {
        Self {
            id: a.id.to_string(),
            receiver: a.receiver_id.clone(),
            label: a.receiver_label.clone().unwrap_or_default(),
            at: a.created_at.format("%H:%M:%S").to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: AcksArgs,
    store: &RemoteStore,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let alert_id = util::parse_id(&args.alert_id)?;
    let acks = store.by_alert(&alert_id).await?;
    let out = output::render_list(
        &global.output,
        &acks,
        |a| AckRow::from(a),
        |a| a.receiver_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
