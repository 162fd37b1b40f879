//! `alerts`: alert history and the latest active alert.

use chrono::Utc;
use tabled::Tabled;

use redcode_core::{Alert, AlertStore, RemoteStore};

use crate::cli::{AlertsArgs, AlertsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

const MAX_LIMIT: u32 = 500;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Raised")]
    raised: String,
}

impl AlertRow {
    fn new(alert: &Alert, now: chrono::DateTime<Utc>) -> Self {
        Self {
            id: alert.id.to_string(),
            category: alert.category.to_string(),
            origin: alert.origin.clone(),
            message: alert.message.clone(),
            status: alert.status.to_string(),
            raised: util::age(alert.created_at, now),
        }
    }
}

fn detail(alert: &Alert) -> String {
    format!(
        "Alert {}\n  category: {} ({})\n  origin:   {}\n  message:  {}\n  status:   {}\n  raised:   {}",
        alert.id,
        alert.category,
        alert.category.palette(),
        alert.origin,
        alert.message,
        alert.status,
        util::age(alert.created_at, Utc::now()),
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: AlertsArgs,
    store: &RemoteStore,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AlertsCommand::List { limit } => {
            if limit == 0 || limit > MAX_LIMIT {
                return Err(CliError::Validation {
                    field: "limit".into(),
                    reason: format!("must be between 1 and {MAX_LIMIT}"),
                });
            }
            let alerts = store.recent(limit).await?;
            let now = Utc::now();
            let out = output::render_list(
                &global.output,
                &alerts,
                |a| AlertRow::new(a, now),
                |a| a.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
        AlertsCommand::Latest => {
            let Some(alert) = store.latest_active().await? else {
                output::print_output("No active alert", global.quiet);
                return Ok(());
            };
            let out = output::render_single(&global.output, &alert, detail, |a| a.id.to_string());
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
