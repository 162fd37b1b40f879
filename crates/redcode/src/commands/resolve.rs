//! `resolve`: mark an alert resolved so every station stops.

use redcode_core::{AlertStatus, AlertStore, RemoteStore};
use tracing::info;

use crate::cli::{GlobalOpts, ResolveArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    args: ResolveArgs,
    store: &RemoteStore,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::parse_id(&args.id)?;
    if !util::confirm(&format!("Resolve alert {id} for every station?"), global.yes)? {
        return Err(CliError::NotConfirmed {
            action: "resolve".into(),
        });
    }

    store.update_status(&id, AlertStatus::Resolved).await?;
    info!(alert_id = %id, "alert resolved");
    output::print_output(&format!("Resolved alert {id}"), global.quiet);
    Ok(())
}
