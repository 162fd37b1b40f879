//! `raise`: create a new alert for every station.

use std::sync::Arc;
use std::time::Duration;

use redcode_core::{AlarmController, Alert, AudioOutput, Clock, NewAlert, RemoteStore, SystemClock};

use crate::audio::TerminalBell;
use crate::cli::{GlobalOpts, RaiseArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    args: RaiseArgs,
    store: &RemoteStore,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let station = config::resolve_station(global, config, None)?;
    let category = util::parse_category(&args.category)?;

    let origin = args
        .origin
        .or_else(|| station.receiver.label.clone())
        .ok_or_else(|| CliError::Validation {
            field: "origin".into(),
            reason: "pass --origin or set a label on the profile".into(),
        })?;
    let mut alert = NewAlert::new(category, origin).with_sender(station.receiver.id.clone());
    if let Some(message) = args.message {
        alert = alert.with_message(message);
    }

    let prompt = format!(
        "Raise {} from {} for every station?",
        alert.category, alert.origin
    );
    if !util::confirm(&prompt, global.yes)? {
        return Err(CliError::NotConfirmed {
            action: "raise".into(),
        });
    }

    // Never started, so it plays nothing; it only validates and writes.
    let store = Arc::new(store.clone());
    let audio: Arc<dyn AudioOutput> = Arc::new(TerminalBell::new(Duration::ZERO, true).silent());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controller = AlarmController::new(station, store.clone(), store, audio, clock);

    let created = controller.raise(alert).await?;
    let out = output::render_single(&global.output, &created, detail, |a| a.id.to_string());
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(alert: &Alert) -> String {
    format!(
        "Raised alert {}\n  category: {}\n  origin:   {}\n  message:  {}\n  created:  {}",
        alert.id,
        alert.category,
        alert.origin,
        alert.message,
        alert.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
