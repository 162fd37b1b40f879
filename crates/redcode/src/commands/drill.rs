//! `drill`: an offline exercise of the full lifecycle.
//!
//! Several stations share one in-memory store. The first station raises an
//! alert; every station sounds and acknowledges it, and it ends by expiry or
//! by a manual stop from the first station.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use redcode_core::{
    AlarmController, AlertCategory, AudioOutput, Clock, LifecycleState, ManualStopPolicy,
    MemoryStore, NewAlert, ReceiverIdentity, StationConfig, StopOutcome, SystemClock,
};

use crate::audio::TerminalBell;
use crate::cli::{DrillArgs, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;
use super::watch::{Frame, Presenter};

const CLIP_LENGTH: Duration = Duration::from_secs(1);

/// Extra time past expiry before the drill is declared stuck.
const GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct DrillReport {
    alert_id: String,
    category: String,
    stations: usize,
    acknowledgments: usize,
    final_status: String,
    ended_by: String,
    elapsed: String,
}

fn detail(report: &DrillReport) -> String {
    format!(
        "Drill complete\n  alert:           {} ({})\n  stations:        {}\n  acknowledgments: {}\n  final status:    {}\n  ended by:        {}\n  elapsed:         {}",
        report.alert_id,
        report.category,
        report.stations,
        report.acknowledgments,
        report.final_status,
        report.ended_by,
        report.elapsed,
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DrillArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let category = util::parse_category(&args.category)?;
    let expiry = config::parse_duration("expiry", &args.expiry)?;
    let stop_after = args
        .stop_after
        .as_deref()
        .map(|raw| config::parse_duration("stop-after", raw))
        .transpose()?;
    let policy = ManualStopPolicy::from(args.manual_stop);

    // A configured profile contributes its sound table.
    let sounds = config::resolve_station(global, config, None)
        .map(|s| s.sounds)
        .unwrap_or_default();

    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut stations = Vec::with_capacity(usize::from(args.stations));
    for n in 1..=args.stations {
        let receiver =
            ReceiverIdentity::new(format!("drill-{n}")).with_label(format!("STATION {n}"));
        let mut station = StationConfig::new(receiver);
        station.expiry = expiry;
        station.manual_stop = policy;
        station.sounds = sounds.clone();

        let audio: Arc<dyn AudioOutput> = Arc::new(TerminalBell::new(CLIP_LENGTH, false).silent());
        let controller = AlarmController::new(
            station,
            store.clone(),
            store.clone(),
            audio,
            Arc::clone(&clock),
        );
        controller.start().await?;
        stations.push(controller);
    }
    let Some(first) = stations.first().cloned() else {
        return Err(CliError::Validation {
            field: "stations".into(),
            reason: "a drill needs at least one station".into(),
        });
    };

    let color = output::should_color(&global.color);
    let printers: Vec<JoinHandle<()>> = stations
        .iter()
        .map(|c| spawn_printer(c, color, global.quiet))
        .collect();

    let started = Instant::now();
    let message = format!("{} drill", category.label());
    let alert = first
        .raise(
            NewAlert::new(category, "DRILL")
                .with_message(message)
                .with_sender("drill-1"),
        )
        .await?;
    info!(alert_id = %alert.id, stations = stations.len(), "drill alert raised");

    let limit = expiry + GRACE;
    let outcome = tokio::time::timeout(limit, async {
        wait_all(&stations, |s| !s.is_idle()).await?;
        let stopped = match stop_after {
            Some(after) => {
                tokio::time::sleep(after).await;
                Some(first.manual_stop().await?)
            }
            None => None,
        };
        wait_all(&stations, LifecycleState::is_idle).await?;
        Ok::<_, CliError>(stopped)
    })
    .await;

    for controller in &stations {
        controller.stop().await;
    }
    for printer in printers {
        printer.abort();
    }
    let stopped = outcome.map_err(|_| CliError::Timeout {
        seconds: limit.as_secs(),
    })??;

    let ended_by = match (stopped, policy) {
        (Some(StopOutcome::Resolving), _) => "manual stop (global)".to_owned(),
        (Some(StopOutcome::Dismissed), ManualStopPolicy::LocalOnly) => {
            "expiry (first station silenced locally)".to_owned()
        }
        _ => "expiry".to_owned(),
    };

    let acks = first.acknowledgments(&alert.id).await?;
    let final_status = first
        .history(u32::from(args.stations) + 1)
        .await?
        .into_iter()
        .find(|a| a.id == alert.id)
        .map_or_else(|| "unknown".to_owned(), |a| a.status.to_string());

    let report = DrillReport {
        alert_id: alert.id.to_string(),
        category: alert.category.to_string(),
        stations: stations.len(),
        acknowledgments: acks.len(),
        final_status,
        ended_by,
        elapsed: humantime::format_duration(Duration::from_secs(started.elapsed().as_secs()))
            .to_string(),
    };
    let out = output::render_single(&global.output, &report, detail, |r| r.final_status.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn wait_all(
    stations: &[AlarmController],
    done: fn(&LifecycleState) -> bool,
) -> Result<(), CliError> {
    for controller in stations {
        let mut state = controller.state();
        if state.wait_for(done).await.is_err() {
            return Err(CliError::ControllerStopped);
        }
    }
    Ok(())
}

/// Print each station's transitions, prefixed by its label.
fn spawn_printer(controller: &AlarmController, color: bool, quiet: bool) -> JoinHandle<()> {
    let mut state = controller.state();
    let mut presenter = Presenter::new(controller.station(), color);
    let label = controller
        .station()
        .receiver
        .label
        .clone()
        .unwrap_or_else(|| controller.station().receiver.id.clone());

    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let next = state.borrow_and_update().clone();
            for frame in presenter.update(&next) {
                if let Frame::Line(text) = frame {
                    if !quiet {
                        for line in text.lines() {
                            println!("[{label}] {line}");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn drill_args(args: &[&str]) -> (DrillArgs, GlobalOpts) {
        let cli = Cli::try_parse_from(
            ["redcode", "--quiet", "drill"]
                .into_iter()
                .chain(args.iter().copied()),
        )
        .unwrap();
        match cli.command {
            Command::Drill(drill) => (drill, cli.global),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drill_runs_to_expiry() {
        let (args, global) = drill_args(&["--stations", "3", "--expiry", "4s"]);
        handle(args, &Config::default(), &global).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drill_with_global_stop() {
        let (args, global) = drill_args(&["--expiry", "30s", "--stop-after", "2s"]);
        handle(args, &Config::default(), &global).await.unwrap();
    }

    #[tokio::test]
    async fn drill_rejects_bad_expiry() {
        let (args, global) = drill_args(&["--expiry", "whenever"]);
        let err = handle(args, &Config::default(), &global).await.unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "expiry"));
    }
}
