//! `watch`: run this station until interrupted.
//!
//! Renders lifecycle transitions as banners, keeps a countdown status line
//! on interactive terminals and reads operator intents from stdin.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use redcode_core::{
    ActiveView, AlarmController, Alert, AudioOutput, Clock, LifecycleState, Notice, Palette,
    RemoteStore, StationConfig, StopOutcome, SystemClock,
};

use crate::audio::TerminalBell;
use crate::cli::{GlobalOpts, WatchArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

/// Simulated length of one clip.
const CLIP_LENGTH: Duration = Duration::from_secs(3);

const HELP: &str = "commands: stop | sound | clip <locator> | clip | status | quit";

// ── Operator intents ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StationIntent {
    Stop,
    Sound,
    /// Install (or clear) the receiver clip.
    Clip(Option<String>),
    Status,
    Help,
    Quit,
}

/// Parse one stdin line. `None` for blank or unknown input.
pub(crate) fn parse_intent(line: &str) -> Option<StationIntent> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let rest = words.collect::<Vec<_>>().join(" ");
    let intent = match verb.as_str() {
        "stop" | "s" => StationIntent::Stop,
        "sound" | "audio" | "enable" => StationIntent::Sound,
        "clip" => StationIntent::Clip((!rest.is_empty()).then_some(rest)),
        "status" => StationIntent::Status,
        "help" | "?" => StationIntent::Help,
        "quit" | "exit" | "q" => StationIntent::Quit,
        _ => return None,
    };
    Some(intent)
}

// ── Presentation ─────────────────────────────────────────────────────

/// One piece of terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Permanent output.
    Line(String),
    /// Replaceable status line (countdown).
    Status(String),
}

/// Turns successive lifecycle states into terminal frames.
pub(crate) struct Presenter {
    color: bool,
    station: String,
    last: LifecycleState,
}

impl Presenter {
    pub(crate) fn new(station: &StationConfig, color: bool) -> Self {
        let station = match station.receiver.label {
            Some(ref label) => format!("{label} ({})", station.receiver.id),
            None => station.receiver.id.clone(),
        };
        Self {
            color,
            station,
            last: LifecycleState::Idle,
        }
    }

    pub(crate) fn update(&mut self, next: &LifecycleState) -> Vec<Frame> {
        let prev = std::mem::replace(&mut self.last, next.clone());
        let mut frames = Vec::new();

        match (&prev, next) {
            (LifecycleState::Idle, LifecycleState::Idle) => {}
            (_, LifecycleState::Idle) => {
                if let Some(id) = prev.alert_id() {
                    frames.push(Frame::Line(self.dim(&format!("alert {id} ended"))));
                }
            }
            (LifecycleState::Active(before), LifecycleState::Active(view))
                if before.alert.id == view.alert.id =>
            {
                for ack in view.acks.iter().filter(|a| !before.acks.contains(a)) {
                    let who = ack.receiver_label.as_deref().unwrap_or(&ack.receiver_id);
                    frames.push(Frame::Line(format!("  ✓ acknowledged by {who}")));
                }
                if before.audio_permitted && !view.audio_permitted {
                    frames.push(Frame::Line(Self::blocked_hint()));
                }
                frames.push(Frame::Status(self.status(view)));
            }
            (_, LifecycleState::Active(view)) => {
                frames.push(Frame::Line(self.banner(&view.alert)));
                if !view.audio_permitted {
                    frames.push(Frame::Line(Self::blocked_hint()));
                }
                frames.push(Frame::Status(self.status(view)));
            }
            (LifecycleState::Dismissed { alert_id: before, .. }, LifecycleState::Dismissed { alert_id, remaining })
                if before == alert_id =>
            {
                frames.push(Frame::Status(self.dim(&format!(
                    "silenced · resolves in {}",
                    util::countdown(*remaining)
                ))));
            }
            (_, LifecycleState::Dismissed { alert_id, remaining }) => {
                frames.push(Frame::Line(format!(
                    "alert {alert_id} silenced on this station; it still expires in {}",
                    util::countdown(*remaining)
                )));
            }
            (LifecycleState::Resolving { alert_id: before }, LifecycleState::Resolving { alert_id })
                if before == alert_id => {}
            (_, LifecycleState::Resolving { alert_id }) => {
                frames.push(Frame::Line(format!("resolving alert {alert_id} for every station…")));
            }
        }
        frames
    }

    fn banner(&self, alert: &Alert) -> String {
        let rule = "━".repeat(48);
        let title = format!(" {}  ·  from {}", alert.category.code(), alert.origin);
        let (rule, title) = if self.color {
            match alert.category.palette() {
                Palette::Red => (rule.red().to_string(), title.red().bold().to_string()),
                Palette::Blue => (rule.blue().to_string(), title.blue().bold().to_string()),
            }
        } else {
            (rule, title)
        };
        format!(
            "{rule}\n{title}\n {}\n {}\n{rule}",
            alert.message,
            self.dim(&format!("station {} · alert {}", self.station, alert.id)),
        )
    }

    fn status(&self, view: &ActiveView) -> String {
        let acks = match view.acks.len() {
            1 => "1 acknowledgment".to_owned(),
            n => format!("{n} acknowledgments"),
        };
        let audio = if view.audio_permitted {
            view.chain.to_string()
        } else {
            "audio blocked".to_owned()
        };
        let countdown = util::countdown(view.remaining);
        let countdown = if self.color {
            countdown.bold().to_string()
        } else {
            countdown
        };
        format!("  ⏱ {countdown} · {acks} · {audio}")
    }

    fn blocked_hint() -> String {
        "  ♪ audio is blocked; type `sound` to enable it".to_owned()
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_owned()
        }
    }
}

/// Writes frames to stdout; status lines only on a terminal.
struct Screen {
    interactive: bool,
    quiet: bool,
    status_shown: bool,
}

impl Screen {
    fn new(quiet: bool) -> Self {
        Self {
            interactive: io::stdout().is_terminal(),
            quiet,
            status_shown: false,
        }
    }

    fn show(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            match frame {
                Frame::Line(line) => self.line(&line),
                Frame::Status(status) => self.status(&status),
            }
        }
    }

    fn line(&mut self, text: &str) {
        if self.quiet {
            return;
        }
        let mut stdout = io::stdout().lock();
        if self.status_shown {
            let _ = writeln!(stdout);
            self.status_shown = false;
        }
        let _ = writeln!(stdout, "{text}");
    }

    fn status(&mut self, text: &str) {
        if self.quiet || !self.interactive {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\r\x1b[2K{text}");
        let _ = stdout.flush();
        self.status_shown = true;
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: WatchArgs,
    store: &RemoteStore,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let station = config::resolve_station(global, config, Some(&args.lifecycle))?;
    let store = Arc::new(store.clone());
    let audio: Arc<dyn AudioOutput> = Arc::new(TerminalBell::new(CLIP_LENGTH, args.lifecycle.muted));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let controller = AlarmController::new(station, store.clone(), store, audio, clock);
    let mut presenter = Presenter::new(controller.station(), output::should_color(&global.color));
    let mut screen = Screen::new(global.quiet);

    let mut state = controller.state();
    let mut notices = controller.notices();
    controller.start().await?;

    screen.line(&format!(
        "watching as {} · {} · manual stop: {}",
        presenter.station,
        humantime::format_duration(controller.station().expiry),
        controller.station().manual_stop
    ));
    screen.line(HELP);
    info!(receiver = %controller.station().receiver.id, "station watching");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = state.borrow_and_update().clone();
                screen.show(presenter.update(&next));
            }

            notice = notices.recv() => match notice {
                Ok(Notice::Acknowledged { alert_id }) => {
                    debug!(%alert_id, "own acknowledgment written");
                }
                Ok(notice) => screen.line(&format!("  ! {notice}")),
                Err(RecvError::Lagged(n)) => debug!(skipped = n, "notice stream lagged"),
                Err(RecvError::Closed) => break,
            },

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_intent(&line) {
                    Some(StationIntent::Quit) => break,
                    Some(intent) => {
                        let reply = apply(&controller, intent).await?;
                        screen.line(&reply);
                    }
                    None if line.trim().is_empty() => {}
                    None => screen.line(HELP),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    controller.stop().await;
    screen.line("station stopped");
    Ok(())
}

async fn apply(controller: &AlarmController, intent: StationIntent) -> Result<String, CliError> {
    let reply = match intent {
        StationIntent::Stop => match controller.manual_stop().await? {
            StopOutcome::Dismissed => "silenced on this station".to_owned(),
            StopOutcome::Resolving => "resolving for every station".to_owned(),
            StopOutcome::NothingActive => "nothing to stop".to_owned(),
        },
        StationIntent::Sound => {
            if controller.enable_audio().await? {
                "audio enabled".to_owned()
            } else {
                "audio allowed; nothing is sounding".to_owned()
            }
        }
        StationIntent::Clip(clip) => {
            let reply = match clip {
                Some(ref locator) => format!("receiver clip set to {locator}"),
                None => "receiver clip cleared".to_owned(),
            };
            controller.set_receiver_clip(clip).await?;
            reply
        }
        StationIntent::Status => describe(&controller.snapshot()),
        StationIntent::Help => HELP.to_owned(),
        StationIntent::Quit => String::new(),
    };
    Ok(reply)
}

fn describe(state: &LifecycleState) -> String {
    match state {
        LifecycleState::Idle => "idle".to_owned(),
        LifecycleState::Active(view) => format!(
            "active: {} (alert {}), {} left, {} acknowledged",
            view.alert.category,
            view.alert.id,
            util::countdown(view.remaining),
            view.acks.len()
        ),
        LifecycleState::Dismissed {
            alert_id,
            remaining,
        } => format!(
            "silenced: alert {alert_id}, {} left",
            util::countdown(*remaining)
        ),
        LifecycleState::Resolving { alert_id } => format!("resolving alert {alert_id}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use redcode_core::{
        Acknowledgment, AlertCategory, AlertStatus, ChainState, ReceiverIdentity, RecordId,
    };

    use super::*;

    fn presenter() -> Presenter {
        let station = StationConfig::new(ReceiverIdentity::new("ward-3").with_label("CARDIOLOGY"));
        Presenter::new(&station, false)
    }

    fn at() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_763_626_500, 0).unwrap()
    }

    fn view(id: i64, remaining: u64, acks: Vec<Acknowledgment>) -> LifecycleState {
        LifecycleState::Active(ActiveView {
            alert: Alert {
                id: RecordId::Number(id),
                category: AlertCategory::Fire,
                origin: "Emergency".into(),
                message: "Smoke in ward 3".into(),
                status: AlertStatus::Active,
                created_at: at(),
                sender_id: None,
            },
            remaining: Duration::from_secs(remaining),
            acks,
            audio_permitted: true,
            chain: ChainState::PlayingPrimary,
        })
    }

    fn ack(id: i64, label: &str) -> Acknowledgment {
        Acknowledgment {
            id: RecordId::Number(id),
            alert_id: RecordId::Number(7),
            receiver_id: label.to_lowercase(),
            receiver_label: Some(label.into()),
            created_at: at(),
        }
    }

    #[test]
    fn intents_parse_case_insensitively() {
        assert_eq!(parse_intent("STOP"), Some(StationIntent::Stop));
        assert_eq!(parse_intent(" sound "), Some(StationIntent::Sound));
        assert_eq!(
            parse_intent("clip alarm-sounds/ward 3.mp3"),
            Some(StationIntent::Clip(Some("alarm-sounds/ward 3.mp3".into())))
        );
        assert_eq!(parse_intent("clip"), Some(StationIntent::Clip(None)));
        assert_eq!(parse_intent("q"), Some(StationIntent::Quit));
        assert_eq!(parse_intent(""), None);
        assert_eq!(parse_intent("dance"), None);
    }

    #[test]
    fn new_alert_prints_banner_then_status() {
        let mut p = presenter();
        let frames = p.update(&view(7, 60, vec![]));
        assert_eq!(frames.len(), 2);
        let Frame::Line(ref banner) = frames[0] else {
            panic!("expected banner, got {frames:?}");
        };
        assert!(banner.contains("FIRE ALARM"));
        assert!(banner.contains("from Emergency"));
        assert!(banner.contains("CARDIOLOGY (ward-3)"));
        assert_eq!(
            frames[1],
            Frame::Status("  ⏱ 01:00 · 0 acknowledgments · playing-primary".into())
        );
    }

    #[test]
    fn countdown_only_updates_status() {
        let mut p = presenter();
        p.update(&view(7, 60, vec![]));
        let frames = p.update(&view(7, 59, vec![]));
        assert!(matches!(frames.as_slice(), [Frame::Status(_)]));
    }

    #[test]
    fn new_acknowledgments_are_announced_once() {
        let mut p = presenter();
        p.update(&view(7, 60, vec![ack(1, "ICU")]));
        let frames = p.update(&view(7, 58, vec![ack(1, "ICU"), ack(2, "RADIOLOGY")]));
        assert_eq!(frames[0], Frame::Line("  ✓ acknowledged by RADIOLOGY".into()));
        assert!(matches!(frames[1], Frame::Status(_)));
    }

    #[test]
    fn end_of_alert_is_reported() {
        let mut p = presenter();
        p.update(&view(7, 60, vec![]));
        p.update(&LifecycleState::Resolving {
            alert_id: RecordId::Number(7),
        });
        let frames = p.update(&LifecycleState::Idle);
        assert_eq!(frames, vec![Frame::Line("alert 7 ended".into())]);
        assert!(p.update(&LifecycleState::Idle).is_empty());
    }

    #[test]
    fn dismissal_keeps_counting() {
        let mut p = presenter();
        p.update(&view(7, 60, vec![]));
        let dismissed = |secs| LifecycleState::Dismissed {
            alert_id: RecordId::Number(7),
            remaining: Duration::from_secs(secs),
        };
        let first = p.update(&dismissed(40));
        assert!(matches!(first.as_slice(), [Frame::Line(l)] if l.contains("still expires in 00:40")));
        let next = p.update(&dismissed(39));
        assert_eq!(next, vec![Frame::Status("silenced · resolves in 00:39".into())]);
    }
}
