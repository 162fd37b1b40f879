// ── Expiry deadline ──
//
// Two watchdogs guard the same deadline: a one-shot timer armed for the
// remaining time at activation, and a periodic tick that recomputes the
// remaining time from the alert's creation timestamp. Whichever observes
// the deadline first triggers auto-resolution.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

/// Time left before an alert created at `created_at` expires.
///
/// `max(0, expiry - (now - created_at))`. A creation time in the future
/// (clock skew between stations) counts as zero elapsed, so the result
/// never exceeds `expiry`.
pub fn remaining(expiry: Duration, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let elapsed = (now - created_at).to_std().unwrap_or(Duration::ZERO);
    expiry.saturating_sub(elapsed)
}

/// Which watchdog fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fired {
    Timer,
    Tick,
}

/// The pair of deadline watchdogs for the displayed alert.
#[derive(Debug, Default)]
pub(crate) struct Watchdog {
    timer: Option<Pin<Box<Sleep>>>,
    tick: Option<Interval>,
}

impl Watchdog {
    /// Arm the one-shot timer for `remaining` and start the tick.
    /// Replaces anything previously armed.
    pub(crate) fn arm(&mut self, remaining: Duration, period: Duration) {
        let now = Instant::now();
        self.timer = Some(Box::pin(tokio::time::sleep_until(now + remaining)));

        let mut tick = tokio::time::interval_at(now + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.tick = Some(tick);
    }

    /// Cancel both watchdogs. Idempotent.
    pub(crate) fn disarm(&mut self) {
        self.timer = None;
        self.tick = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some() || self.tick.is_some()
    }

    /// Wait for the next watchdog event. Pending forever while disarmed.
    ///
    /// The timer is one-shot: once it has fired only the tick remains.
    pub(crate) async fn fired(&mut self) -> Fired {
        let fired = {
            let Self { timer, tick } = &mut *self;
            let timer_fut = async {
                match timer.as_mut() {
                    Some(sleep) => sleep.as_mut().await,
                    None => pending().await,
                }
            };
            let tick_fut = async {
                match tick.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                () = timer_fut => Fired::Timer,
                () = tick_fut => Fired::Tick,
            }
        };

        if fired == Fired::Timer {
            self.timer = None;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap_or_default()
    }

    #[test]
    fn remaining_is_expiry_minus_age() {
        let expiry = Duration::from_secs(60);
        assert_eq!(remaining(expiry, at(0), at(0)), Duration::from_secs(60));
        assert_eq!(remaining(expiry, at(0), at(10)), Duration::from_secs(50));
        assert_eq!(
            remaining(expiry, at(0), at(0) + TimeDelta::milliseconds(59_999)),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn expired_alerts_have_nothing_left() {
        let expiry = Duration::from_secs(60);
        assert_eq!(remaining(expiry, at(0), at(60)), Duration::ZERO);
        assert_eq!(remaining(expiry, at(0), at(3600)), Duration::ZERO);
    }

    #[test]
    fn future_creation_is_capped_at_expiry() {
        let expiry = Duration::from_secs(60);
        assert_eq!(remaining(expiry, at(5), at(0)), expiry);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_before_timer() {
        let mut watchdog = Watchdog::default();
        watchdog.arm(Duration::from_secs(3), Duration::from_secs(1));

        let start = Instant::now();
        assert_eq!(watchdog.fired().await, Fired::Tick);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(watchdog.fired().await, Fired::Tick);
        assert_eq!(watchdog.fired().await, Fired::Timer);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_once() {
        let mut watchdog = Watchdog::default();
        watchdog.arm(Duration::from_millis(500), Duration::from_secs(1));

        assert_eq!(watchdog.fired().await, Fired::Timer);
        assert_eq!(watchdog.fired().await, Fired::Tick);
        assert!(watchdog.is_armed());

        watchdog.disarm();
        watchdog.disarm();
        assert!(!watchdog.is_armed());
    }
}
