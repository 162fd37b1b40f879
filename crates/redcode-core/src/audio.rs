// ── Audio sequencing ──
//
// The alert sound is a chain: primary clip to completion, then the
// station's receiver clip (if any) to completion, then primary again,
// until the chain is stopped. Completion is reported asynchronously by
// the output through a `CompletionHandle`; every play carries a token so
// completions from a stopped or restarted chain are ignored.

use thiserror::Error;
use tokio::sync::mpsc;

/// Which of the two playback channels a clip runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AudioChannel {
    /// Category clip.
    Primary,
    /// Station-specific clip.
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The platform refuses to start audio without a user gesture.
    #[error("playback blocked until audio is enabled")]
    Blocked,
    #[error("playback failed: {0}")]
    Failed(String),
}

/// Completion notice from an [`AudioOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    Finished { token: u64 },
}

/// Handed to the output with each clip; call [`finish`](Self::finish) when
/// the clip has played to the end. Dropping it without finishing means the
/// clip never completes (e.g. it was stopped).
#[derive(Debug)]
pub struct CompletionHandle {
    token: u64,
    tx: mpsc::UnboundedSender<AudioEvent>,
}

impl CompletionHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn finish(self) {
        let _ = self.tx.send(AudioEvent::Finished { token: self.token });
    }
}

/// A sound device with two independent channels.
pub trait AudioOutput: Send + Sync {
    /// Start `locator` on `channel` from the beginning.
    fn play(
        &self,
        channel: AudioChannel,
        locator: &str,
        done: CompletionHandle,
    ) -> Result<(), PlaybackError>;

    /// Stop `channel` and rewind it. Stopping an idle channel is a no-op.
    fn stop(&self, channel: AudioChannel);

    /// Record an explicit user permission to play audio.
    fn allow(&self) {}
}

// ── Chain state machine ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ChainState {
    #[default]
    Idle,
    PlayingPrimary,
    PlayingSecondary,
}

/// Primary → receiver → primary sequencing over an [`AudioOutput`].
#[derive(Debug)]
pub struct AudioChain {
    state: ChainState,
    primary: String,
    secondary: Option<String>,
    token: u64,
    events: mpsc::UnboundedSender<AudioEvent>,
}

impl AudioChain {
    pub fn new(events: mpsc::UnboundedSender<AudioEvent>) -> Self {
        Self {
            state: ChainState::Idle,
            primary: String::new(),
            secondary: None,
            token: 0,
            events,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// (Re)start the chain from the primary clip.
    pub fn start(
        &mut self,
        out: &dyn AudioOutput,
        primary: &str,
        secondary: Option<&str>,
    ) -> Result<(), PlaybackError> {
        self.stop(out);
        primary.clone_into(&mut self.primary);
        self.secondary = secondary.map(str::to_owned);
        self.play(out, AudioChannel::Primary)
    }

    /// Advance after a clip finished. Stale tokens are ignored.
    pub fn on_finished(
        &mut self,
        out: &dyn AudioOutput,
        token: u64,
    ) -> Result<(), PlaybackError> {
        if token != self.token {
            tracing::trace!(token, current = self.token, "ignoring stale audio completion");
            return Ok(());
        }

        match self.state {
            ChainState::Idle => Ok(()),
            ChainState::PlayingPrimary if self.secondary.is_some() => {
                self.play(out, AudioChannel::Receiver)
            }
            ChainState::PlayingPrimary | ChainState::PlayingSecondary => {
                self.play(out, AudioChannel::Primary)
            }
        }
    }

    /// Stop and rewind both channels. Idempotent.
    pub fn stop(&mut self, out: &dyn AudioOutput) {
        // Invalidate any completion still in flight.
        self.token = self.token.wrapping_add(1);
        if self.state != ChainState::Idle {
            out.stop(AudioChannel::Primary);
            out.stop(AudioChannel::Receiver);
        }
        self.state = ChainState::Idle;
    }

    fn play(&mut self, out: &dyn AudioOutput, channel: AudioChannel) -> Result<(), PlaybackError> {
        self.token = self.token.wrapping_add(1);
        let locator = match channel {
            AudioChannel::Primary => self.primary.as_str(),
            AudioChannel::Receiver => self.secondary.as_deref().unwrap_or(self.primary.as_str()),
        };
        let handle = CompletionHandle {
            token: self.token,
            tx: self.events.clone(),
        };

        match out.play(channel, locator, handle) {
            Ok(()) => {
                self.state = match channel {
                    AudioChannel::Primary => ChainState::PlayingPrimary,
                    AudioChannel::Receiver => ChainState::PlayingSecondary,
                };
                Ok(())
            }
            Err(e) => {
                tracing::debug!(%channel, error = %e, "clip did not start");
                self.state = ChainState::Idle;
                Err(e)
            }
        }
    }
}
