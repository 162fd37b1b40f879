//! Terminal audio output.
//!
//! Rings the terminal bell at the start of each clip and reports the clip
//! finished after a fixed length. Each channel holds at most one clip; a
//! new play or a stop cancels the pending completion.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use redcode_core::{AudioChannel, AudioOutput, CompletionHandle, PlaybackError};

pub struct TerminalBell {
    clip_length: Duration,
    ring: bool,
    blocked: AtomicBool,
    playing: Mutex<HashMap<AudioChannel, CancellationToken>>,
}

impl TerminalBell {
    /// `muted` starts the output blocked, the way a browser refuses
    /// autoplay, until [`allow`](AudioOutput::allow) is called.
    pub fn new(clip_length: Duration, muted: bool) -> Self {
        Self {
            clip_length,
            ring: true,
            blocked: AtomicBool::new(muted),
            playing: Mutex::new(HashMap::new()),
        }
    }

    /// Keep timing but never write the bell character.
    pub fn silent(mut self) -> Self {
        self.ring = false;
        self
    }

    fn playing(&self) -> MutexGuard<'_, HashMap<AudioChannel, CancellationToken>> {
        self.playing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for TerminalBell {
    fn play(
        &self,
        channel: AudioChannel,
        locator: &str,
        done: CompletionHandle,
    ) -> Result<(), PlaybackError> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(PlaybackError::Blocked);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::Failed(e.to_string()))?;

        let token = CancellationToken::new();
        if let Some(previous) = self.playing().insert(channel, token.clone()) {
            previous.cancel();
        }

        if self.ring {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
        debug!(%channel, locator, "clip started");

        let length = self.clip_length;
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(length) => done.finish(),
            }
        });
        Ok(())
    }

    fn stop(&self, channel: AudioChannel) {
        if let Some(token) = self.playing().remove(&channel) {
            token.cancel();
        }
    }

    fn allow(&self) {
        self.blocked.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use redcode_core::{AudioChain, AudioEvent, ChainState};
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clip_completes_after_its_length() {
        let bell = TerminalBell::new(Duration::from_secs(2), false).silent();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut chain = AudioChain::new(tx);
        chain.start(&bell, "fire.mp3", None).unwrap();

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(rx.try_recv().is_err());

        let AudioEvent::Finished { token } = rx.recv().await.unwrap();
        chain.on_finished(&bell, token).unwrap();
        assert_eq!(chain.state(), ChainState::PlayingPrimary);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_completion() {
        let bell = TerminalBell::new(Duration::from_secs(1), false).silent();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut chain = AudioChain::new(tx);
        chain.start(&bell, "blue.mp3", Some("ward.mp3")).unwrap();
        chain.stop(&bell);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn muted_until_allowed() {
        let bell = TerminalBell::new(Duration::from_secs(1), true).silent();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut chain = AudioChain::new(tx);
        assert_eq!(
            chain.start(&bell, "fire.mp3", None),
            Err(PlaybackError::Blocked)
        );

        bell.allow();
        chain.start(&bell, "fire.mp3", None).unwrap();
        assert_eq!(chain.state(), ChainState::PlayingPrimary);
    }
}
