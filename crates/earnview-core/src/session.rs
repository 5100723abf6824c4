//! Playback session - one viewing of one video
//!
//! Owns the bridge, timer, and reward guard for a single queue entry plus
//! the handles of the background tasks driving them. A session is never
//! reused: moving to another video (or retrying the same one) builds a new
//! session with a new id, and teardown aborts every task the old one owned.

use crate::{
    bridge::{EmbedBridge, EmbedSurface},
    config::ControllerConfig,
    guard::{ClaimState, ClaimTrigger, RewardGuard},
    timer::{Gates, WatchTimer},
    EarnButtonState, PlaybackFailure, PlayerState, SessionId, VideoDescriptor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct SessionTasks {
    ticker: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl SessionTasks {
    fn abort_all(&mut self) {
        for handle in [self.ticker.take(), self.poller.take(), self.watchdog.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

/// Playback session for a single queue entry
pub struct PlaybackSession {
    /// Session identifier; stale tasks compare against it
    pub(crate) id: SessionId,
    /// Queue entry being watched
    pub(crate) video: VideoDescriptor,
    /// Message channel to the embedded player
    pub(crate) bridge: EmbedBridge,
    /// Gated watch timer
    pub(crate) timer: WatchTimer,
    /// At-most-once claim state
    pub(crate) guard: RewardGuard,
    /// Timer held by a buffering or error report
    pub(crate) held: bool,
    /// Why playback failed, if it did
    pub(crate) failure: Option<PlaybackFailure>,
    /// Trigger of the outstanding or last claim
    pub(crate) claim_trigger: Option<ClaimTrigger>,
    /// Start of the current buffering spell
    pub(crate) buffering_since: Option<Instant>,
    /// Soft stall warning already raised for this spell
    pub(crate) stall_warned: bool,
    /// Session creation time
    started_at: Instant,
    /// Ticker, poller and watchdog handles
    tasks: SessionTasks,
}

impl PlaybackSession {
    /// Create a session for `video` behind a fresh bridge
    pub fn new(video: VideoDescriptor, surface: Arc<dyn EmbedSurface>, config: &ControllerConfig) -> Self {
        let timer = WatchTimer::new(video.target_duration_seconds);
        Self {
            id: SessionId::new(),
            bridge: EmbedBridge::new(surface, config),
            timer,
            guard: RewardGuard::new(),
            held: false,
            failure: None,
            claim_trigger: None,
            buffering_since: None,
            stall_warned: false,
            started_at: Instant::now(),
            tasks: SessionTasks::default(),
            video,
        }
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the video being watched
    pub fn video(&self) -> &VideoDescriptor {
        &self.video
    }

    /// Get the last player state reported by the bridge
    pub fn player_state(&self) -> PlayerState {
        self.bridge.state()
    }

    /// Get accumulated watch time in seconds
    pub fn watched_seconds(&self) -> u32 {
        self.timer.accumulated()
    }

    /// Check if the claim transition has happened
    pub fn reward_claimed(&self) -> bool {
        self.guard.is_claimed()
    }

    /// Get the recorded playback failure, if any
    pub fn failure(&self) -> Option<&PlaybackFailure> {
        self.failure.as_ref()
    }

    /// Get time since the session was created
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// True once the session can no longer play its content
    pub fn is_failed_terminally(&self) -> bool {
        self.failure.as_ref().is_some_and(PlaybackFailure::is_terminal)
    }

    pub(crate) fn gates(&self, screen_focused: bool, app_foreground: bool) -> Gates {
        Gates {
            playing: self.bridge.state() == PlayerState::Playing,
            screen_focused,
            app_foreground,
            held: self.held,
            claim_pending: self.guard.is_pending(),
        }
    }

    /// Button state derived from claim progress first, then playback
    pub fn button_state(&self) -> EarnButtonState {
        match self.guard.state() {
            ClaimState::Processing => EarnButtonState::Processing,
            ClaimState::Earned => EarnButtonState::Earned,
            ClaimState::Rejected { .. } => EarnButtonState::Error,
            ClaimState::Offline => EarnButtonState::Offline,
            ClaimState::Unclaimed => match &self.failure {
                Some(failure) if failure.is_terminal() => EarnButtonState::Unavailable,
                Some(_) => EarnButtonState::Error,
                None if self.timer.target_reached() => EarnButtonState::ReadyToEarn,
                None => EarnButtonState::Watching {
                    remaining_seconds: self.timer.remaining(),
                },
            },
        }
    }

    /// Soft warning shown once buffering has lasted past `threshold`.
    /// Returns true the first time the threshold is crossed.
    pub(crate) fn check_stall_warning(&mut self, threshold: Duration) -> bool {
        if self.stall_warned || self.bridge.state() != PlayerState::Buffering {
            return false;
        }
        match self.buffering_since {
            Some(since) if since.elapsed() >= threshold => {
                self.stall_warned = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_stall_warning(&self) -> bool {
        self.stall_warned && self.bridge.state() == PlayerState::Buffering
    }

    pub(crate) fn set_ticker(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks.ticker.replace(handle) {
            old.abort();
        }
    }

    /// Forget the ticker handle without aborting; used by the tick loop
    /// when it exits on its own
    pub(crate) fn release_ticker(&mut self) {
        self.tasks.ticker = None;
    }

    /// Stop counting immediately
    pub(crate) fn stop_ticker(&mut self) {
        self.timer.stop();
        if let Some(handle) = self.tasks.ticker.take() {
            handle.abort();
        }
    }

    pub(crate) fn set_poller(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks.poller.replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn set_watchdog(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks.watchdog.replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn cancel_watchdog(&mut self) {
        if let Some(handle) = self.tasks.watchdog.take() {
            handle.abort();
        }
    }

    pub(crate) fn release_watchdog(&mut self) {
        self.tasks.watchdog = None;
    }

    /// Abort every task, close the bridge and destroy the surface
    pub(crate) async fn teardown(&mut self) {
        self.timer.stop();
        self.tasks.abort_all();
        self.bridge.shutdown().await;
        debug!(
            session_id = %self.id,
            video_id = %self.video.id,
            watched = self.timer.accumulated(),
            "Playback session torn down"
        );
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}
