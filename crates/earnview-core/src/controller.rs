//! Playback controller - main orchestrator
//!
//! Coordinates:
//! - Queue cursor and background refill
//! - Session lifecycle (build, teardown, retry)
//! - Bridge events and host focus/foreground signals
//! - The tick loop, stall poller, and load watchdog
//! - Reward claims, balance refresh, and the offline indicator
//!
//! All mutable state sits behind one async mutex. Background tasks carry the
//! id of the session that spawned them and do nothing once that session has
//! been replaced, so work started for one video can never touch another.

use crate::{
    backend::{ClaimRequest, RewardBackend},
    bridge::{BridgeEvent, EmbedSurface, OutboundMessage},
    config::{ControllerConfig, UnavailablePolicy},
    events::{ControllerEvent, ControllerEventRecord, EventBus},
    guard::{self, ClaimOutcome, ClaimResolution, ClaimTrigger},
    queue::VideoQueue,
    session::PlaybackSession,
    timer::TickOutcome,
    ControllerStatus, Error, HostSignal, PlaybackFailure, PlayerState, Result, SessionId, UserId,
    VideoDescriptor,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

struct ControllerState {
    queue: VideoQueue,
    session: Option<PlaybackSession>,
    screen_focused: bool,
    app_foreground: bool,
    offline: bool,
    balance: Option<u64>,
    /// Dismissible error message
    error: Option<String>,
    /// Consecutive automatic skips without confirmed playback
    auto_skip_streak: u32,
    refill_in_flight: bool,
}

impl ControllerState {
    fn host_active(&self) -> bool {
        self.screen_focused && self.app_foreground
    }

    /// Session with the given id, if it is still the current one
    fn session_mut(&mut self, id: SessionId) -> Option<&mut PlaybackSession> {
        self.session.as_mut().filter(|session| session.id == id)
    }
}

/// Client-side playback-reward controller
///
/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct PlaybackController {
    user_id: UserId,
    config: Arc<ControllerConfig>,
    backend: Arc<dyn RewardBackend>,
    surface: Arc<dyn EmbedSurface>,
    state: Arc<Mutex<ControllerState>>,
    status_tx: Arc<watch::Sender<ControllerStatus>>,
    events: Arc<EventBus>,
}

impl PlaybackController {
    pub fn new(
        user_id: UserId,
        config: ControllerConfig,
        backend: Arc<dyn RewardBackend>,
        surface: Arc<dyn EmbedSurface>,
    ) -> Result<Self> {
        config.validate()?;
        let (status_tx, _) = watch::channel(ControllerStatus::default());
        let state = ControllerState {
            queue: VideoQueue::new(config.hold_window()),
            session: None,
            screen_focused: true,
            app_foreground: true,
            offline: false,
            balance: None,
            error: None,
            auto_skip_streak: 0,
            refill_in_flight: false,
        };

        info!(user_id = %user_id, auto_skip = config.auto_skip, "Playback controller created");

        Ok(Self {
            user_id,
            config: Arc::new(config),
            backend,
            surface,
            state: Arc::new(Mutex::new(state)),
            status_tx: Arc::new(status_tx),
            events: Arc::new(EventBus::default()),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Latest published snapshot
    pub fn status(&self) -> ControllerStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEventRecord> {
        self.events.subscribe()
    }

    /// Current queue contents
    pub async fn queue(&self) -> Vec<VideoDescriptor> {
        self.state.lock().await.queue.videos().to_vec()
    }

    // ---- Queue ----

    /// Fetch the queue from the backend and replace the local list
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn load_queue(&self) -> Result<usize> {
        let videos = match self.backend.fetch_queue(&self.user_id).await {
            Ok(videos) => videos,
            Err(e) => {
                warn!(error = %e, "Failed to load video queue");
                let mut guard = self.state.lock().await;
                if e.is_network() {
                    self.went_offline(&mut guard, e.to_string());
                }
                self.publish(&guard);
                return Err(e);
            }
        };
        let count = videos.len();
        self.back_online(&mut *self.state.lock().await);
        self.set_queue(videos).await;
        info!(count, "Video queue loaded");
        Ok(count)
    }

    /// Replace the queue wholesale. The running session survives only if
    /// the cursor still points at the same video.
    pub async fn set_queue(&self, videos: Vec<VideoDescriptor>) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.queue.replace(videos, Utc::now());

        let playing = state.session.as_ref().map(|session| session.video.id.clone());
        if playing.as_ref() != state.queue.current_id() {
            self.start_session_locked(state).await;
        }
        self.maybe_refill(state);
        self.publish(state);
    }

    // ---- Bridge and host input ----

    /// Feed a raw JSON message from the embed
    pub async fn handle_bridge_message(&self, raw: &str) -> Option<BridgeEvent> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let event = state.session.as_mut()?.bridge.handle_message(raw)?;
        self.apply_event_locked(state, event).await;
        Some(event)
    }

    /// Feed an already-decoded bridge event
    pub async fn handle_bridge_event(&self, event: BridgeEvent) -> Option<BridgeEvent> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let event = state.session.as_mut()?.bridge.apply(event)?;
        self.apply_event_locked(state, event).await;
        Some(event)
    }

    pub async fn handle_host_signal(&self, signal: HostSignal) {
        debug!(?signal, "Host signal");
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match signal {
            HostSignal::FocusGained => {
                state.screen_focused = true;
                self.host_became_active(state).await;
            }
            HostSignal::AppForeground => {
                state.app_foreground = true;
                self.host_became_active(state).await;
            }
            HostSignal::FocusLost => {
                state.screen_focused = false;
                self.host_became_inactive(state).await;
            }
            HostSignal::AppBackground => {
                state.app_foreground = false;
                self.host_became_inactive(state).await;
            }
            HostSignal::ConnectivityRestored => {
                self.back_online(state);
                if let Some(session) = state.session.as_ref() {
                    if session.guard.has_offline_claim() {
                        info!(session_id = %session.id, "Connectivity restored, resubmitting claim");
                        self.spawn_retry_claim(session.id);
                    }
                }
            }
        }
        self.publish(state);
    }

    async fn host_became_active(&self, state: &mut ControllerState) {
        if !state.host_active() {
            return;
        }
        if let Some(session) = state.session.as_mut() {
            session.bridge.send(OutboundMessage::PlayVideo).await;
        }
        self.resume_timer(state);
    }

    async fn host_became_inactive(&self, state: &mut ControllerState) {
        if let Some(session) = state.session.as_mut() {
            session.stop_ticker();
            session.bridge.send(OutboundMessage::PauseVideo).await;
        }
    }

    async fn apply_event_locked(&self, state: &mut ControllerState, event: BridgeEvent) {
        let host_active = state.host_active();
        let Some(session) = state.session.as_mut() else {
            return;
        };
        let session_id = session.id;
        let mut failure = None;
        let mut resume = false;

        match event {
            BridgeEvent::BridgeReady => {
                if let Some(disposition) = session.bridge.flush_pending().await {
                    debug!(?disposition, "Deferred intent flushed");
                }
            }
            BridgeEvent::VideoLoaded => session.cancel_watchdog(),
            BridgeEvent::VideoPlaying => {
                session.cancel_watchdog();
                session.held = false;
                session.buffering_since = None;
                session.stall_warned = false;
                if matches!(session.failure, Some(PlaybackFailure::PlaybackError { .. })) {
                    session.failure = None;
                }
                state.auto_skip_streak = 0;
                if !host_active {
                    // Embed autoplayed while the host is hidden
                    session.bridge.send(OutboundMessage::PauseVideo).await;
                }
                resume = true;
            }
            BridgeEvent::VideoPaused | BridgeEvent::VideoCued => {
                session.cancel_watchdog();
                session.buffering_since = None;
            }
            BridgeEvent::VideoBuffering => {
                session.held = true;
                session.buffering_since.get_or_insert_with(time::Instant::now);
            }
            BridgeEvent::VideoEnded => {
                session.buffering_since = None;
                if session.guard.is_claimed() {
                    trace!("Ended after claim");
                } else if session.timer.target_reached() {
                    if self.config.auto_skip {
                        self.spawn_claim(session_id, ClaimTrigger::AutoSkip);
                    }
                } else {
                    debug!(
                        watched = session.timer.accumulated(),
                        target = session.timer.target(),
                        "Video ended before target, replaying"
                    );
                    session.bridge.send(OutboundMessage::PlayVideo).await;
                }
            }
            BridgeEvent::VideoUnavailable { code } => {
                session.stop_ticker();
                session.cancel_watchdog();
                failure = Some(PlaybackFailure::Unavailable { code });
            }
            BridgeEvent::VideoError { code } => {
                session.held = true;
                failure = Some(PlaybackFailure::PlaybackError { code });
                state.error = Some(format!("Playback error (code {code})"));
                self.events.emit(ControllerEvent::Error {
                    code: "PLAYBACK_ERROR".into(),
                    message: format!("Embed reported error code {code}"),
                });
            }
        }

        if let Some(player_state) = state_of(event) {
            self.events.emit(ControllerEvent::PlayerStateChanged {
                session_id,
                state: player_state,
            });
        }
        if let Some(failure) = failure {
            self.record_failure(state, session_id, failure);
        }
        if resume {
            self.resume_timer(state);
        }
        self.publish(state);
    }

    /// Store a playback failure and apply the skip policy
    fn record_failure(&self, state: &mut ControllerState, session_id: SessionId, failure: PlaybackFailure) {
        let Some(session) = state.session_mut(session_id) else {
            return;
        };
        warn!(session_id = %session_id, video_id = %session.video.id, ?failure, "Playback failed");
        session.failure = Some(failure.clone());
        self.events.emit(ControllerEvent::PlaybackFailed {
            session_id,
            failure: failure.clone(),
        });

        let wants_skip = if failure.is_terminal() {
            self.config.unavailable_policy == UnavailablePolicy::AutoSkip
        } else {
            self.config.auto_skip
        };
        if !wants_skip {
            return;
        }
        if state.auto_skip_streak >= self.config.max_consecutive_auto_skips {
            warn!(
                streak = state.auto_skip_streak,
                "Consecutive auto-skip limit reached, waiting for the user"
            );
            return;
        }
        state.auto_skip_streak += 1;
        self.spawn_failure_skip(session_id);
    }

    // ---- Timer ----

    /// Start the tick loop if every gate is open
    fn resume_timer(&self, state: &mut ControllerState) {
        let (screen_focused, app_foreground) = (state.screen_focused, state.app_foreground);
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.guard.is_claimed() || session.is_failed_terminally() {
            return;
        }
        let gates = session.gates(screen_focused, app_foreground);
        if session.timer.start(&gates) {
            debug!(session_id = %session.id, watched = session.timer.accumulated(), "Watch timer started");
            let handle = self.spawn_ticker(session.id);
            session.set_ticker(handle);
        }
    }

    fn spawn_ticker(&self, session_id: SessionId) -> JoinHandle<()> {
        let controller = self.clone();
        let period = self.config.tick_interval();
        tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !controller.on_tick(session_id).await {
                    break;
                }
            }
        })
    }

    /// One tick of the loop; returns false when the loop should exit
    async fn on_tick(&self, session_id: SessionId) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let (screen_focused, app_foreground) = (state.screen_focused, state.app_foreground);
        let Some(session) = state.session_mut(session_id) else {
            return false;
        };

        let gates = session.gates(screen_focused, app_foreground);
        match session.timer.tick(&gates) {
            TickOutcome::Idle => {
                session.release_ticker();
                false
            }
            TickOutcome::Gated => {
                trace!(?gates, "Tick gated");
                true
            }
            TickOutcome::Counted { accumulated } => {
                trace!(accumulated, "Tick counted");
                self.publish(state);
                true
            }
            TickOutcome::Completed { accumulated } => {
                session.release_ticker();
                info!(session_id = %session_id, accumulated, "Watch target reached");
                self.events.emit(ControllerEvent::TargetReached {
                    session_id,
                    watched_seconds: accumulated,
                });
                if self.config.auto_skip {
                    self.spawn_claim(session_id, ClaimTrigger::AutoSkip);
                }
                self.publish(state);
                false
            }
        }
    }

    // ---- Stall poller and load watchdog ----

    fn spawn_poller(&self, session_id: SessionId) -> JoinHandle<()> {
        let controller = self.clone();
        let period = self.config.stall_poll_interval();
        tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !controller.on_poll(session_id).await {
                    break;
                }
            }
        })
    }

    async fn on_poll(&self, session_id: SessionId) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.session_mut(session_id) else {
            return false;
        };
        if session.bridge.is_closed() {
            return false;
        }

        let synthesized = session.bridge.poll_stall().await;
        if let Some(event) = synthesized {
            self.apply_event_locked(state, event).await;
        }

        let Some(session) = state.session_mut(session_id) else {
            return false;
        };
        if session.check_stall_warning(self.config.stall_warning_after()) {
            warn!(session_id = %session_id, "Sustained stall");
            self.events.emit(ControllerEvent::StallWarning { session_id });
            self.publish(state);
        }
        true
    }

    fn spawn_watchdog(&self, session_id: SessionId) -> JoinHandle<()> {
        let controller = self.clone();
        let timeout = self.config.load_timeout();
        tokio::spawn(async move {
            time::sleep(timeout).await;
            controller.on_load_timeout(session_id).await;
        })
    }

    async fn on_load_timeout(&self, session_id: SessionId) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.session_mut(session_id) else {
            return;
        };
        session.release_watchdog();
        if session.bridge.is_loaded() || session.bridge.is_closed() {
            return;
        }

        warn!(
            session_id = %session_id,
            timeout_ms = self.config.load_timeout_ms,
            "Embed did not confirm load in time"
        );
        session.bridge.mark_unavailable();
        session.stop_ticker();
        self.events.emit(ControllerEvent::PlayerStateChanged {
            session_id,
            state: PlayerState::Unavailable,
        });
        self.record_failure(state, session_id, PlaybackFailure::LoadTimeout);
        self.publish(state);
    }

    // ---- Claims ----

    /// Claim the reward for the current session
    ///
    /// Fails with [`Error::TargetNotReached`] below the target. Concurrent
    /// triggers for one session produce exactly one remote call; the losers
    /// get [`ClaimOutcome::AlreadyClaimed`].
    pub async fn complete_and_claim(&self, trigger: ClaimTrigger) -> Result<ClaimOutcome> {
        self.claim_session(None, trigger).await
    }

    /// Earn button: claim and stay on the current video
    pub async fn earn(&self) -> Result<ClaimOutcome> {
        self.complete_and_claim(ClaimTrigger::Earn).await
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn claim_session(&self, expected: Option<SessionId>, trigger: ClaimTrigger) -> Result<ClaimOutcome> {
        let (session_id, request) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(session) = state.session.as_mut() else {
                return Err(Error::NoActiveSession);
            };
            if expected.is_some_and(|id| id != session.id) {
                debug!("Claim trigger for a replaced session ignored");
                return Ok(ClaimOutcome::Stale);
            }
            if session.guard.is_claimed() {
                debug!(session_id = %session.id, "Session already claimed");
                return Ok(ClaimOutcome::AlreadyClaimed);
            }
            if !session.timer.target_reached() {
                return Err(Error::TargetNotReached {
                    watched: session.timer.accumulated(),
                    target: session.timer.target(),
                });
            }

            let request = ClaimRequest {
                user_id: self.user_id.clone(),
                video_id: session.video.id.clone(),
                watched_seconds: session.timer.accumulated(),
                is_auto_skip: trigger.is_auto_skip(),
            };
            let Some(request) = session.guard.try_begin(request) else {
                return Ok(ClaimOutcome::AlreadyClaimed);
            };
            session.claim_trigger = Some(trigger);
            session.stop_ticker();
            session.bridge.send(OutboundMessage::TimerComplete).await;

            let session_id = session.id;
            info!(
                session_id = %session_id,
                video_id = %request.video_id,
                watched = request.watched_seconds,
                ?trigger,
                "Submitting reward claim"
            );
            self.events.emit(ControllerEvent::ClaimSubmitted {
                session_id,
                video_id: request.video_id.clone(),
                watched_seconds: request.watched_seconds,
                trigger,
            });
            self.publish(state);
            (session_id, request)
        };

        Ok(self.submit_claim(session_id, request, trigger).await)
    }

    /// Resubmit a claim held back by a connectivity failure
    pub async fn retry_claim(&self) -> Result<ClaimOutcome> {
        let (session_id, request, trigger) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(session) = state.session.as_mut() else {
                return Err(Error::NoActiveSession);
            };
            let Some(request) = session.guard.take_retry() else {
                if session.guard.is_claimed() && !session.guard.is_pending() {
                    return Ok(ClaimOutcome::AlreadyClaimed);
                }
                return Err(Error::NoPendingClaim);
            };
            let trigger = session.claim_trigger.unwrap_or(ClaimTrigger::Earn);
            info!(session_id = %session.id, video_id = %request.video_id, "Resubmitting reward claim");
            let session_id = session.id;
            self.publish(state);
            (session_id, request, trigger)
        };

        Ok(self.submit_claim(session_id, request, trigger).await)
    }

    async fn submit_claim(&self, session_id: SessionId, request: ClaimRequest, trigger: ClaimTrigger) -> ClaimOutcome {
        let resolution = guard::classify(self.backend.claim_reward(&request).await);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let current = match state.session_mut(session_id) {
            Some(session) => {
                session.guard.settle(&resolution);
                true
            }
            None => false,
        };

        match resolution {
            ClaimResolution::Earned { video_completed } => {
                self.back_online(state);
                let reward_amount = state
                    .queue
                    .videos()
                    .iter()
                    .find(|video| video.id == request.video_id)
                    .map(|video| video.reward_amount)
                    .unwrap_or(0);
                info!(
                    video_id = %request.video_id,
                    watched = request.watched_seconds,
                    reward_amount,
                    "Reward earned"
                );
                self.events.emit(ControllerEvent::RewardEarned {
                    video_id: request.video_id.clone(),
                    watched_seconds: request.watched_seconds,
                    reward_amount,
                });

                if current && trigger.auto_advance() {
                    self.advance_locked(state, trigger.is_auto_skip()).await;
                }
                self.publish(state);
                drop(guard);

                if let Err(e) = self.refresh_balance().await {
                    warn!(error = %e, "Balance refresh after claim failed");
                }

                if current {
                    ClaimOutcome::Claimed {
                        watched_seconds: request.watched_seconds,
                        video_completed,
                    }
                } else {
                    debug!("Claim settled after its session was replaced");
                    ClaimOutcome::Stale
                }
            }
            ClaimResolution::Offline { message } => {
                self.went_offline(state, message);
                self.publish(state);
                if current {
                    ClaimOutcome::Offline
                } else {
                    ClaimOutcome::Stale
                }
            }
            ClaimResolution::Rejected { message } => {
                self.events.emit(ControllerEvent::Error {
                    code: "CLAIM_REJECTED".into(),
                    message: message.clone(),
                });
                if !current {
                    self.publish(state);
                    return ClaimOutcome::Stale;
                }
                state.error = Some(message.clone());
                self.publish(state);
                ClaimOutcome::Rejected { message }
            }
        }
    }

    fn spawn_claim(&self, session_id: SessionId, trigger: ClaimTrigger) {
        let controller = self.clone();
        tokio::spawn(async move {
            match controller.claim_session(Some(session_id), trigger).await {
                Ok(outcome) => debug!(?outcome, "Automatic claim finished"),
                Err(e) => warn!(error = %e, "Automatic claim failed"),
            }
        });
    }

    fn spawn_retry_claim(&self, session_id: SessionId) {
        let controller = self.clone();
        tokio::spawn(async move {
            let still_current = {
                let guard = controller.state.lock().await;
                guard.session.as_ref().is_some_and(|s| s.id == session_id)
            };
            if !still_current {
                return;
            }
            match controller.retry_claim().await {
                Ok(outcome) => debug!(?outcome, "Deferred claim resubmitted"),
                Err(e) => debug!(error = %e, "Deferred claim not resubmitted"),
            }
        });
    }

    /// Refresh the coin balance from the backend
    pub async fn refresh_balance(&self) -> Result<u64> {
        let result = self.backend.refresh_balance(&self.user_id).await;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match result {
            Ok(coins) => {
                state.balance = Some(coins);
                self.back_online(state);
                self.events.emit(ControllerEvent::BalanceUpdated { coins });
                self.publish(state);
                Ok(coins)
            }
            Err(e) => {
                if e.is_network() {
                    self.went_offline(state, e.to_string());
                }
                self.publish(state);
                Err(e)
            }
        }
    }

    // ---- Navigation ----

    /// Skip the current video
    ///
    /// Below the target this just advances with no remote call. Once the
    /// target is reached and the reward is still unclaimed, the skip claims
    /// first and advances on success. Already-claimed sessions advance.
    pub async fn skip(&self) -> Result<Option<ClaimOutcome>> {
        self.skip_session(None, false).await
    }

    async fn skip_session(&self, expected: Option<SessionId>, automatic: bool) -> Result<Option<ClaimOutcome>> {
        let claim_for = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(session) = state.session.as_ref() else {
                return Err(Error::NoActiveSession);
            };
            if expected.is_some_and(|id| id != session.id) {
                return Ok(None);
            }
            if !session.guard.is_claimed() && session.timer.target_reached() {
                Some(session.id)
            } else {
                info!(
                    video_id = %session.video.id,
                    watched = session.timer.accumulated(),
                    automatic,
                    "Skipping video"
                );
                self.advance_locked(state, automatic).await;
                self.publish(state);
                None
            }
        };

        match claim_for {
            Some(session_id) => {
                let trigger = if automatic {
                    ClaimTrigger::AutoSkip
                } else {
                    ClaimTrigger::ManualSkip
                };
                self.claim_session(Some(session_id), trigger).await.map(Some)
            }
            None => Ok(None),
        }
    }

    fn spawn_failure_skip(&self, session_id: SessionId) {
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.skip_session(Some(session_id), true).await {
                debug!(error = %e, "Automatic skip not performed");
            }
        });
    }

    /// Rebuild the session for the current video
    pub async fn retry(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.queue.current().is_none() {
            return Err(Error::EmptyQueue);
        }
        info!("Retrying current video");
        state.auto_skip_streak = 0;
        self.start_session_locked(state).await;
        self.publish(state);
        Ok(())
    }

    pub async fn dismiss_error(&self) {
        let mut guard = self.state.lock().await;
        guard.error = None;
        self.publish(&guard);
    }

    /// Tear down the session and stop all background work
    pub async fn shutdown(&self) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        self.teardown_session_locked(state).await;
        self.publish(state);
        info!("Playback controller shut down");
    }

    async fn advance_locked(&self, state: &mut ControllerState, automatic: bool) {
        let from = state.queue.current_id().cloned();
        self.teardown_session_locked(state).await;
        let to = state.queue.advance(Utc::now()).map(|video| video.id.clone());
        debug!(?from, ?to, automatic, "Queue advanced");
        self.events.emit(ControllerEvent::QueueAdvanced { from, to, automatic });
        self.start_session_locked(state).await;
        self.maybe_refill(state);
    }

    // ---- Session lifecycle ----

    async fn start_session_locked(&self, state: &mut ControllerState) {
        self.teardown_session_locked(state).await;
        let Some(video) = state.queue.current().cloned() else {
            debug!("No eligible video to play");
            return;
        };

        let mut session = PlaybackSession::new(video, self.surface.clone(), &self.config);
        let session_id = session.id;
        state.error = None;
        info!(
            session_id = %session_id,
            video_id = %session.video.id,
            target = session.video.target_duration_seconds,
            "Playback session started"
        );
        self.events.emit(ControllerEvent::SessionStarted {
            session_id,
            video_id: session.video.id.clone(),
            target_seconds: session.video.target_duration_seconds,
        });

        let mount = session.bridge.mount(&session.video).await;
        let zero_target = session.timer.target_reached();
        state.session = Some(session);

        if let Err(e) = mount {
            warn!(error = %e, "Failed to mount embed");
            let failure = match e {
                Error::UnresolvableSource(_) => PlaybackFailure::BadSource,
                _ => PlaybackFailure::Unavailable { code: None },
            };
            if let Some(session) = state.session.as_mut() {
                session.bridge.mark_unavailable();
            }
            self.record_failure(state, session_id, failure);
            return;
        }

        let host_active = state.host_active();
        if let Some(session) = state.session.as_mut() {
            if host_active {
                session.bridge.send(OutboundMessage::PlayVideo).await;
            }
            session.set_watchdog(self.spawn_watchdog(session_id));
            session.set_poller(self.spawn_poller(session_id));
        }

        if zero_target {
            debug!(session_id = %session_id, "Zero-length target, claimable immediately");
            self.events.emit(ControllerEvent::TargetReached {
                session_id,
                watched_seconds: 0,
            });
            if self.config.auto_skip {
                self.spawn_claim(session_id, ClaimTrigger::AutoSkip);
            }
        }
    }

    async fn teardown_session_locked(&self, state: &mut ControllerState) {
        let Some(mut session) = state.session.take() else {
            return;
        };
        session.teardown().await;
        self.events.emit(ControllerEvent::SessionEnded {
            session_id: session.id,
            watched_seconds: session.timer.accumulated(),
            reward_claimed: session.guard.is_claimed(),
        });
    }

    // ---- Refill ----

    fn maybe_refill(&self, state: &mut ControllerState) {
        if state.refill_in_flight || state.queue.remaining(Utc::now()) > self.config.queue_low_water {
            return;
        }
        state.refill_in_flight = true;
        let controller = self.clone();
        tokio::spawn(async move { controller.refill().await });
    }

    async fn refill(&self) {
        let result = self.backend.fetch_queue(&self.user_id).await;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.refill_in_flight = false;

        match result {
            Ok(videos) => {
                let added = state.queue.extend(videos, Utc::now());
                if added > 0 {
                    info!(added, "Queue refilled");
                    self.events.emit(ControllerEvent::QueueRefilled { added });
                }
                if state.session.is_none() && state.queue.current().is_some() {
                    self.start_session_locked(state).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Queue refill failed");
                if e.is_network() {
                    self.went_offline(state, e.to_string());
                }
            }
        }
        self.publish(state);
    }

    // ---- Status ----

    fn went_offline(&self, state: &mut ControllerState, message: String) {
        if !state.offline {
            warn!(error = %message, "Backend unreachable, offline");
            state.offline = true;
            self.events.emit(ControllerEvent::WentOffline { message });
        }
    }

    fn back_online(&self, state: &mut ControllerState) {
        if state.offline {
            info!("Back online");
            state.offline = false;
            self.events.emit(ControllerEvent::BackOnline);
        }
    }

    fn publish(&self, state: &ControllerState) {
        let queue_remaining = state.queue.remaining(Utc::now());
        let status = match &state.session {
            Some(session) => ControllerStatus {
                session_id: Some(session.id),
                video_id: Some(session.video.id.clone()),
                player_state: session.bridge.state(),
                watched_seconds: session.timer.accumulated(),
                target_seconds: session.timer.target(),
                reward_amount: session.video.reward_amount,
                button: session.button_state(),
                reward_claimed: session.guard.is_claimed(),
                offline: state.offline,
                stall_warning: session.is_stall_warning(),
                error: state.error.clone(),
                failure: session.failure.clone(),
                balance: state.balance,
                queue_remaining,
            },
            None => ControllerStatus {
                offline: state.offline,
                error: state.error.clone(),
                balance: state.balance,
                queue_remaining,
                ..Default::default()
            },
        };
        self.status_tx.send_replace(status);
    }
}

/// Player state carried by a bridge event, if any
fn state_of(event: BridgeEvent) -> Option<PlayerState> {
    match event {
        BridgeEvent::BridgeReady | BridgeEvent::VideoLoaded => None,
        BridgeEvent::VideoPlaying => Some(PlayerState::Playing),
        BridgeEvent::VideoPaused => Some(PlayerState::Paused),
        BridgeEvent::VideoBuffering => Some(PlayerState::Buffering),
        BridgeEvent::VideoCued => Some(PlayerState::Cued),
        BridgeEvent::VideoEnded => Some(PlayerState::Ended),
        BridgeEvent::VideoUnavailable { .. } => Some(PlayerState::Unavailable),
        BridgeEvent::VideoError { .. } => Some(PlayerState::Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{InMemoryBackend, ScriptedSurface};
    use crate::{EarnButtonState, VideoId};
    use std::time::Duration;

    async fn controller(videos: Vec<VideoDescriptor>) -> (PlaybackController, Arc<InMemoryBackend>, Arc<ScriptedSurface>) {
        let backend = Arc::new(InMemoryBackend::new(videos));
        let surface = Arc::new(ScriptedSurface::new());
        let controller = PlaybackController::new(
            UserId::from("u1"),
            ControllerConfig::default(),
            backend.clone(),
            surface.clone(),
        )
        .unwrap();
        controller.load_queue().await.unwrap();
        (controller, backend, surface)
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_queue_starts_first_session() {
        let (controller, _backend, surface) =
            controller(vec![VideoDescriptor::new("v1", "dQw4w9WgXcQ", 30, 10)]).await;
        let status = controller.status();
        assert_eq!(status.video_id, Some(VideoId::from("v1")));
        assert_eq!(status.player_state, PlayerState::Loading);
        assert_eq!(status.button, EarnButtonState::Watching { remaining_seconds: 30 });
        assert_eq!(surface.mounted(), vec!["dQw4w9WgXcQ".to_string()]);
        // Intent held until the embed is ready
        assert!(surface.posted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_keeps_session_for_same_video() {
        let videos = vec![
            VideoDescriptor::new("v1", "dQw4w9WgXcQ", 30, 10),
            VideoDescriptor::new("v2", "9bZkp7q1VOE", 30, 10),
        ];
        let (controller, _backend, surface) = controller(videos).await;
        let before = controller.status().session_id;
        controller.load_queue().await.unwrap();
        assert_eq!(controller.status().session_id, before);
        assert_eq!(surface.mounted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_below_target_rejected_locally() {
        let (controller, backend, _surface) =
            controller(vec![VideoDescriptor::new("v1", "dQw4w9WgXcQ", 30, 10)]).await;
        let err = controller.earn().await.unwrap_err();
        assert!(matches!(err, Error::TargetNotReached { watched: 0, target: 30 }));
        assert!(backend.claims().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_has_no_session() {
        let (controller, _backend, _surface) = controller(Vec::new()).await;
        assert!(controller.status().session_id.is_none());
        assert!(matches!(controller.skip().await, Err(Error::NoActiveSession)));
        assert!(matches!(controller.retry().await, Err(Error::EmptyQueue)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_after_shutdown_ignored() {
        let (controller, _backend, surface) =
            controller(vec![VideoDescriptor::new("v1", "dQw4w9WgXcQ", 30, 10)]).await;
        controller.shutdown().await;
        assert_eq!(surface.unmounts(), 1);
        assert!(controller
            .handle_bridge_message(r#"{"type":"videoPlaying"}"#)
            .await
            .is_none());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(controller.status().watched_seconds, 0);
    }

    #[test]
    fn test_state_of_events() {
        assert_eq!(state_of(BridgeEvent::BridgeReady), None);
        assert_eq!(state_of(BridgeEvent::VideoEnded), Some(PlayerState::Ended));
        assert_eq!(
            state_of(BridgeEvent::VideoUnavailable { code: Some(150) }),
            Some(PlayerState::Unavailable)
        );
    }
}
