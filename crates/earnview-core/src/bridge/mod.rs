//! Embedded player bridge
//!
//! Hosts a third-party player behind an [`EmbedSurface`] and exposes it as a
//! small closed event vocabulary:
//! - Inbound JSON messages are parsed, translated, and de-duplicated
//! - Play/pause intents issued before readiness are held and flushed later
//! - Position polling overrides optimistic `playing` reports with a
//!   synthetic `videoBuffering`
//!
//! Raw embed failures stop here; the controller only ever sees
//! [`BridgeEvent`]s.

mod protocol;
mod stall;

pub use protocol::{from_native_state, translate, BridgeEvent, InboundMessage, OutboundMessage};
pub use stall::{StallDetector, StallVerdict};

use crate::{config::ControllerConfig, Error, PlayerState, Result, VideoDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Platform side of the bridge: a sandboxed surface running the embed
#[async_trait]
pub trait EmbedSurface: Send + Sync {
    /// Create the surface and start loading the embed for `embed_id`
    async fn mount(&self, video: &VideoDescriptor, embed_id: &str) -> Result<()>;

    /// Post a command into the embed's script context
    async fn post(&self, message: &OutboundMessage) -> Result<()>;

    /// Current playback position in seconds, if the embed reports one
    async fn current_time(&self) -> Result<Option<f64>>;

    /// Destroy the surface
    async fn unmount(&self) -> Result<()>;
}

/// Outcome of [`EmbedBridge::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDisposition {
    Sent,
    /// Held until the embed signals readiness
    Deferred,
    /// Not delivered (bridge closed, not ready, or surface failure)
    Dropped,
}

/// Per-session bridge state
pub struct EmbedBridge {
    surface: Arc<dyn EmbedSurface>,
    unavailable_codes: Vec<i64>,
    state: PlayerState,
    ready: bool,
    loaded: bool,
    /// No commands are delivered once closed
    closed: bool,
    pending_intent: Option<OutboundMessage>,
    stall: StallDetector,
    synthetic_stall: bool,
}

impl EmbedBridge {
    pub fn new(surface: Arc<dyn EmbedSurface>, config: &ControllerConfig) -> Self {
        Self {
            surface,
            unavailable_codes: config.unavailable_error_codes.clone(),
            state: PlayerState::Unstarted,
            ready: false,
            loaded: false,
            closed: false,
            pending_intent: None,
            stall: StallDetector::new(config.stall_epsilon_secs),
            synthetic_stall: false,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True while the current `Buffering` state came from the stall detector
    pub fn is_synthetic_stall(&self) -> bool {
        self.synthetic_stall
    }

    pub fn pending_intent(&self) -> Option<OutboundMessage> {
        self.pending_intent
    }

    /// Resolve the source and mount the surface
    pub async fn mount(&mut self, video: &VideoDescriptor) -> Result<()> {
        let embed_id = video.embed_id().ok_or_else(|| {
            Error::UnresolvableSource(
                video
                    .source_url
                    .clone()
                    .or_else(|| video.source_id.clone())
                    .unwrap_or_else(|| format!("video {} has no source", video.id)),
            )
        })?;

        self.surface.mount(video, &embed_id).await?;
        self.state = PlayerState::Loading;
        debug!(video_id = %video.id, embed_id = %embed_id, "Embed mounted");
        Ok(())
    }

    /// Deliver a command, or hold a play/pause intent until readiness
    pub async fn send(&mut self, message: OutboundMessage) -> CommandDisposition {
        if self.closed {
            trace!(?message, "Bridge closed, command dropped");
            return CommandDisposition::Dropped;
        }

        if !self.ready {
            if message.is_intent() {
                debug!(?message, "Bridge not ready, deferring intent");
                self.pending_intent = Some(message);
                return CommandDisposition::Deferred;
            }
            return CommandDisposition::Dropped;
        }

        match self.surface.post(&message).await {
            Ok(()) => {
                trace!(?message, "Command posted");
                CommandDisposition::Sent
            }
            Err(e) => {
                warn!(?message, error = %e, "Failed to post command to embed");
                CommandDisposition::Dropped
            }
        }
    }

    /// Resend the intent held while the embed was bootstrapping
    pub async fn flush_pending(&mut self) -> Option<CommandDisposition> {
        let intent = self.pending_intent.take()?;
        Some(self.send(intent).await)
    }

    /// Parse and apply a raw message from the embed
    pub fn handle_message(&mut self, raw: &str) -> Option<BridgeEvent> {
        match InboundMessage::parse(raw) {
            Ok(message) => self.handle_inbound(message),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed embed message");
                None
            }
        }
    }

    pub fn handle_inbound(&mut self, message: InboundMessage) -> Option<BridgeEvent> {
        if message == InboundMessage::Unknown {
            debug!("Ignoring unknown embed message type");
            return None;
        }
        let codes = &self.unavailable_codes;
        let event = translate(message, |code| codes.contains(&code))?;
        self.apply(event)
    }

    /// Apply an event to the bridge state; returns it unless it is a
    /// duplicate or arrived after the bridge closed
    pub fn apply(&mut self, event: BridgeEvent) -> Option<BridgeEvent> {
        if self.closed {
            debug!(?event, "Bridge closed, event ignored");
            return None;
        }

        let next = match event {
            BridgeEvent::BridgeReady => {
                if self.ready {
                    return None;
                }
                self.ready = true;
                return Some(event);
            }
            BridgeEvent::VideoLoaded => {
                if self.loaded {
                    return None;
                }
                self.loaded = true;
                return Some(event);
            }
            BridgeEvent::VideoPlaying if self.synthetic_stall => {
                // Position polling is authoritative until the playhead moves
                trace!("Optimistic playing report during stall suppressed");
                return None;
            }
            BridgeEvent::VideoPlaying => PlayerState::Playing,
            BridgeEvent::VideoPaused => PlayerState::Paused,
            BridgeEvent::VideoBuffering => PlayerState::Buffering,
            BridgeEvent::VideoCued => PlayerState::Cued,
            BridgeEvent::VideoEnded => PlayerState::Ended,
            BridgeEvent::VideoUnavailable { .. } => PlayerState::Unavailable,
            BridgeEvent::VideoError { .. } => PlayerState::Error,
        };

        let is_error = matches!(event, BridgeEvent::VideoError { .. });
        if next == self.state && !is_error {
            trace!(state = %next, "Duplicate embed state suppressed");
            return None;
        }

        if matches!(
            next,
            PlayerState::Playing
                | PlayerState::Paused
                | PlayerState::Buffering
                | PlayerState::Cued
                | PlayerState::Ended
        ) {
            self.loaded = true;
        }
        self.synthetic_stall = false;
        self.stall.reset();

        debug!(from = %self.state, to = %next, "Embed state change");
        self.state = next;
        if next.is_terminal() {
            self.close_channel();
        }
        Some(event)
    }

    /// Sample the playback position and synthesize buffering/playing
    /// transitions when the playhead stops or starts moving
    pub async fn poll_stall(&mut self) -> Option<BridgeEvent> {
        if self.closed {
            return None;
        }

        let watching = self.state == PlayerState::Playing
            || (self.state == PlayerState::Buffering && self.synthetic_stall);
        if !watching {
            self.stall.reset();
            return None;
        }

        let position = match self.surface.current_time().await {
            Ok(Some(position)) => position,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "Position poll failed");
                return None;
            }
        };

        match self.stall.observe(position) {
            StallVerdict::Stalled if self.state == PlayerState::Playing => {
                warn!(position, "Playhead stalled while reported playing");
                self.state = PlayerState::Buffering;
                self.synthetic_stall = true;
                Some(BridgeEvent::VideoBuffering)
            }
            StallVerdict::Resumed if self.synthetic_stall => {
                debug!(position, "Playhead moving again");
                self.state = PlayerState::Playing;
                self.synthetic_stall = false;
                Some(BridgeEvent::VideoPlaying)
            }
            _ => None,
        }
    }

    /// Force the unavailable state (load watchdog) and stop all commands
    pub fn mark_unavailable(&mut self) {
        self.state = PlayerState::Unavailable;
        self.close_channel();
    }

    /// Close the channel and destroy the surface
    pub async fn shutdown(&mut self) {
        self.close_channel();
        if let Err(e) = self.surface.unmount().await {
            warn!(error = %e, "Failed to unmount embed surface");
        }
    }

    fn close_channel(&mut self) {
        self.closed = true;
        self.pending_intent = None;
        self.synthetic_stall = false;
        self.stall.reset();
    }
}
