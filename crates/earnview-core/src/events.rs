//! Controller event stream
//!
//! Discrete notifications for the UI layer (toasts, indicators) and for
//! logging. State snapshots go through the status channel instead; events
//! describe what happened.

use crate::{guard::ClaimTrigger, PlaybackFailure, PlayerState, SessionId, VideoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Controller event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// New playback session built for a video
    SessionStarted {
        session_id: SessionId,
        video_id: VideoId,
        target_seconds: u32,
    },

    /// Session torn down
    SessionEnded {
        session_id: SessionId,
        watched_seconds: u32,
        reward_claimed: bool,
    },

    /// Player state change reported by the bridge
    PlayerStateChanged {
        session_id: SessionId,
        state: PlayerState,
    },

    /// Watch target reached
    TargetReached {
        session_id: SessionId,
        watched_seconds: u32,
    },

    /// Claim submitted to the backend
    ClaimSubmitted {
        session_id: SessionId,
        video_id: VideoId,
        watched_seconds: u32,
        trigger: ClaimTrigger,
    },

    /// Reward recorded
    RewardEarned {
        video_id: VideoId,
        watched_seconds: u32,
        reward_amount: u64,
    },

    /// Claim failed on connectivity; offline indicator raised
    WentOffline { message: String },

    /// Connectivity came back
    BackOnline,

    /// Claim or playback error for a dismissible message
    Error { code: String, message: String },

    /// Playback failed for the current session
    PlaybackFailed {
        session_id: SessionId,
        failure: PlaybackFailure,
    },

    /// Buffering lasted long enough to warn the user
    StallWarning { session_id: SessionId },

    /// Cursor moved to another video
    QueueAdvanced {
        from: Option<VideoId>,
        to: Option<VideoId>,
        automatic: bool,
    },

    /// Background refill appended entries
    QueueRefilled { added: usize },

    /// Balance refreshed after a claim
    BalanceUpdated { coins: u64 },
}

/// Event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerEventRecord {
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    #[serde(flatten)]
    pub event: ControllerEvent,
}

/// Broadcasts events to any number of subscribers
pub struct EventBus {
    tx: broadcast::Sender<ControllerEventRecord>,
    sequence: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEventRecord> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ControllerEvent) {
        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        trace!(sequence, ?event, "Controller event");
        // No subscribers is fine
        let _ = self.tx.send(ControllerEventRecord {
            timestamp: Utc::now(),
            sequence,
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
