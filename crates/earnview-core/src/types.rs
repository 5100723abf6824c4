//! Core types for Earnview

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a queued video, opaque to the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of the signed-in user, issued by the backend auth provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Promotion status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Active,
    Promoted,
    Repromoted,
    Paused,
    OnHold,
    Completed,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl VideoStatus {
    /// Statuses that may be served to viewers
    pub fn is_active_like(&self) -> bool {
        matches!(
            self,
            VideoStatus::Active | VideoStatus::Promoted | VideoStatus::Repromoted
        )
    }
}

/// A promoted video as supplied by the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub id: VideoId,
    /// Share/watch URL of the video
    #[serde(default)]
    pub source_url: Option<String>,
    /// Embed id, when the backend already resolved it
    #[serde(default)]
    pub source_id: Option<String>,
    /// Watch time required to earn the reward
    #[serde(alias = "duration_seconds")]
    pub target_duration_seconds: u32,
    /// Coins paid out on a successful claim
    #[serde(alias = "coin_reward")]
    pub reward_amount: u64,
    #[serde(default)]
    pub status: VideoStatus,
    #[serde(default)]
    pub deleted: bool,
    /// Start of the administrative hold window, if one was applied
    #[serde(default)]
    pub hold_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
}

impl VideoDescriptor {
    /// Create a descriptor for an embed id
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_duration_seconds: u32,
        reward_amount: u64,
    ) -> Self {
        Self {
            id: VideoId(id.into()),
            source_url: None,
            source_id: Some(source_id.into()),
            target_duration_seconds,
            reward_amount,
            status: VideoStatus::Active,
            deleted: false,
            hold_started_at: None,
            title: None,
        }
    }

    /// Resolve the playable embed id from `source_id` or `source_url`
    pub fn embed_id(&self) -> Option<String> {
        if let Some(id) = self.source_id.as_deref().map(str::trim) {
            if is_embed_id(id) {
                return Some(id.to_string());
            }
        }
        self.source_url.as_deref().and_then(extract_embed_id)
    }

    /// True while the hold window that started at `hold_started_at` is open.
    /// A window end past the representable range counts as still open.
    pub fn in_hold_window(&self, now: DateTime<Utc>, hold_window: Duration) -> bool {
        self.hold_started_at
            .map(|started| {
                started
                    .checked_add_signed(hold_window)
                    .map_or(true, |end| end > now)
            })
            .unwrap_or(false)
    }

    /// Whether the queue should pass over this video
    pub fn is_skip_eligible(&self, now: DateTime<Utc>, hold_window: Duration) -> bool {
        self.deleted || !self.status.is_active_like() || self.in_hold_window(now, hold_window)
    }
}

fn is_embed_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract an embed id from a share URL or a bare id
pub fn extract_embed_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_embed_id(trimmed) {
        return Some(trimmed.to_string());
    }

    let url = Url::parse(trimmed).ok()?;
    let host = url.host_str()?;
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(host);

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("embed") | Some("shorts") | Some("live") | Some("v") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        }
        _ => None,
    };

    candidate.filter(|id| is_embed_id(id))
}

/// Player state machine states, as observed through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// Surface not mounted yet
    #[default]
    Unstarted,
    /// Surface mounted, embed bootstrapping
    Loading,
    /// Loaded and waiting for a play command
    Cued,
    /// Confirmed active playback
    Playing,
    /// Explicit pause
    Paused,
    /// Stalled, reported by the embed or synthesized by the stall detector
    Buffering,
    /// Reached the natural end
    Ended,
    /// Content cannot be played at all
    Unavailable,
    /// Playback error, possibly recoverable
    Error,
}

impl PlayerState {
    /// No further embed events are accepted once unavailable
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerState::Unavailable)
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Unstarted => write!(f, "unstarted"),
            PlayerState::Loading => write!(f, "loading"),
            PlayerState::Cued => write!(f, "cued"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Ended => write!(f, "ended"),
            PlayerState::Unavailable => write!(f, "unavailable"),
            PlayerState::Error => write!(f, "error"),
        }
    }
}

/// Platform lifecycle inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSignal {
    AppForeground,
    AppBackground,
    FocusGained,
    FocusLost,
    ConnectivityRestored,
}

/// Why a session cannot continue playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PlaybackFailure {
    /// Source missing or not resolvable to an embed id
    BadSource,
    /// Embed reported the content as unplayable
    Unavailable { code: Option<i64> },
    /// No load confirmation within the watchdog window
    LoadTimeout,
    /// Recoverable embed error
    PlaybackError { code: i64 },
}

impl PlaybackFailure {
    /// Terminal failures never retry the same content automatically
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PlaybackFailure::PlaybackError { .. })
    }
}

/// What the skip/earn button shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EarnButtonState {
    /// No session
    #[default]
    Idle,
    /// Counting toward the target
    Watching { remaining_seconds: u32 },
    /// Target reached, claim not yet submitted
    ReadyToEarn,
    /// Claim in flight
    Processing,
    /// Reward recorded
    Earned,
    /// Claim rejected or recoverable playback error
    Error,
    /// Content unavailable; retry or skip
    Unavailable,
    /// Claim held back by a connectivity failure
    Offline,
}

/// Snapshot of the controller published to the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub session_id: Option<SessionId>,
    pub video_id: Option<VideoId>,
    pub player_state: PlayerState,
    pub watched_seconds: u32,
    pub target_seconds: u32,
    pub reward_amount: u64,
    pub button: EarnButtonState,
    pub reward_claimed: bool,
    /// Persistent connectivity indicator
    pub offline: bool,
    /// Soft warning after a sustained stall
    pub stall_warning: bool,
    /// Dismissible error message
    pub error: Option<String>,
    pub failure: Option<PlaybackFailure>,
    pub balance: Option<u64>,
    pub queue_remaining: usize,
}
