//! Reward submission guard
//!
//! The claimed flag flips synchronously, before the remote call is issued,
//! so a second trigger arriving while the first call is in flight is
//! rejected deterministically. The flag never flips back: a rejected claim
//! leaves the session resolved, and a connectivity failure keeps the original
//! request for resubmission instead of opening a second claim.

use crate::backend::{ClaimRequest, ClaimResponse};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What triggered a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimTrigger {
    /// Timer completion, natural end, or failure skip driven by the
    /// auto-skip preference
    AutoSkip,
    /// User pressed skip after reaching the target
    ManualSkip,
    /// User pressed earn; stay on the current video
    Earn,
}

impl ClaimTrigger {
    /// Advance the queue after a successful claim
    pub fn auto_advance(&self) -> bool {
        matches!(self, ClaimTrigger::AutoSkip | ClaimTrigger::ManualSkip)
    }

    /// Value of the remote `is_auto_skip` flag
    pub fn is_auto_skip(&self) -> bool {
        matches!(self, ClaimTrigger::AutoSkip)
    }
}

/// Claim progress for one session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimState {
    #[default]
    Unclaimed,
    Processing,
    Earned,
    Rejected { message: String },
    /// Held back by a connectivity failure; request kept for resubmission
    Offline,
}

/// Classified result of a remote claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResolution {
    Earned { video_completed: bool },
    Offline { message: String },
    Rejected { message: String },
}

/// What the caller of a claim gets back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed {
        watched_seconds: u32,
        video_completed: bool,
    },
    /// Session already resolved; no remote call made
    AlreadyClaimed,
    /// Connectivity failure; offline indicator raised
    Offline,
    Rejected { message: String },
    /// Session was replaced while the call was in flight
    Stale,
}

/// Sort a remote result into success, network-class or application-class
pub fn classify(result: Result<ClaimResponse>) -> ClaimResolution {
    match result {
        Ok(response) if response.success => ClaimResolution::Earned {
            video_completed: response.video_completed,
        },
        Ok(response) => ClaimResolution::Rejected {
            message: response
                .error
                .unwrap_or_else(|| "Reward claim was not accepted".to_string()),
        },
        Err(e) if e.is_network() => ClaimResolution::Offline {
            message: e.to_string(),
        },
        Err(e) => ClaimResolution::Rejected {
            message: match e {
                Error::Rejected { message, .. } => message,
                other => other.to_string(),
            },
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewardGuard {
    claimed: bool,
    state: ClaimState,
    request: Option<ClaimRequest>,
}

impl RewardGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn state(&self) -> &ClaimState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == ClaimState::Processing
    }

    /// Flip the claimed flag. Returns the request to submit, or `None` if
    /// this session already claimed.
    pub fn try_begin(&mut self, request: ClaimRequest) -> Option<ClaimRequest> {
        if self.claimed {
            debug!(video_id = %request.video_id, "Duplicate claim trigger ignored");
            return None;
        }
        self.claimed = true;
        self.state = ClaimState::Processing;
        self.request = Some(request.clone());
        Some(request)
    }

    /// The original request, if the last attempt failed on connectivity
    pub fn take_retry(&mut self) -> Option<ClaimRequest> {
        if self.state != ClaimState::Offline {
            return None;
        }
        let request = self.request.clone()?;
        self.state = ClaimState::Processing;
        Some(request)
    }

    pub fn has_offline_claim(&self) -> bool {
        self.state == ClaimState::Offline
    }

    /// Record the classified remote result
    pub fn settle(&mut self, resolution: &ClaimResolution) {
        self.state = match resolution {
            ClaimResolution::Earned { .. } => ClaimState::Earned,
            ClaimResolution::Offline { message } => {
                warn!(error = %message, "Reward claim deferred, device offline");
                ClaimState::Offline
            }
            ClaimResolution::Rejected { message } => {
                warn!(error = %message, "Reward claim rejected");
                ClaimState::Rejected {
                    message: message.clone(),
                }
            }
        };
    }
}
