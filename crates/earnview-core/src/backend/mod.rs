//! Remote procedure contract
//!
//! The coin ledger, queue ranking, and hold periods live server-side; the
//! client only sees these three calls.

mod rpc;

pub use rpc::RpcClient;

use crate::{Result, UserId, VideoDescriptor, VideoId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters of a reward claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub user_id: UserId,
    pub video_id: VideoId,
    pub watched_seconds: u32,
    /// Claim was triggered by the auto-skip preference rather than the user
    pub is_auto_skip: bool,
}

/// Reply of the claim procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub success: bool,
    #[serde(default, alias = "video_completed")]
    pub video_completed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ClaimResponse {
    pub fn accepted(video_completed: bool) -> Self {
        Self {
            success: true,
            video_completed,
            error: None,
        }
    }
}

/// Trait for the managed backend
#[async_trait]
pub trait RewardBackend: Send + Sync {
    /// Credit the reward for one resolved viewing. Idempotent per
    /// (user, video) viewing on the server.
    async fn claim_reward(&self, request: &ClaimRequest) -> Result<ClaimResponse>;

    /// Ordered list of videos eligible for this user
    async fn fetch_queue(&self, user_id: &UserId) -> Result<Vec<VideoDescriptor>>;

    /// Current coin balance
    async fn refresh_balance(&self, user_id: &UserId) -> Result<u64>;
}
