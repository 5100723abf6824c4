//! In-memory collaborators
//!
//! `InMemoryBackend` and `ScriptedSurface` stand in for the managed backend
//! and the platform embed surface. The CLI simulator and the test suites
//! drive the controller through them.

use crate::backend::{ClaimRequest, ClaimResponse, RewardBackend};
use crate::bridge::{EmbedSurface, OutboundMessage};
use crate::{Error, Result, UserId, VideoDescriptor, VideoId};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Failure to inject into the next claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    Network,
    Rejected(String),
}

#[derive(Debug, Default)]
struct BackendLog {
    queue: Vec<VideoDescriptor>,
    claims: Vec<ClaimRequest>,
    completed: HashSet<(UserId, VideoId)>,
    balance: u64,
    rewards: Vec<(VideoId, u64)>,
    claim_failures: VecDeque<InjectedFailure>,
    offline: bool,
    queue_fetches: usize,
    balance_fetches: usize,
}

/// Backend double with a coin ledger and failure injection
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    log: Mutex<BackendLog>,
    claim_delay: Mutex<Option<Duration>>,
}

impl InMemoryBackend {
    pub fn new(queue: Vec<VideoDescriptor>) -> Self {
        let backend = Self::default();
        backend.log().queue = queue;
        backend
    }

    fn log(&self) -> MutexGuard<'_, BackendLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold every claim for `delay` before answering
    pub fn set_claim_delay(&self, delay: Duration) {
        *self.claim_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    pub fn fail_next_claim(&self, failure: InjectedFailure) {
        self.log().claim_failures.push_back(failure);
    }

    /// Every call fails with a network error while offline
    pub fn set_offline(&self, offline: bool) {
        self.log().offline = offline;
    }

    pub fn set_queue(&self, queue: Vec<VideoDescriptor>) {
        self.log().queue = queue;
    }

    pub fn claims(&self) -> Vec<ClaimRequest> {
        self.log().claims.clone()
    }

    pub fn balance(&self) -> u64 {
        self.log().balance
    }

    /// Coins credited per accepted claim, in order
    pub fn rewards(&self) -> Vec<(VideoId, u64)> {
        self.log().rewards.clone()
    }

    pub fn queue_fetches(&self) -> usize {
        self.log().queue_fetches
    }

    pub fn balance_fetches(&self) -> usize {
        self.log().balance_fetches
    }

    fn check_online(&self) -> Result<()> {
        if self.log().offline {
            return Err(Error::Network("network request failed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RewardBackend for InMemoryBackend {
    async fn claim_reward(&self, request: &ClaimRequest) -> Result<ClaimResponse> {
        let delay = *self.claim_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut log = self.log();
        log.claims.push(request.clone());
        if log.offline {
            return Err(Error::Network("network request failed".into()));
        }
        match log.claim_failures.pop_front() {
            Some(InjectedFailure::Network) => {
                return Err(Error::Network("network request failed".into()))
            }
            Some(InjectedFailure::Rejected(message)) => return Err(Error::rejected(message)),
            None => {}
        }

        let key = (request.user_id.clone(), request.video_id.clone());
        if !log.completed.insert(key) {
            // Same viewing resubmitted; the ledger is not credited twice
            debug!(video_id = %request.video_id, "Duplicate claim acknowledged");
            return Ok(ClaimResponse::accepted(true));
        }

        let reward = log
            .queue
            .iter()
            .find(|video| video.id == request.video_id)
            .map(|video| video.reward_amount)
            .unwrap_or(0);
        log.balance += reward;
        log.rewards.push((request.video_id.clone(), reward));
        Ok(ClaimResponse::accepted(true))
    }

    async fn fetch_queue(&self, _user_id: &UserId) -> Result<Vec<VideoDescriptor>> {
        self.check_online()?;
        let mut log = self.log();
        log.queue_fetches += 1;
        Ok(log.queue.clone())
    }

    async fn refresh_balance(&self, _user_id: &UserId) -> Result<u64> {
        self.check_online()?;
        let mut log = self.log();
        log.balance_fetches += 1;
        Ok(log.balance)
    }
}

#[derive(Debug, Default)]
struct SurfaceLog {
    mounted: Vec<String>,
    unmounts: usize,
    posted: Vec<OutboundMessage>,
    position: Option<f64>,
    fail_next_mount: bool,
}

/// Embed surface double that records commands and reports a scripted
/// playback position
#[derive(Debug, Default)]
pub struct ScriptedSurface {
    log: Mutex<SurfaceLog>,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, SurfaceLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Embed ids mounted so far, in order
    pub fn mounted(&self) -> Vec<String> {
        self.log().mounted.clone()
    }

    pub fn unmounts(&self) -> usize {
        self.log().unmounts
    }

    pub fn posted(&self) -> Vec<OutboundMessage> {
        self.log().posted.clone()
    }

    pub fn clear_posted(&self) {
        self.log().posted.clear();
    }

    pub fn set_position(&self, seconds: f64) {
        self.log().position = Some(seconds);
    }

    pub fn fail_next_mount(&self) {
        self.log().fail_next_mount = true;
    }
}

#[async_trait]
impl EmbedSurface for ScriptedSurface {
    async fn mount(&self, _video: &VideoDescriptor, embed_id: &str) -> Result<()> {
        let mut log = self.log();
        if std::mem::take(&mut log.fail_next_mount) {
            return Err(Error::Surface("surface failed to load".into()));
        }
        log.mounted.push(embed_id.to_string());
        log.position = None;
        Ok(())
    }

    async fn post(&self, message: &OutboundMessage) -> Result<()> {
        self.log().posted.push(*message);
        Ok(())
    }

    async fn current_time(&self) -> Result<Option<f64>> {
        Ok(self.log().position)
    }

    async fn unmount(&self) -> Result<()> {
        self.log().unmounts += 1;
        Ok(())
    }
}
