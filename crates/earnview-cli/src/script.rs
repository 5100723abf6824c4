//! Simulation scripts
//!
//! A script lists the queue, an optional controller config, and timed steps
//! fed to the controller as if they came from the embed and the host.

use anyhow::Context;
use earnview_core::{sim::InjectedFailure, ControllerConfig, HostSignal, VideoDescriptor};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default)]
    pub config: ControllerConfig,
    pub queue: Vec<VideoDescriptor>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Keep running this long after the first step (seconds)
    #[serde(default)]
    pub run_for_secs: Option<f64>,
}

fn default_user() -> String {
    "demo-user".to_string()
}

/// Longest simulated run accepted (one week)
const MAX_OFFSET_SECS: f64 = 7.0 * 86_400.0;

fn valid_offset(secs: f64) -> bool {
    secs.is_finite() && (0.0..=MAX_OFFSET_SECS).contains(&secs)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Offset from simulation start (seconds)
    #[serde(default)]
    pub at_secs: f64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Raw message posted by the embed
    Embed { message: serde_json::Value },
    Host { signal: HostSignal },
    /// Playhead position reported to the stall poller
    Position { seconds: f64 },
    Skip,
    Earn,
    Retry,
    RetryClaim,
    DismissError,
    FailNextClaim { failure: FailureSpec },
    /// Take the simulated backend on or off line
    Offline { offline: bool },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSpec {
    Network,
    Rejected(String),
}

impl From<FailureSpec> for InjectedFailure {
    fn from(spec: FailureSpec) -> Self {
        match spec {
            FailureSpec::Network => InjectedFailure::Network,
            FailureSpec::Rejected(message) => InjectedFailure::Rejected(message),
        }
    }
}

impl Script {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        let script: Script = serde_json::from_str(&contents)
            .with_context(|| format!("parsing script {}", path.display()))?;
        script.validate()?;
        Ok(script)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(step) = self.steps.iter().find(|s| !valid_offset(s.at_secs)) {
            anyhow::bail!("step {:?} has an invalid at_secs", step.action);
        }
        if let Some(secs) = self.run_for_secs.filter(|secs| !valid_offset(*secs)) {
            anyhow::bail!("run_for_secs {secs} is out of range");
        }
        self.config.validate()?;
        Ok(())
    }

    /// Steps in time order; ties keep their file order
    pub fn ordered_steps(&self) -> Vec<Step> {
        let mut steps = self.steps.clone();
        steps.sort_by(|a, b| a.at_secs.total_cmp(&b.at_secs));
        steps
    }

    /// Total simulated time
    pub fn duration_secs(&self) -> f64 {
        let last = self.steps.iter().map(|s| s.at_secs).fold(0.0, f64::max);
        self.run_for_secs.unwrap_or(0.0).max(last)
    }
}
