//! CLI command implementations

use crate::output::{self, OutputFormat};
use crate::script::{Action, Script};
use anyhow::Context;
use earnview_core::{
    sim::{InMemoryBackend, ScriptedSurface},
    ControllerConfig, PlaybackController, RewardBackend, RpcClient, RpcConfig, UserId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Run a simulation script against in-memory collaborators
pub async fn simulate(path: &Path, realtime: bool, format: OutputFormat) -> anyhow::Result<()> {
    let script = Script::from_file(path)?;
    if !realtime {
        // Virtual clock: idle time jumps straight to the next timer
        tokio::time::pause();
    }

    let backend = Arc::new(InMemoryBackend::new(script.queue.clone()));
    let surface = Arc::new(ScriptedSurface::new());
    let controller = PlaybackController::new(
        UserId::from(script.user_id.as_str()),
        script.config.clone(),
        backend.clone(),
        surface.clone(),
    )?;

    let start = Instant::now();
    let mut events = controller.subscribe_events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(record) => output::print_event(&record, start.elapsed(), format),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!(videos = script.queue.len(), steps = script.steps.len(), realtime, "Starting simulation");
    controller.load_queue().await?;

    for step in script.ordered_steps() {
        tokio::time::sleep_until(start + Duration::from_secs_f64(step.at_secs)).await;
        debug!(at_secs = step.at_secs, action = ?step.action, "Script step");
        if let Err(e) = run_action(&controller, &backend, &surface, step.action).await {
            warn!(error = %e, "Script step failed");
        }
    }
    tokio::time::sleep_until(start + Duration::from_secs_f64(script.duration_secs())).await;

    let status = controller.status();
    controller.shutdown().await;
    // Let the printer drain what is already queued
    tokio::task::yield_now().await;
    printer.abort();

    output::print_summary(&status, &backend.claims(), backend.balance(), format);
    Ok(())
}

async fn run_action(
    controller: &PlaybackController,
    backend: &InMemoryBackend,
    surface: &ScriptedSurface,
    action: Action,
) -> anyhow::Result<()> {
    match action {
        Action::Embed { message } => {
            let raw = serde_json::to_string(&message)?;
            if controller.handle_bridge_message(&raw).await.is_none() {
                debug!(%raw, "Embed message had no effect");
            }
        }
        Action::Host { signal } => controller.handle_host_signal(signal).await,
        Action::Position { seconds } => surface.set_position(seconds),
        Action::Skip => {
            let outcome = controller.skip().await?;
            debug!(?outcome, "Skip");
        }
        Action::Earn => {
            let outcome = controller.earn().await?;
            debug!(?outcome, "Earn");
        }
        Action::Retry => controller.retry().await?,
        Action::RetryClaim => {
            let outcome = controller.retry_claim().await?;
            debug!(?outcome, "Retry claim");
        }
        Action::DismissError => controller.dismiss_error().await,
        Action::FailNextClaim { failure } => backend.fail_next_claim(failure.into()),
        Action::Offline { offline } => backend.set_offline(offline),
    }
    Ok(())
}

/// Endpoint options shared by the remote commands
#[derive(Debug, clap::Args)]
pub struct RpcArgs {
    /// Backend base URL
    #[arg(long, env = "EARNVIEW_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// Public API key
    #[arg(long, env = "EARNVIEW_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// User access token
    #[arg(long, env = "EARNVIEW_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// JSON file with the full RPC configuration
    #[arg(long)]
    pub rpc_config: Option<PathBuf>,
}

impl RpcArgs {
    fn into_config(self) -> anyhow::Result<RpcConfig> {
        let mut config = match self.rpc_config {
            Some(path) => RpcConfig::from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => {
                let url = self
                    .rpc_url
                    .context("no backend URL; pass --rpc-url or set EARNVIEW_RPC_URL")?;
                let key = self
                    .api_key
                    .context("no API key; pass --api-key or set EARNVIEW_API_KEY")?;
                RpcConfig::new(url, key)
            }
        };
        if let Some(token) = self.access_token {
            config.access_token = Some(token);
        }
        Ok(config)
    }
}

/// Fetch and print the queue for a user
pub async fn queue(user: &str, rpc: RpcArgs, config: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let controller_config = load_controller_config(config.as_deref())?;
    let client = RpcClient::new(rpc.into_config()?)?;

    let videos = client.fetch_queue(&UserId::from(user)).await?;
    info!(count = videos.len(), "Queue fetched");
    output::print_queue(&videos, chrono::Utc::now(), controller_config.hold_window(), format);
    Ok(())
}

/// Fetch and print the coin balance for a user
pub async fn balance(user: &str, rpc: RpcArgs, format: OutputFormat) -> anyhow::Result<()> {
    let client = RpcClient::new(rpc.into_config()?)?;
    let coins = client.refresh_balance(&UserId::from(user)).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "user_id": user, "coins": coins })),
        _ => println!("{user}: {coins} coins"),
    }
    Ok(())
}

/// Validate and print the effective controller configuration
pub fn config(path: Option<&Path>, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_controller_config(path)?;
    match format {
        OutputFormat::Json => println!("{}", output::to_json(&config)),
        _ => {
            let value = serde_json::to_value(&config)?;
            if let Some(map) = value.as_object() {
                for (key, value) in map {
                    println!("  {key:<28} {value}");
                }
            }
        }
    }
    Ok(())
}

fn load_controller_config(path: Option<&Path>) -> anyhow::Result<ControllerConfig> {
    let config = match path {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
