//! Output formatting for CLI

use chrono::{DateTime, Utc};
use console::style;
use earnview_core::{
    ClaimRequest, ControllerEvent, ControllerEventRecord, ControllerStatus, VideoDescriptor,
};
use serde::Serialize;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// One line per controller event
pub fn print_event(record: &ControllerEventRecord, elapsed: Duration, format: OutputFormat) {
    if format == OutputFormat::Json {
        match serde_json::to_string(record) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
        }
        return;
    }

    let stamp = format!("[{:>7.1}s]", elapsed.as_secs_f64());
    let text = describe(&record.event);
    let line = match &record.event {
        ControllerEvent::RewardEarned { .. } | ControllerEvent::BackOnline => style(text).green(),
        ControllerEvent::WentOffline { .. }
        | ControllerEvent::Error { .. }
        | ControllerEvent::PlaybackFailed { .. } => style(text).red(),
        ControllerEvent::StallWarning { .. } => style(text).yellow(),
        _ => style(text),
    };
    println!("{} {}", style(stamp).dim(), line);
}

fn describe(event: &ControllerEvent) -> String {
    match event {
        ControllerEvent::SessionStarted {
            video_id,
            target_seconds,
            ..
        } => format!("session started: {video_id} (target {target_seconds}s)"),
        ControllerEvent::SessionEnded {
            watched_seconds,
            reward_claimed,
            ..
        } => format!("session ended after {watched_seconds}s (claimed: {reward_claimed})"),
        ControllerEvent::PlayerStateChanged { state, .. } => format!("player {state}"),
        ControllerEvent::TargetReached { watched_seconds, .. } => {
            format!("target reached at {watched_seconds}s")
        }
        ControllerEvent::ClaimSubmitted {
            video_id,
            watched_seconds,
            trigger,
            ..
        } => format!("claim submitted: {video_id} {watched_seconds}s ({trigger:?})"),
        ControllerEvent::RewardEarned {
            video_id,
            reward_amount,
            ..
        } => format!("earned {reward_amount} coins for {video_id}"),
        ControllerEvent::WentOffline { message } => format!("offline: {message}"),
        ControllerEvent::BackOnline => "back online".to_string(),
        ControllerEvent::Error { code, message } => format!("error {code}: {message}"),
        ControllerEvent::PlaybackFailed { failure, .. } => format!("playback failed: {failure:?}"),
        ControllerEvent::StallWarning { .. } => "playback stalled".to_string(),
        ControllerEvent::QueueAdvanced { from, to, automatic } => format!(
            "queue advanced {} -> {}{}",
            display_id(from.as_ref()),
            display_id(to.as_ref()),
            if *automatic { " (auto)" } else { "" }
        ),
        ControllerEvent::QueueRefilled { added } => format!("queue refilled (+{added})"),
        ControllerEvent::BalanceUpdated { coins } => format!("balance {coins}"),
    }
}

fn display_id(id: Option<&impl std::fmt::Display>) -> String {
    id.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

#[derive(Tabled)]
struct VideoRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Embed")]
    embed: String,
    #[tabled(rename = "Target (s)")]
    target: u32,
    #[tabled(rename = "Reward")]
    reward: u64,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Eligible")]
    eligible: bool,
}

pub fn print_queue(videos: &[VideoDescriptor], now: DateTime<Utc>, hold_window: chrono::Duration, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!("{}", to_json(&videos));
        return;
    }

    let rows: Vec<VideoRow> = videos
        .iter()
        .map(|video| VideoRow {
            id: video.id.to_string(),
            embed: video.embed_id().unwrap_or_else(|| "?".to_string()),
            target: video.target_duration_seconds,
            reward: video.reward_amount,
            status: if video.deleted {
                "deleted".to_string()
            } else {
                format!("{:?}", video.status).to_lowercase()
            },
            eligible: !video.is_skip_eligible(now, hold_window),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
}

#[derive(Tabled)]
struct ClaimRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Video")]
    video: String,
    #[tabled(rename = "Watched (s)")]
    watched: u32,
    #[tabled(rename = "Auto-skip")]
    auto_skip: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    status: &'a ControllerStatus,
    claims: &'a [ClaimRequest],
    balance: u64,
}

/// Final report of a simulation run
pub fn print_summary(status: &ControllerStatus, claims: &[ClaimRequest], balance: u64, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!(
            "{}",
            to_json(&Summary {
                status,
                claims,
                balance
            })
        );
        return;
    }

    println!();
    println!("{}", style("Simulation summary").bold());
    println!("  Current video: {}", display_id(status.video_id.as_ref()));
    println!("  Watched:       {}s of {}s", status.watched_seconds, status.target_seconds);
    println!("  Button:        {:?}", status.button);
    println!("  Offline:       {}", status.offline);
    if let Some(error) = &status.error {
        println!("  Error:         {error}");
    }
    println!("  Balance:       {balance}");
    println!("  Claims:        {}", claims.len());

    if !claims.is_empty() {
        let rows: Vec<ClaimRow> = claims
            .iter()
            .enumerate()
            .map(|(i, claim)| ClaimRow {
                index: i + 1,
                video: claim.video_id.to_string(),
                watched: claim.watched_seconds,
                auto_skip: claim.is_auto_skip,
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::from("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_describe_queue_advance() {
        let text = describe(&ControllerEvent::QueueAdvanced {
            from: Some("v1".into()),
            to: None,
            automatic: true,
        });
        assert_eq!(text, "queue advanced v1 -> - (auto)");
    }
}
