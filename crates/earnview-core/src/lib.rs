//! Earnview Core - Playback-Reward Controller
//!
//! This crate provides the client side of a watch-to-earn queue:
//! - An embedded player bridge with a closed event vocabulary
//! - A watch timer that only counts confirmed, focused, foreground playback
//! - At-most-once reward claims per viewing session
//! - A looping queue cursor that skips held and inactive videos
//! - A PostgREST-style RPC backend client
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Earnview Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Embed     │  │    Watch     │  │    Reward    │           │
//! │  │    Bridge    │  │    Timer     │  │    Guard     │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │  Session    │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │    Video     │  │  Playback   │  │    Reward    │            │
//! │  │    Queue     │──│ Controller  │──│   Backend    │            │
//! │  └──────────────┘  └──────┬──────┘  └──────────────┘            │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │ Status/Event│                              │
//! │                    │  Channels   │                              │
//! │                    └─────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod bridge;
pub mod timer;
pub mod guard;
pub mod queue;
pub mod backend;
pub mod events;
pub mod session;
pub mod controller;
pub mod sim;

pub use error::{Error, Result};
pub use types::*;
pub use config::{ControllerConfig, RpcConfig, RpcFunctions, UnavailablePolicy};
pub use bridge::{BridgeEvent, EmbedBridge, EmbedSurface, InboundMessage, OutboundMessage};
pub use timer::{Gates, TickOutcome, WatchTimer};
pub use guard::{ClaimOutcome, ClaimState, ClaimTrigger, RewardGuard};
pub use queue::VideoQueue;
pub use backend::{ClaimRequest, ClaimResponse, RewardBackend, RpcClient};
pub use events::{ControllerEvent, ControllerEventRecord, EventBus};
pub use session::PlaybackSession;
pub use controller::PlaybackController;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the controller library
pub fn init() {
    tracing::info!(version = VERSION, "Earnview Core initialized");
}
