//! Embed message protocol
//!
//! Messages are JSON objects tagged on a `type` field. Inbound messages come
//! from the script running inside the embed surface; outbound messages are
//! posted into it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Commands posted into the embed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    PlayVideo,
    PauseVideo,
    /// The watch target was reached; the embed may disable interaction
    TimerComplete,
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Play/pause are intents that can wait for readiness
    pub fn is_intent(&self) -> bool {
        matches!(self, OutboundMessage::PlayVideo | OutboundMessage::PauseVideo)
    }
}

/// Raw messages posted by the embed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    #[serde(alias = "webViewReady")]
    BridgeReady,
    VideoLoaded,
    VideoPlaying,
    VideoPaused,
    VideoBuffering,
    VideoCued,
    VideoEnded,
    VideoUnavailable {
        #[serde(default, rename = "errorCode")]
        error_code: Option<i64>,
    },
    VideoError {
        #[serde(default, rename = "errorCode", alias = "code")]
        error_code: Option<i64>,
    },
    /// Native numeric player state, forwarded untranslated by some embeds
    PlayerStateChange { state: i64 },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::MalformedMessage(e.to_string()))
    }
}

/// Closed event vocabulary the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    BridgeReady,
    VideoLoaded,
    VideoPlaying,
    VideoPaused,
    VideoBuffering,
    VideoCued,
    VideoEnded,
    VideoUnavailable { code: Option<i64> },
    VideoError { code: i64 },
}

/// Map a native embed state code onto the event vocabulary.
///
/// -1 unstarted, 0 ended, 1 playing, 2 paused, 3 buffering, 5 cued.
pub fn from_native_state(state: i64) -> Option<BridgeEvent> {
    match state {
        0 => Some(BridgeEvent::VideoEnded),
        1 => Some(BridgeEvent::VideoPlaying),
        2 => Some(BridgeEvent::VideoPaused),
        3 => Some(BridgeEvent::VideoBuffering),
        5 => Some(BridgeEvent::VideoCued),
        _ => None,
    }
}

/// Translate an inbound message, escalating error codes from the
/// unavailable set to `VideoUnavailable`
pub fn translate(message: InboundMessage, is_unavailable: impl Fn(i64) -> bool) -> Option<BridgeEvent> {
    match message {
        InboundMessage::BridgeReady => Some(BridgeEvent::BridgeReady),
        InboundMessage::VideoLoaded => Some(BridgeEvent::VideoLoaded),
        InboundMessage::VideoPlaying => Some(BridgeEvent::VideoPlaying),
        InboundMessage::VideoPaused => Some(BridgeEvent::VideoPaused),
        InboundMessage::VideoBuffering => Some(BridgeEvent::VideoBuffering),
        InboundMessage::VideoCued => Some(BridgeEvent::VideoCued),
        InboundMessage::VideoEnded => Some(BridgeEvent::VideoEnded),
        InboundMessage::VideoUnavailable { error_code } => {
            Some(BridgeEvent::VideoUnavailable { code: error_code })
        }
        InboundMessage::VideoError { error_code } => match error_code {
            Some(code) if is_unavailable(code) => {
                Some(BridgeEvent::VideoUnavailable { code: Some(code) })
            }
            Some(code) => Some(BridgeEvent::VideoError { code }),
            None => Some(BridgeEvent::VideoError { code: -1 }),
        },
        InboundMessage::PlayerStateChange { state } => from_native_state(state),
        InboundMessage::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn youtube_codes(code: i64) -> bool {
        matches!(code, 2 | 100 | 101 | 150)
    }

    #[test]
    fn test_outbound_wire_format() {
        assert_eq!(OutboundMessage::PlayVideo.to_json().unwrap(), r#"{"type":"playVideo"}"#);
        assert_eq!(OutboundMessage::PauseVideo.to_json().unwrap(), r#"{"type":"pauseVideo"}"#);
        assert_eq!(
            OutboundMessage::TimerComplete.to_json().unwrap(),
            r#"{"type":"timerComplete"}"#
        );
    }

    #[test]
    fn test_ready_alias() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"webViewReady"}"#).unwrap(),
            InboundMessage::BridgeReady
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"bridgeReady"}"#).unwrap(),
            InboundMessage::BridgeReady
        );
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"qualityChanged","quality":"hd720"}"#).unwrap(),
            InboundMessage::Unknown
        );
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_error_code_escalation() {
        let unavailable = InboundMessage::parse(r#"{"type":"videoError","errorCode":150}"#).unwrap();
        assert_eq!(
            translate(unavailable, youtube_codes),
            Some(BridgeEvent::VideoUnavailable { code: Some(150) })
        );

        let recoverable = InboundMessage::parse(r#"{"type":"videoError","errorCode":5}"#).unwrap();
        assert_eq!(
            translate(recoverable, youtube_codes),
            Some(BridgeEvent::VideoError { code: 5 })
        );
    }

    #[test]
    fn test_native_states() {
        let msg = InboundMessage::parse(r#"{"type":"playerStateChange","state":1}"#).unwrap();
        assert_eq!(translate(msg, youtube_codes), Some(BridgeEvent::VideoPlaying));
        assert_eq!(from_native_state(3), Some(BridgeEvent::VideoBuffering));
        assert_eq!(from_native_state(-1), None);
    }
}
