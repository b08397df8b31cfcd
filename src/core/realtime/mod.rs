//! Realtime interview client.
//!
//! Keeps a voice interview running over WebRTC against the upstream
//! realtime API while the short-lived credentials it connects with are
//! replaced underneath it.
//!
//! # Architecture
//!
//! - [`RelayClient`] fetches credentials and questions from the relay
//! - [`PeerSessionManager`] opens transports and owns the shared capture
//! - [`InterviewSession`] runs the rollover state machine
//! - [`ToolDispatcher`] answers the model's `question_bank_get` calls
//!
//! Transports are reached through the [`Connector`] trait; the WebRTC
//! implementation lives in [`webrtc`](self::webrtc). Sound-card capture and
//! playback need the `audio-io` feature; without it the client sends silence
//! and discards what it receives.
//!
//! # Example
//!
//! ```rust,ignore
//! use interview_relay::core::realtime::*;
//! use std::sync::Arc;
//!
//! let settings = InterviewSettings::default();
//! let relay = Arc::new(RelayClient::new("http://localhost:3001", settings)?);
//! let session = InterviewSession::spawn(
//!     settings,
//!     RolloverConfig::default(),
//!     SessionServices {
//!         credentials: relay.clone(),
//!         questions: relay,
//!         connector: Arc::new(WebRtcConnector::new(WebRtcConfig::default())?),
//!         output: Arc::new(NullAudioOutput::new()),
//!     },
//! );
//! session.start().await?;
//! ```

pub mod audio;
mod base;
#[cfg(feature = "audio-io")]
mod device;
mod messages;
mod peer;
mod relay_client;
mod rollover;
mod scheduler;
mod settings;
mod tools;
pub mod webrtc;

pub use base::{
    AudioCapture, AudioOutput, Connector, CredentialSource, EventSender, InboundAudio,
    QuestionTool, RealtimeError, RealtimeResult, SessionState, StateKind, TaggedEvent, Transport,
    TransportEvent, TransportId,
};
pub use messages::{ChannelMessage, ClientEvent, ContentPart, ConversationItem, OutputItem};
pub use peer::PeerSessionManager;
pub use relay_client::RelayClient;
pub use rollover::{InterviewSession, SessionServices, SessionStatus};
pub use scheduler::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FALLBACK_DELAY, DEFAULT_MIN_DELAY, DEFAULT_SAFETY_MARGIN,
    Deadline, RolloverConfig, now_ms, rollover_delay,
};
pub use settings::InterviewSettings;
pub use tools::{FunctionCall, PendingCalls, ToolDispatcher};
pub use audio::PlaybackMeter;
pub use webrtc::{
    AudioCodec, CaptureMode, NullAudioOutput, TurnServer, WebRtcConfig, WebRtcConnector,
    open_device_output,
};
