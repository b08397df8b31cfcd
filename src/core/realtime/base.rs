//! Base traits and types for the interview client runtime.
//!
//! The rollover state machine never touches a media stack directly. It talks
//! to four seams:
//!
//! - [`Connector`] opens transports and owns the shared audio capture
//! - [`Transport`] is one realtime session (media + control channel)
//! - [`AudioOutput`] plays whichever transport is currently active
//! - [`CredentialSource`] / [`QuestionTool`] reach the relay over HTTP
//!
//! Transports report back through a single event channel; every event is
//! tagged with the [`TransportId`] it came from so events of a candidate can
//! be told apart from the active one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::messages::ClientEvent;
use crate::core::questions::{QuestionCategory, QuestionRecord};
use crate::core::session::SessionCredential;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur in the interview client runtime.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider rejected the session credential
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Control channel not open
    #[error("Not connected")]
    NotConnected,

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The session has been stopped
    #[error("Session closed")]
    SessionClosed,

    /// The relay did not hand out a usable credential
    #[error("{0}")]
    Credential(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::SerializationError(e.to_string())
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of an interview session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not started
    #[default]
    Idle,
    /// Fetching the first credential and opening the first transport
    Connecting,
    /// One transport serving the interview, rollover armed
    Active,
    /// A candidate transport is being prepared alongside the active one
    RollingOver,
    /// Stopped or failed to start; terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Active => write!(f, "Active"),
            SessionState::RollingOver => write!(f, "RollingOver"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Transport Events
// =============================================================================

/// Identifier of one transport generation. Never reused within a session.
pub type TransportId = u64;

/// Which connection-state machine a [`TransportEvent::StateChanged`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// ICE candidate gathering
    Gathering,
    /// SDP signaling
    Signaling,
    /// ICE connectivity
    Ice,
    /// Overall peer connection
    Peer,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Gathering => write!(f, "ICE-Gathering"),
            StateKind::Signaling => write!(f, "Signaling"),
            StateKind::Ice => write!(f, "ICE"),
            StateKind::Peer => write!(f, "PC"),
        }
    }
}

/// Something that happened on a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The control channel finished opening
    ChannelOpen,
    /// A text frame arrived on the control channel
    ChannelMessage(String),
    /// The control channel closed
    ChannelClosed,
    /// Remote media became available
    RemoteAudio(Arc<dyn InboundAudio>),
    /// A connection-state transition, reported for observability
    StateChanged {
        /// State machine the transition belongs to
        kind: StateKind,
        /// New state as reported by the media stack (lowercase)
        state: String,
    },
}

impl TransportEvent {
    /// Whether this transition means media can flow.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            TransportEvent::StateChanged { kind: StateKind::Peer | StateKind::Ice, state }
                if state == "connected"
        )
    }

    /// Whether this transition means the connection is unusable.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            TransportEvent::StateChanged { kind: StateKind::Peer, state } if state == "failed"
        )
    }
}

/// A [`TransportEvent`] together with its origin.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    /// Transport that produced the event
    pub transport: TransportId,
    /// The event itself
    pub event: TransportEvent,
}

/// Sender half transports report through.
pub type EventSender = mpsc::UnboundedSender<TaggedEvent>;

// =============================================================================
// Media Seams
// =============================================================================

/// Local microphone capture, shared by every transport generation.
pub trait AudioCapture: Send + Sync {
    /// Stop all capture tracks. Called once, at final teardown.
    fn stop(&self);

    /// Downcast hook for connectors that need their concrete capture type.
    fn as_any(&self) -> &dyn Any;
}

/// Inbound media of one transport.
pub trait InboundAudio: Send + Sync + fmt::Debug {
    /// Track identifier, for logging
    fn id(&self) -> String;

    /// Downcast hook for outputs that need the concrete track type.
    fn as_any(&self) -> &dyn Any;
}

/// The single audio sink bound to the UI.
pub trait AudioOutput: Send + Sync {
    /// Play `source`, replacing whatever was playing.
    fn attach(&self, source: Arc<dyn InboundAudio>);

    /// Stop playing.
    fn detach(&self);
}

/// One realtime session: outbound capture, inbound audio and a control channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Generation identifier
    fn id(&self) -> TransportId;

    /// Send one event over the control channel.
    async fn send(&self, event: &ClientEvent) -> RealtimeResult<()>;

    /// Release the control channel, outbound tracks and the connection.
    ///
    /// Must tolerate being called more than once and on half-open transports.
    async fn close(&self);
}

/// Opens transports against the upstream provider.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Acquire the local capture stream (echo cancellation, noise
    /// suppression, auto gain, mono).
    async fn acquire_capture(&self) -> RealtimeResult<Arc<dyn AudioCapture>>;

    /// Open one transport authenticated by `credential`.
    ///
    /// The control channel must be created before the offer is sent.
    /// Everything the transport observes is reported on `events`, tagged
    /// with `id`.
    async fn open(
        &self,
        id: TransportId,
        credential: &SessionCredential,
        capture: Arc<dyn AudioCapture>,
        events: EventSender,
    ) -> RealtimeResult<Arc<dyn Transport>>;
}

// =============================================================================
// Relay Seams
// =============================================================================

/// Source of fresh session credentials (normally the relay's `/session`).
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credential(&self) -> RealtimeResult<SessionCredential>;
}

/// Backend of the question tool (normally the relay's `/tool/question`).
#[async_trait]
pub trait QuestionTool: Send + Sync {
    async fn get_question(&self, category: QuestionCategory) -> RealtimeResult<QuestionRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::RollingOver.to_string(), "RollingOver");
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn test_connected_detection() {
        let peer = TransportEvent::StateChanged {
            kind: StateKind::Peer,
            state: "connected".to_string(),
        };
        let ice = TransportEvent::StateChanged {
            kind: StateKind::Ice,
            state: "connected".to_string(),
        };
        let signaling = TransportEvent::StateChanged {
            kind: StateKind::Signaling,
            state: "stable".to_string(),
        };
        assert!(peer.is_connected());
        assert!(ice.is_connected());
        assert!(!signaling.is_connected());
        assert!(!TransportEvent::ChannelOpen.is_connected());
    }

    #[test]
    fn test_failed_detection() {
        let failed = TransportEvent::StateChanged {
            kind: StateKind::Peer,
            state: "failed".to_string(),
        };
        let ice_failed = TransportEvent::StateChanged {
            kind: StateKind::Ice,
            state: "failed".to_string(),
        };
        assert!(failed.is_failed());
        assert!(!ice_failed.is_failed());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RealtimeError::SessionClosed.to_string(), "Session closed");
        assert_eq!(
            RealtimeError::Credential("No client secret in /session".into()).to_string(),
            "No client secret in /session"
        );
    }
}
