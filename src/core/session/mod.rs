//! Credential broker: instruction building, upstream session issuance and
//! credential/expiry extraction.

pub mod broker;
pub mod config;
pub mod expiry;
pub mod instructions;
pub mod messages;

pub use broker::{BrokerError, CredentialBroker, IssuedSession, extract_upstream_message};
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE, InterviewLanguage, InterviewMode,
    QUESTION_TOOL_NAME,
};
pub use expiry::{SessionCredential, extract_expiry_ms, extract_token, normalize_expiry};
pub use instructions::{build_instructions, build_preamble};
pub use messages::{SessionRequest, ToolDef, TurnDetection};
