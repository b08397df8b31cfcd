pub mod questions;
pub mod realtime;
pub mod session;

// Re-export commonly used types for convenience
pub use questions::{QuestionBank, QuestionCategory, QuestionError, QuestionRecord};

pub use realtime::{
    InterviewSession, InterviewSettings, RealtimeError, RealtimeResult, RelayClient,
    RolloverConfig, SessionState, SessionStatus,
};

pub use session::{
    BrokerError, CredentialBroker, InterviewLanguage, InterviewMode, SessionCredential,
    build_instructions,
};
