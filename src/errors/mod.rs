//! Error types shared by the HTTP layer.
//!
//! Component-level errors (`BrokerError`, `QuestionError`, `RealtimeError`)
//! live next to their components and convert into [`AppError`] at the
//! handler boundary.

pub mod app_error;

pub use app_error::{AppError, AppResult};
