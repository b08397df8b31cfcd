//! Question Source: a fixed, read-only pool of interview questions served to
//! the remote model through the question tool.

mod bank;
mod types;

pub use bank::QuestionBank;
pub use types::{QuestionCategory, QuestionError, QuestionRecord};
