//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `session` - Ephemeral realtime credential issuance
//! - `question` - Question pool lookup backing the model's tool calls

pub mod api;
pub mod question;
pub mod session;

pub use api::health_check;
pub use question::get_question;
pub use session::create_session;

use std::collections::HashMap;

/// Decode a query string, keeping the first value of a repeated key.
///
/// Handlers read their parameters through this rather than a typed
/// `Query` so that `?mode=a&mode=b` is served instead of rejected.
pub(crate) fn first_query_values(raw: Option<&str>) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
        values
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    values
}
