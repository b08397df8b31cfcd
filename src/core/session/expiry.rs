//! Credential and expiry extraction from upstream session bodies.
//!
//! The upstream provider is inconsistent about where it puts the client
//! secret and its expiry, and about the expiry's unit. Both are resolved here
//! with explicit, ordered extraction rules: the first rule that yields a
//! usable value wins. The functions are pure so the relay (for logging) and
//! the client (for rollover scheduling) agree on the result.

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Numeric expiries below this are seconds since epoch, not milliseconds.
pub const SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

/// JSON pointers searched for an expiry, highest priority first.
pub const EXPIRY_POINTERS: [&str; 4] = [
    "/expires_at",
    "/client_secret/expires_at",
    "/session/expires_at",
    "/session/client_secret/expires_at",
];

/// JSON pointers searched for the bearer token, highest priority first.
pub const TOKEN_POINTERS: [&str; 3] = ["/client_secret/value", "/client_secret", "/value"];

/// A short-lived bearer token plus its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// Opaque bearer token
    pub token: String,
    /// Expiry in milliseconds since epoch, if the upstream supplied one
    pub expires_at_ms: Option<i64>,
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"<redacted>")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

impl SessionCredential {
    /// Extract a credential from a session body.
    ///
    /// Returns `None` only when no token is present; a missing or malformed
    /// expiry yields `expires_at_ms: None`.
    pub fn from_session_body(body: &Value) -> Option<Self> {
        let token = extract_token(body)?;
        Some(Self {
            token,
            expires_at_ms: extract_expiry_ms(body),
        })
    }
}

/// Normalise a raw expiry value to milliseconds since epoch.
///
/// Accepts RFC 3339 strings, numeric strings, and numbers in seconds or
/// milliseconds. Anything else (including zero and negative values) is `None`.
pub fn normalize_expiry(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
            scale_to_ms(raw)
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(raw) = s.parse::<i64>() {
                return scale_to_ms(raw);
            }
            OffsetDateTime::parse(s, &Rfc3339)
                .ok()
                .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as i64)
        }
        _ => None,
    }
}

fn scale_to_ms(raw: i64) -> Option<i64> {
    if raw <= 0 {
        None
    } else if raw < SECONDS_THRESHOLD {
        raw.checked_mul(1000)
    } else {
        Some(raw)
    }
}

/// The raw expiry value the extraction rules select, before normalisation.
///
/// Mirrors the order of [`EXPIRY_POINTERS`]; useful for logging what the
/// upstream actually sent.
pub fn raw_expiry(body: &Value) -> Option<&Value> {
    EXPIRY_POINTERS
        .iter()
        .filter_map(|ptr| body.pointer(ptr))
        .find(|v| !v.is_null())
}

/// Apply the expiry extraction rules: first parseable value wins.
pub fn extract_expiry_ms(body: &Value) -> Option<i64> {
    EXPIRY_POINTERS
        .iter()
        .filter_map(|ptr| body.pointer(ptr))
        .find_map(normalize_expiry)
}

/// Apply the token extraction rules: first non-empty string wins.
pub fn extract_token(body: &Value) -> Option<String> {
    TOKEN_POINTERS
        .iter()
        .filter_map(|ptr| body.pointer(ptr))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
        .map(str::to_string)
}
