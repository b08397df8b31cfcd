//! Credential broker.
//!
//! Exchanges the server's long-lived provider key for a short-lived session
//! credential bound to interviewer instructions, a fixed voice and server
//! VAD settings.
//!
//! # API Reference
//!
//! - Endpoint: `POST {base}/v1/realtime/sessions`
//! - Auth: `Authorization: Bearer <server key>`, `OpenAI-Beta: realtime=v1`
//! - Body: [`SessionRequest`]
//! - Response: passed through untouched; see [`super::expiry`] for how the
//!   credential and expiry are located in it.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroize;

use super::config::{InterviewLanguage, InterviewMode};
use super::expiry::{SessionCredential, raw_expiry};
use super::instructions::build_instructions;
use super::messages::SessionRequest;
use crate::config::ServerConfig;

/// Path of the session-issuance endpoint, relative to the provider base URL.
pub const SESSIONS_PATH: &str = "/v1/realtime/sessions";

/// Errors raised while issuing a session credential.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The server has no provider key configured
    #[error("OPENAI_API_KEY not set")]
    MissingApiKey,

    /// The provider answered with a non-success status
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status returned by the provider
        status: u16,
        /// Best-effort message extracted from the body
        message: String,
    },

    /// The request never completed (DNS, TLS, timeout, ...)
    #[error("Upstream request failed: {0}")]
    Transport(String),

    /// The provider answered 2xx with a body that is not JSON
    #[error("{0}")]
    InvalidResponse(String),
}

/// A freshly issued upstream session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Normalised mode the instructions were built for
    pub mode: InterviewMode,
    /// Normalised spoken language
    pub language: InterviewLanguage,
    /// Upstream body, unmodified
    pub body: Value,
    /// Credential located in the body, if any
    pub credential: Option<SessionCredential>,
}

/// Issues short-lived realtime credentials on behalf of browser clients.
pub struct CredentialBroker {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    voice: String,
}

impl Drop for CredentialBroker {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl CredentialBroker {
    /// Create a broker from server configuration.
    pub fn new(config: &ServerConfig) -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .build()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.realtime_model.clone(),
            voice: config.realtime_voice.clone(),
        })
    }

    /// Build the upstream request body for a normalised mode/language pair.
    pub fn build_request(&self, mode: InterviewMode, language: InterviewLanguage) -> SessionRequest {
        SessionRequest::new(
            self.model.clone(),
            self.voice.clone(),
            build_instructions(mode, language),
        )
    }

    /// Issue a session credential.
    ///
    /// `mode` and `language` are raw, user-supplied values; unrecognised
    /// values fall back to `full` / `en` rather than failing.
    pub async fn issue(
        &self,
        mode: Option<&str>,
        language: Option<&str>,
    ) -> Result<IssuedSession, BrokerError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(BrokerError::MissingApiKey)?;

        let mode = InterviewMode::normalize(mode);
        let language = InterviewLanguage::normalize(language);
        let request = self.build_request(mode, language);

        tracing::debug!(
            "Requesting realtime session: model={}, tools={:?}",
            request.model,
            request.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        let response = self
            .http
            .post(format!("{}{}", self.base_url, SESSIONS_PATH))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("OpenAI-Beta", "realtime=v1")
            .json(&request)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::error!("Realtime /sessions error: {} {}", status.as_u16(), raw);
            return Err(BrokerError::Upstream {
                status: status.as_u16(),
                message: extract_upstream_message(&raw),
            });
        }

        let body: Value = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!("Realtime /sessions JSON parse error: {} - {}", e, raw);
            BrokerError::InvalidResponse(
                "Invalid JSON from upstream realtime/sessions".to_string(),
            )
        })?;

        let credential = SessionCredential::from_session_body(&body);
        let expires_at_ms = credential.as_ref().and_then(|c| c.expires_at_ms);
        let raw_exp = raw_expiry(&body);

        tracing::info!(
            "Ephemeral session created | mode: {} | language: {} | expires_at (raw): {}",
            mode,
            language,
            raw_exp.map(Value::to_string).unwrap_or_else(|| "null".to_string())
        );
        if raw_exp.is_some() && expires_at_ms.is_none() {
            tracing::warn!("Upstream expires_at could not be parsed: {:?}", raw_exp);
        }
        if credential.is_none() {
            tracing::warn!("Upstream session body carries no client secret");
        }

        Ok(IssuedSession {
            mode,
            language,
            body,
            credential,
        })
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// Order: `error.message`, then `error` itself, then the raw body.
pub fn extract_upstream_message(raw: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };

    match json.get("error") {
        Some(err) => match err.get("message").and_then(Value::as_str) {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => match err {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Null => raw.to_string(),
                Value::String(_) => raw.to_string(),
                other => other.to_string(),
            },
        },
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn broker_for(base_url: &str, api_key: Option<&str>) -> CredentialBroker {
        let mut config = ServerConfig::default();
        config.openai_base_url = base_url.to_string();
        config.openai_api_key = api_key.map(str::to_string);
        CredentialBroker::new(&config).unwrap()
    }

    #[test]
    fn test_extract_upstream_message() {
        assert_eq!(
            extract_upstream_message(r#"{"error":{"message":"Invalid key","type":"auth"}}"#),
            "Invalid key"
        );
        assert_eq!(
            extract_upstream_message(r#"{"error":"quota exceeded"}"#),
            "quota exceeded"
        );
        assert_eq!(
            extract_upstream_message(r#"{"error":{"code":"x"}}"#),
            r#"{"code":"x"}"#
        );
        assert_eq!(extract_upstream_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_upstream_message(r#"{"detail":"x"}"#), r#"{"detail":"x"}"#);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let broker = broker_for("http://127.0.0.1:9", None);
        let result = broker.issue(Some("case"), Some("de")).await;
        assert!(matches!(result, Err(BrokerError::MissingApiKey)));

        let broker = broker_for("http://127.0.0.1:9", Some(""));
        let result = broker.issue(None, None).await;
        assert!(matches!(result, Err(BrokerError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_issue_normalizes_and_passes_body_through() {
        let server = MockServer::start().await;
        let upstream_body = json!({
            "id": "sess_1",
            "client_secret": { "value": "ek_test", "expires_at": 1712000000 }
        });
        Mock::given(method("POST"))
            .and(path(SESSIONS_PATH))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("openai-beta", "realtime=v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(upstream_body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let broker = broker_for(&server.uri(), Some("sk-test"));
        let issued = broker.issue(Some("CASE"), Some("DE")).await.unwrap();

        assert_eq!(issued.mode, InterviewMode::Case);
        assert_eq!(issued.language, InterviewLanguage::De);
        assert_eq!(issued.body, upstream_body);
        let cred = issued.credential.unwrap();
        assert_eq!(cred.token, "ek_test");
        assert_eq!(cred.expires_at_ms, Some(1712000000000));

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let instructions = sent["instructions"].as_str().unwrap();
        assert!(instructions.contains("You MUST interview in German."));
        assert!(instructions.contains("Interview scope (mode): case."));
        assert_eq!(sent["voice"], "ash");
        assert_eq!(sent["tools"][0]["name"], "question_bank_get");
    }

    #[tokio::test]
    async fn test_upstream_error_message_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSIONS_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let broker = broker_for(&server.uri(), Some("sk-bad"));
        match broker.issue(None, None).await {
            Err(BrokerError::Upstream { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("Expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let broker = broker_for(&server.uri(), Some("sk-test"));
        match broker.issue(None, None).await {
            Err(BrokerError::InvalidResponse(msg)) => {
                assert!(msg.contains("Invalid JSON"));
            }
            other => panic!("Expected invalid response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_expiry_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_secret": { "value": "ek_test", "expires_at": "whenever" }
            })))
            .mount(&server)
            .await;

        let broker = broker_for(&server.uri(), Some("sk-test"));
        let issued = broker.issue(Some("full"), Some("en")).await.unwrap();
        assert_eq!(issued.credential.unwrap().expires_at_ms, None);
    }
}
