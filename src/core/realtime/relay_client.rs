//! HTTP client for the relay's `/session` and `/tool/question` endpoints.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::base::{CredentialSource, QuestionTool, RealtimeError, RealtimeResult};
use super::scheduler::now_ms;
use super::settings::InterviewSettings;
use crate::core::questions::{QuestionCategory, QuestionRecord};
use crate::core::session::SessionCredential;
use crate::core::session::expiry::raw_expiry;

/// Default timeout for relay requests.
const RELAY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
    settings: InterviewSettings,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`.
    pub fn new(base_url: &str, settings: InterviewSettings) -> RealtimeResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("relay url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "relay url must be http(s), got {}",
                base_url.scheme()
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            settings,
        })
    }

    pub fn settings(&self) -> &InterviewSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> RealtimeResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))
    }

    /// Fetch a session credential for the configured language and mode.
    pub async fn fetch_session(&self) -> RealtimeResult<SessionCredential> {
        let mut url = self.endpoint("session")?;
        url.query_pairs_mut()
            .append_pair("language", self.settings.language.as_str())
            .append_pair("mode", self.settings.mode.as_str());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(RealtimeError::Credential(message));
        }

        let Some(credential) = SessionCredential::from_session_body(&data) else {
            tracing::error!("Session response without client secret: {}", data);
            return Err(RealtimeError::Credential(
                "No client secret in /session".to_string(),
            ));
        };

        tracing::info!(
            "Session created with settings: language={}, mode={}",
            self.settings.language,
            self.settings.mode
        );
        match (raw_expiry(&data), credential.expires_at_ms) {
            (Some(raw), None) => tracing::warn!("expires_at could not be parsed: {}", raw),
            (_, Some(ms)) => tracing::info!(
                "expires_at (ms): {} -> in {}s",
                ms,
                (ms - now_ms()).max(0) / 1000
            ),
            (None, None) => {}
        }
        Ok(credential)
    }

    /// Fetch one question of `category`.
    pub async fn question(&self, category: QuestionCategory) -> RealtimeResult<QuestionRecord> {
        let mut url = self.endpoint("tool/question")?;
        url.query_pairs_mut().append_pair("qtype", category.as_str());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let data: Value = response.json().await.unwrap_or(Value::Null);
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(RealtimeError::ProviderError(message));
        }

        response
            .json::<QuestionRecord>()
            .await
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))
    }
}

#[async_trait]
impl CredentialSource for RelayClient {
    async fn fetch_credential(&self) -> RealtimeResult<SessionCredential> {
        self.fetch_session().await
    }
}

#[async_trait]
impl QuestionTool for RelayClient {
    async fn get_question(&self, category: QuestionCategory) -> RealtimeResult<QuestionRecord> {
        self.question(category).await
    }
}
