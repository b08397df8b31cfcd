//! Configuration module for the interview relay
//!
//! Configuration comes from .env files, environment variables and an
//! optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use interview_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Relay listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::session::{DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE};
use crate::errors::AppError;

pub use yaml::YamlConfig;

/// Default upstream API root.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// TLS configuration for HTTPS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the relay:
/// - Server settings (host, port, TLS)
/// - Upstream realtime provider settings
/// - Question pool and static file locations
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream provider
    /// API key for minting session credentials. Checked per request, so the
    /// relay starts without one.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub upstream_timeout_seconds: u64,

    // Content
    pub question_bank_path: PathBuf,
    pub public_dir: PathBuf,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: "*"
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
            realtime_voice: DEFAULT_REALTIME_VOICE.to_string(),
            upstream_timeout_seconds: 15,
            question_bank_path: PathBuf::from("data/question-bank.json"),
            public_dir: PathBuf::from("public"),
            cors_allowed_origins: Some("*".to_string()),
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Missing variables fall back to defaults. The result is validated.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed,
    /// an environment variable has an invalid format, or validation fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs at startup, so it is already part of the
        // process environment here.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Rate limiting is off for very high limits.
    pub fn is_rate_limited(&self) -> bool {
        self.rate_limit_requests_per_second < 100_000
    }

    /// The upstream API key, or a configuration error when unset.
    pub fn openai_api_key(&self) -> Result<&str, AppError> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Configuration("OPENAI_API_KEY not set".to_string()))
    }
}
