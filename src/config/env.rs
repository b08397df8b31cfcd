use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};

/// Read a variable, treating empty values as unset.
pub(crate) fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable.
pub(crate) fn parse_env<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} value '{raw}': {e}")),
        None => Ok(None),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_env_bool(name: &str) -> Result<Option<bool>, String> {
    match env_var(name) {
        Some(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| format!("Invalid {name} value '{raw}': expected true or false")),
        None => Ok(None),
    }
}

/// Build a configuration from defaults overridden by environment variables.
///
/// `.env` files are loaded into the process environment by `main` before
/// this runs.
pub fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_env::<u16>("PORT")? {
        config.port = port;
    }

    if parse_env_bool("TLS_ENABLED")?.unwrap_or(false) {
        let cert_path = env_var("TLS_CERT_PATH")
            .ok_or("TLS_ENABLED is set but TLS_CERT_PATH is missing")?;
        let key_path =
            env_var("TLS_KEY_PATH").ok_or("TLS_ENABLED is set but TLS_KEY_PATH is missing")?;
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        });
    }

    config.openai_api_key = env_var("OPENAI_API_KEY");
    if let Some(base_url) = env_var("OPENAI_BASE_URL") {
        config.openai_base_url = base_url;
    }
    if let Some(model) = env_var("REALTIME_MODEL") {
        config.realtime_model = model;
    }
    if let Some(voice) = env_var("REALTIME_VOICE") {
        config.realtime_voice = voice;
    }
    if let Some(timeout) = parse_env::<u64>("UPSTREAM_TIMEOUT_SECONDS")? {
        config.upstream_timeout_seconds = timeout;
    }

    if let Some(path) = env_var("QUESTION_BANK_PATH") {
        config.question_bank_path = PathBuf::from(path);
    }
    if let Some(dir) = env_var("PUBLIC_DIR") {
        config.public_dir = PathBuf::from(dir);
    }

    if let Some(origins) = env_var("CORS_ALLOWED_ORIGINS") {
        config.cors_allowed_origins = Some(origins);
    }
    if let Some(rps) = parse_env::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = parse_env::<u32>("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 1 "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
