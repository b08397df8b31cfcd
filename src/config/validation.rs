use url::Url;

use super::{ServerConfig, TlsConfig};

pub fn validate_port(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    if port == 0 {
        return Err("PORT must be non-zero".into());
    }
    Ok(())
}

/// TLS needs both files to exist.
pub fn validate_tls(tls: &Option<TlsConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(tls) = tls else {
        return Ok(());
    };
    if !tls.cert_path.exists() {
        return Err(format!(
            "TLS certificate file not found: {}",
            tls.cert_path.display()
        )
        .into());
    }
    if !tls.key_path.exists() {
        return Err(format!("TLS key file not found: {}", tls.key_path.display()).into());
    }
    Ok(())
}

pub fn validate_base_url(base_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url =
        Url::parse(base_url).map_err(|e| format!("Invalid OPENAI_BASE_URL '{base_url}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "Invalid OPENAI_BASE_URL '{base_url}': scheme must be http or https"
        )
        .into());
    }
    Ok(())
}

pub fn validate_upstream_timeout(seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    if seconds == 0 {
        return Err("UPSTREAM_TIMEOUT_SECONDS must be greater than 0".into());
    }
    Ok(())
}

/// Run every check against a merged configuration.
pub fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_port(config.port)?;
    validate_tls(&config.tls)?;
    validate_base_url(&config.openai_base_url)?;
    validate_upstream_timeout(config.upstream_timeout_seconds)?;
    Ok(())
}
