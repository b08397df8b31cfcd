use std::path::PathBuf;

use super::env::load_from_env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Merge environment configuration (base) with YAML overrides.
pub fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    // Paths may come from YAML or fall back to the env values.
                    let cert_path = tls
                        .cert_path
                        .map(PathBuf::from)
                        .or_else(|| config.tls.as_ref().map(|t| t.cert_path.clone()))
                        .ok_or("server.tls.enabled requires cert_path")?;
                    let key_path = tls
                        .key_path
                        .map(PathBuf::from)
                        .or_else(|| config.tls.as_ref().map(|t| t.key_path.clone()))
                        .ok_or("server.tls.enabled requires key_path")?;
                    config.tls = Some(TlsConfig {
                        cert_path,
                        key_path,
                    });
                }
                None => {}
            }
        }
    }

    if let Some(upstream) = yaml.upstream {
        if upstream.openai_api_key.is_some() {
            config.openai_api_key = upstream.openai_api_key;
        }
        if let Some(base_url) = upstream.base_url {
            config.openai_base_url = base_url;
        }
        if let Some(model) = upstream.model {
            config.realtime_model = model;
        }
        if let Some(voice) = upstream.voice {
            config.realtime_voice = voice;
        }
        if let Some(timeout) = upstream.timeout_seconds {
            config.upstream_timeout_seconds = timeout;
        }
    }

    if let Some(path) = yaml.questions.and_then(|q| q.path) {
        config.question_bank_path = PathBuf::from(path);
    }
    if let Some(dir) = yaml.static_files.and_then(|s| s.public_dir) {
        config.public_dir = PathBuf::from(dir);
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
    }

    Ok(config)
}
