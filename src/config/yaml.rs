use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     enabled: true
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// upstream:
///   openai_api_key: "sk-..."
///   base_url: "https://api.openai.com"
///   model: "gpt-4o-mini-realtime-preview"
///   voice: "ash"
///   timeout_seconds: 15
///
/// questions:
///   path: "data/question-bank.json"
///
/// static:
///   public_dir: "public"
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub questions: Option<QuestionsYaml>,
    #[serde(rename = "static")]
    pub static_files: Option<StaticYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Upstream realtime provider settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    pub openai_api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QuestionsYaml {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StaticYaml {
    pub public_dir: Option<String>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  tls:
    enabled: true
    cert_path: "/tmp/cert.pem"
    key_path: "/tmp/key.pem"

upstream:
  openai_api_key: "sk-yaml"
  base_url: "http://localhost:9999"
  model: "gpt-4o-realtime-preview"
  voice: "verse"
  timeout_seconds: 5

questions:
  path: "/srv/questions.json"

static:
  public_dir: "/srv/public"

security:
  cors_allowed_origins: "https://app.example.com"
  rate_limit_requests_per_second: 20
  rate_limit_burst_size: 5
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.tls.as_ref().unwrap().enabled, Some(true));

        let upstream = config.upstream.as_ref().unwrap();
        assert_eq!(upstream.openai_api_key, Some("sk-yaml".to_string()));
        assert_eq!(upstream.voice, Some("verse".to_string()));
        assert_eq!(upstream.timeout_seconds, Some(5));

        assert_eq!(
            config.questions.as_ref().unwrap().path,
            Some("/srv/questions.json".to_string())
        );
        assert_eq!(
            config.static_files.as_ref().unwrap().public_dir,
            Some("/srv/public".to_string())
        );
        assert_eq!(
            config.security.as_ref().unwrap().rate_limit_burst_size,
            Some(5)
        );
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
server:
  port: 9000

upstream:
  voice: "alloy"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.server.as_ref().unwrap().host.is_none());
        assert_eq!(config.server.as_ref().unwrap().port, Some(9000));
        assert!(config.upstream.as_ref().unwrap().openai_api_key.is_none());
        assert!(config.questions.is_none());
        assert!(config.security.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.server.is_none());
        assert!(config.upstream.is_none());
        assert!(config.questions.is_none());
        assert!(config.static_files.is_none());
        assert!(config.security.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "server:\n  host: \"localhost\"\n  port: 3000\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();

        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert_eq!(config.server.as_ref().unwrap().port, Some(3000));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
