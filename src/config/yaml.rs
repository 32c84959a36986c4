use serde::Deserialize;
use std::path::Path;

use super::ServerConfig;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables can override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3002
///
/// synthesis:
///   default_provider: "charalign"
///   default_voice_id: "nova"
///   charalign_api_key: "your-vendor-key"
///   wordmark_api_key: "your-vendor-key"
///   wordmark_region: "westus"
///   timeout_seconds: 30
///
/// enhancement:
///   url: "https://enhance.example.com/v1/markup"
///
/// auth:
///   token: "shared-socket-token"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub enhancement: Option<EnhancementYaml>,
    pub auth: Option<AuthYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Synthesis backend configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub default_provider: Option<String>,
    pub default_voice_id: Option<String>,
    pub charalign_api_key: Option<String>,
    pub charalign_url: Option<String>,
    pub wordmark_api_key: Option<String>,
    pub wordmark_region: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Enhancement service configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EnhancementYaml {
    pub url: Option<String>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub token: Option<String>,
}

/// Load and parse a YAML configuration file
pub fn load_yaml_config(path: &Path) -> Result<YamlConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
    let config: YamlConfig = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))?;
    Ok(config)
}

/// Apply YAML values onto the configuration, leaving unset fields untouched
pub fn apply_yaml(config: &mut ServerConfig, yaml: &YamlConfig) {
    if let Some(server) = &yaml.server {
        if let Some(host) = &server.host {
            config.host = host.clone();
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(synthesis) = &yaml.synthesis {
        if let Some(provider) = &synthesis.default_provider {
            config.default_provider = provider.clone();
        }
        if synthesis.default_voice_id.is_some() {
            config.default_voice_id = synthesis.default_voice_id.clone();
        }
        if synthesis.charalign_api_key.is_some() {
            config.charalign_api_key = synthesis.charalign_api_key.clone();
        }
        if synthesis.charalign_url.is_some() {
            config.charalign_url = synthesis.charalign_url.clone();
        }
        if synthesis.wordmark_api_key.is_some() {
            config.wordmark_api_key = synthesis.wordmark_api_key.clone();
        }
        if synthesis.wordmark_region.is_some() {
            config.wordmark_region = synthesis.wordmark_region.clone();
        }
        if let Some(timeout) = synthesis.timeout_seconds {
            config.synthesis_timeout_seconds = timeout;
        }
    }

    if let Some(enhancement) = &yaml.enhancement {
        if enhancement.url.is_some() {
            config.enhancement_url = enhancement.url.clone();
        }
    }

    if let Some(auth) = &yaml.auth {
        if auth.token.is_some() {
            config.auth_token = auth.token.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  port: 9000
synthesis:
  default_provider: "wordmark"
  wordmark_region: "eastus"
"#;
        let parsed: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let mut config = ServerConfig::defaults();
        apply_yaml(&mut config, &parsed);

        assert_eq!(config.port, 9000);
        // Host untouched by partial YAML
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.default_provider, "wordmark");
        assert_eq!(config.wordmark_region.as_deref(), Some("eastus"));
    }

    #[test]
    fn test_empty_yaml_keeps_defaults() {
        let parsed: YamlConfig = serde_yaml::from_str("{}").unwrap();
        let mut config = ServerConfig::defaults();
        apply_yaml(&mut config, &parsed);
        assert_eq!(config.port, 3002);
        assert_eq!(config.default_provider, "charalign");
    }
}
