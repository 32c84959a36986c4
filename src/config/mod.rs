//! Configuration module for the Lectern voice server
//!
//! This module handles server configuration from various sources: YAML files and
//! environment variables. Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use lectern::config::ServerConfig;
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
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

mod env;
mod validation;
mod yaml;

pub use validation::validate;

/// Server configuration
///
/// Contains all configuration needed to run the Lectern voice relay:
/// - Server settings (host, port)
/// - Synthesis backend credentials and defaults
/// - Text-enhancement service endpoint
/// - Socket authentication token
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Synthesis backend selection and credentials
    /// Default backend used when a request does not name one ("charalign" or "wordmark")
    pub default_provider: String,
    pub default_voice_id: Option<String>,
    pub charalign_api_key: Option<String>,
    /// Override for the character-timestamp vendor endpoint (tests point this at a stub)
    pub charalign_url: Option<String>,
    pub wordmark_api_key: Option<String>,
    pub wordmark_region: Option<String>,

    // Semantic markup enhancement service (optional)
    pub enhancement_url: Option<String>,

    // Socket authentication (optional; when unset every upgrade is accepted)
    pub auth_token: Option<String>,

    // Per-chunk synthesis deadline
    pub synthesis_timeout_seconds: u64,
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::load_yaml_config(path)?;
        let mut config = Self::defaults();
        yaml::apply_yaml(&mut config, &yaml_config);
        env::apply_env_overrides(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut config = Self::defaults();
        env::apply_env_overrides(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Baseline configuration before any file or environment values are applied
    pub fn defaults() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
            default_provider: "charalign".to_string(),
            default_voice_id: None,
            charalign_api_key: None,
            charalign_url: None,
            wordmark_api_key: None,
            wordmark_region: None,
            enhancement_url: None,
            auth_token: None,
            synthesis_timeout_seconds: 30,
        }
    }

    /// Socket address string for binding the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
