use std::env;

use super::ServerConfig;

/// Apply environment variable overrides onto the configuration
///
/// Environment variables always win over YAML and defaults. Unset variables
/// leave the existing value untouched.
///
/// # Errors
/// Returns an error if a numeric variable is present but malformed.
pub fn apply_env_overrides(config: &mut ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(host) = env::var("HOST") {
        config.host = host;
    }
    if let Ok(port) = env::var("PORT") {
        config.port = port
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;
    }

    if let Ok(provider) = env::var("DEFAULT_PROVIDER") {
        config.default_provider = provider;
    }
    if let Ok(voice) = env::var("DEFAULT_VOICE_ID") {
        config.default_voice_id = Some(voice);
    }
    if let Ok(key) = env::var("CHARALIGN_API_KEY") {
        config.charalign_api_key = Some(key);
    }
    if let Ok(url) = env::var("CHARALIGN_URL") {
        config.charalign_url = Some(url);
    }
    if let Ok(key) = env::var("WORDMARK_API_KEY") {
        config.wordmark_api_key = Some(key);
    }
    if let Ok(region) = env::var("WORDMARK_REGION") {
        config.wordmark_region = Some(region);
    }
    if let Ok(timeout) = env::var("SYNTHESIS_TIMEOUT_SECONDS") {
        config.synthesis_timeout_seconds = timeout
            .parse::<u64>()
            .map_err(|e| format!("Invalid synthesis timeout: {e}"))?;
    }

    if let Ok(url) = env::var("ENHANCEMENT_URL") {
        config.enhancement_url = Some(url);
    }

    if let Ok(token) = env::var("AUTH_TOKEN") {
        config.auth_token = Some(token);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Helper to clean up environment variables after tests
    fn cleanup_env_vars() {
        for var in [
            "HOST",
            "PORT",
            "DEFAULT_PROVIDER",
            "DEFAULT_VOICE_ID",
            "CHARALIGN_API_KEY",
            "CHARALIGN_URL",
            "WORDMARK_API_KEY",
            "WORDMARK_REGION",
            "SYNTHESIS_TIMEOUT_SECONDS",
            "ENHANCEMENT_URL",
            "AUTH_TOKEN",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_unset_vars_leave_config_untouched() {
        cleanup_env_vars();

        let mut config = ServerConfig::defaults();
        apply_env_overrides(&mut config).expect("Should apply overrides");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3002);
        assert!(config.auth_token.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_env_overrides_win() {
        cleanup_env_vars();
        env::set_var("HOST", "127.0.0.1");
        env::set_var("PORT", "9100");
        env::set_var("DEFAULT_PROVIDER", "wordmark");
        env::set_var("WORDMARK_REGION", "eastus");
        env::set_var("AUTH_TOKEN", "sesame");

        let mut config = ServerConfig::defaults();
        apply_env_overrides(&mut config).expect("Should apply overrides");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.default_provider, "wordmark");
        assert_eq!(config.wordmark_region.as_deref(), Some("eastus"));
        assert_eq!(config.auth_token.as_deref(), Some("sesame"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_malformed_port_is_rejected() {
        cleanup_env_vars();
        env::set_var("PORT", "not-a-port");

        let mut config = ServerConfig::defaults();
        assert!(apply_env_overrides(&mut config).is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_env_beats_yaml_values() {
        cleanup_env_vars();
        env::set_var("SYNTHESIS_TIMEOUT_SECONDS", "5");

        // Simulate a YAML-loaded value being overridden
        let mut config = ServerConfig {
            synthesis_timeout_seconds: 60,
            ..ServerConfig::defaults()
        };
        apply_env_overrides(&mut config).expect("Should apply overrides");
        assert_eq!(config.synthesis_timeout_seconds, 5);

        cleanup_env_vars();
    }
}
