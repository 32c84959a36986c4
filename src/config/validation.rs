use super::ServerConfig;

/// Backend names a request or the configuration may select
pub const KNOWN_PROVIDERS: &[&str] = &["charalign", "wordmark"];

/// Validate the merged configuration
///
/// Checks that the default provider names a known backend and that the
/// synthesis deadline is usable. Vendor credentials are deliberately not
/// required here: a relay used only with one backend needs only that
/// backend's key, and tests run with stub endpoints.
pub fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !KNOWN_PROVIDERS.contains(&config.default_provider.as_str()) {
        return Err(format!(
            "Unknown DEFAULT_PROVIDER '{}', expected one of: {}",
            config.default_provider,
            KNOWN_PROVIDERS.join(", ")
        )
        .into());
    }

    if config.synthesis_timeout_seconds == 0 {
        return Err("SYNTHESIS_TIMEOUT_SECONDS must be greater than zero".into());
    }

    if let Some(token) = &config.auth_token {
        if token.trim().is_empty() {
            return Err("AUTH_TOKEN must not be blank when set".into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        let config = ServerConfig::defaults();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let config = ServerConfig {
            default_provider: "polyphone".to_string(),
            ..ServerConfig::defaults()
        };
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("polyphone"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ServerConfig {
            synthesis_timeout_seconds: 0,
            ..ServerConfig::defaults()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_blank_token() {
        let config = ServerConfig {
            auth_token: Some("   ".to_string()),
            ..ServerConfig::defaults()
        };
        assert!(validate(&config).is_err());
    }
}
