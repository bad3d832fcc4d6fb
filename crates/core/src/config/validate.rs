use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Checks what serde cannot: non-zero port, an http(s) WebUI URL, and sane
/// polling bounds.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let url = config.qbittorrent.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "qbittorrent.url must start with http:// or https:// (got {:?})",
            url
        )));
    }

    if config.qbittorrent.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "qbittorrent.timeout_secs cannot be 0".to_string(),
        ));
    }

    if !(250..=60_000).contains(&config.sync.poll_interval_ms) {
        return Err(ConfigError::ValidationError(format!(
            "sync.poll_interval_ms must be between 250 and 60000 (got {})",
            config.sync.poll_interval_ms
        )));
    }

    if config.sync.degraded_after_failures == 0 {
        return Err(ConfigError::ValidationError(
            "sync.degraded_after_failures must be at least 1".to_string(),
        ));
    }

    if config.sync.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "sync.event_buffer must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QBittorrentConfig, ServerConfig, SyncConfig};

    fn valid_config() -> Config {
        Config {
            server: ServerConfig::default(),
            qbittorrent: QBittorrentConfig {
                url: "http://localhost:8081".to_string(),
                username: "admin".to_string(),
                password: "adminadmin".to_string(),
                timeout_secs: 10,
            },
            sync: SyncConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_url_scheme() {
        let mut config = valid_config();
        config.qbittorrent.url = "localhost:8081".to_string();
        assert!(validate_config(&config).is_err());

        config.qbittorrent.url = "https://qb.example.org".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_poll_interval_bounds() {
        let mut config = valid_config();
        config.sync.poll_interval_ms = 100;
        assert!(validate_config(&config).is_err());

        config.sync.poll_interval_ms = 120_000;
        assert!(validate_config(&config).is_err());

        config.sync.poll_interval_ms = 1000;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_degraded_threshold() {
        let mut config = valid_config();
        config.sync.degraded_after_failures = 0;
        assert!(validate_config(&config).is_err());
    }
}
