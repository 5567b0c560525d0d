use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.database.history_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "database.history_buffer must be at least 1".to_string(),
        ));
    }

    if config.orchestrator.workers == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.workers must be at least 1".to_string(),
        ));
    }

    if config.scheduler.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    for (name, value) in [
        ("scheduler.submit_command", &config.scheduler.submit_command),
        ("scheduler.cancel_command", &config.scheduler.cancel_command),
        ("executables.install", &config.executables.install),
        ("executables.uninstall", &config.executables.uninstall),
        ("executables.start", &config.executables.start),
        ("executables.run", &config.executables.run),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        tokio_test::assert_ok!(validate_config(&Config::default()));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.orchestrator.workers = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        tokio_test::assert_err!(validate_config(&config));
    }

    #[test]
    fn test_validate_zero_history_buffer_fails() {
        let mut config = Config::default();
        config.database.history_buffer = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("database.history_buffer"));
    }

    #[test]
    fn test_validate_empty_executable_fails() {
        let mut config = Config::default();
        config.executables.start = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("executables.start"));
    }
}
