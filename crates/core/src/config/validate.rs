use super::{types::EngineConfig, ConfigError};

/// Validate configuration.
///
/// Serde enforces types; this checks the ranges the engine relies on.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.execution.max_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "execution.max_concurrency must be at least 1".to_string(),
        ));
    }

    if config.execution.job_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "execution.job_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.retry.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_retries must be at least 1".to_string(),
        ));
    }

    if config.retry.backoff_base_ms > config.retry.max_backoff_ms {
        return Err(ConfigError::ValidationError(format!(
            "retry.backoff_base_ms ({}) exceeds retry.max_backoff_ms ({})",
            config.retry.backoff_base_ms, config.retry.max_backoff_ms
        )));
    }

    if config.csv.max_file_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "csv.max_file_size_bytes cannot be 0".to_string(),
        ));
    }

    if config.csv.allowed_extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "csv.allowed_extensions cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = EngineConfig::default();
        config.execution.max_concurrency = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_retries_fails() {
        let mut config = EngineConfig::default();
        config.retry.max_retries = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_backoff_base_above_ceiling_fails() {
        let mut config = EngineConfig::default();
        config.retry.backoff_base_ms = 10_000;
        config.retry.max_backoff_ms = 500;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("backoff_base_ms"));
    }

    #[test]
    fn test_validate_empty_extensions_fails() {
        let mut config = EngineConfig::default();
        config.csv.allowed_extensions.clear();
        assert!(validate_config(&config).is_err());
    }
}
