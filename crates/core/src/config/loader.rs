use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::EngineConfig, ConfigError};

/// Environment variable prefix for overrides, e.g. `ROWBATCH_EXECUTION__MAX_CONCURRENCY`.
pub const ENV_PREFIX: &str = "ROWBATCH_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: EngineConfig = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<EngineConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[execution]
max_concurrency = 2

[retry]
max_retries = 5
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.execution.max_concurrency, 2);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff_base_ms, 1000);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[execution]
max_concurrency = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/rowbatch.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "rowbatch.toml",
                r#"
[storage]
artifact_root = "/data/runs"

[execution]
max_concurrency = 2
"#,
            )?;
            jail.set_env("ROWBATCH_EXECUTION__MAX_CONCURRENCY", "8");

            let config = load_config(Path::new("rowbatch.toml")).unwrap();
            assert_eq!(config.execution.max_concurrency, 8);
            assert_eq!(config.storage.artifact_root.to_str().unwrap(), "/data/runs");
            Ok(())
        });
    }
}
