use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("CORRAL_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.orchestrator.workers, 4);
        assert_eq!(config.scheduler.submit_command, "condor_submit");
        assert_eq!(config.scheduler.poll_interval_ms, 10_000);
        assert!(config.executables.rls.is_none());
    }

    #[test]
    fn test_load_config_from_str_sections() {
        let toml = r#"
[orchestrator]
workers = 2
working_directory = "/var/lib/corral"

[scheduler]
condor_config = "/etc/condor/condor_config"
poll_interval_ms = 250

[executables]
install = "/opt/corral/install"
mapper = "/opt/corral/mapper"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.orchestrator.workers, 2);
        assert_eq!(
            config.orchestrator.working_directory.to_str(),
            Some("/var/lib/corral")
        );
        assert_eq!(config.scheduler.poll_interval_ms, 250);
        assert_eq!(config.executables.install, "/opt/corral/install");
        assert_eq!(config.executables.mapper.as_deref(), Some("/opt/corral/mapper"));
        assert_eq!(config.executables.start, "share/corral/glidein_start");
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[orchestrator]
workers = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
port = 9440

[database]
path = "/tmp/corral-test.db"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 9440);
        assert_eq!(config.database.path.to_str(), Some("/tmp/corral-test.db"));
        assert_eq!(config.database.history_buffer, 1000);
    }
}
