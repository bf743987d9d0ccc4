//! Configuration loading for runcell.
//!
//! Handles loading configuration from TOML files and the environment using
//! the config crate. Environment keys use the `RUNCELL` prefix with `__` as
//! the section separator, e.g. `RUNCELL__LIMITS__MAX_STDOUT_BYTES`.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError};

const ENV_PREFIX: &str = "RUNCELL";

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from a file, with environment overrides applied
    /// on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(env_source())
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment alone.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(super::EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;

        if limits.default_time_limit <= 0.0 || limits.max_time_limit <= 0.0 {
            return Err(ConfigError::Invalid(
                "time limits must be positive".to_string(),
            ));
        }
        if limits.default_time_limit > limits.max_time_limit {
            return Err(ConfigError::Invalid(format!(
                "default_time_limit {} exceeds max_time_limit {}",
                limits.default_time_limit, limits.max_time_limit
            )));
        }
        if limits.default_memory_mb == 0 || limits.default_memory_mb > limits.max_memory_mb {
            return Err(ConfigError::Invalid(format!(
                "default_memory_mb {} must be in (0, {}]",
                limits.default_memory_mb, limits.max_memory_mb
            )));
        }
        if limits.default_processes == 0 || limits.default_processes > limits.max_processes {
            return Err(ConfigError::Invalid(format!(
                "default_processes {} must be in [1, {}]",
                limits.default_processes, limits.max_processes
            )));
        }
        if limits.max_files == 0
            || limits.max_file_bytes == 0
            || limits.max_total_bytes == 0
            || limits.max_stdout_bytes == 0
            || limits.max_stderr_bytes == 0
        {
            return Err(ConfigError::Invalid(
                "file and output ceilings must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
