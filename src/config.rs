//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::mapping::{EntityMapping, MappingResolver};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Member mappings of the queryable entities
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
}

/// Where translated queries read from
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_org")]
    pub org: String,
}

fn default_bucket() -> String {
    "my-bucket".to_string()
}

fn default_org() -> String {
    "my-org".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            org: default_org(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config file locations, in search order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("fluxlinq").join("config.toml")),
            Some(PathBuf::from("/etc/fluxlinq/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from default locations or environment
    ///
    /// Logs which file was used, so call it after the subscriber is
    /// installed; [`Config::discover`] is the silent variant.
    pub fn load_default() -> Self {
        let (config, loaded_from, skipped) = Self::discover();
        for error in &skipped {
            tracing::warn!("Skipped config file: {}", error);
        }
        match loaded_from {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
        config
    }

    /// Load the first readable default location without logging.
    ///
    /// Returns the config, the file it came from (if any) and the errors of
    /// the files that were found but could not be loaded.
    pub fn discover() -> (Self, Option<PathBuf>, Vec<ConfigError>) {
        let mut skipped = Vec::new();
        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
                    Ok(config) => return (config, Some(path), skipped),
                    Err(e) => skipped.push(e),
                }
            }
        }
        (Self::from_env(), None, skipped)
    }

    /// Mapping declared for an entity
    pub fn entity(&self, name: &str) -> Option<&EntityMapping> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Member resolver for an entity; undeclared entities map every member
    /// to a field
    pub fn resolver_for(&self, name: &str) -> MappingResolver {
        let mapping = self
            .entity(name)
            .cloned()
            .unwrap_or_else(|| EntityMapping::new(name));
        MappingResolver::new(mapping)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(bucket) = std::env::var("FLUXLINQ_BUCKET") {
            self.source.bucket = bucket;
        }
        if let Ok(org) = std::env::var("FLUXLINQ_ORG") {
            self.source.org = org;
        }

        if let Ok(level) = std::env::var("FLUXLINQ_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FLUXLINQ_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# fluxlinq Configuration
#
# Environment variables override these settings:
# - FLUXLINQ_BUCKET
# - FLUXLINQ_ORG
# - FLUXLINQ_LOG_LEVEL
# - FLUXLINQ_LOG_FORMAT

[source]
# Bucket queries read from
bucket = "my-bucket"

# Organization queries run under
org = "my-org"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/fluxlinq/fluxlinq.log"

# Entity mappings. Members without a declaration are fields named after
# the member.
[[entities]]
name = "sensor"

[entities.members.timestamp]
kind = "timestamp"

[entities.members.sensor_type]
kind = "measurement"

[entities.members.device_id]
kind = "tag"
column = "deviceId"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MemberKind, MemberResolver};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.source.bucket, "my-bucket");
        assert_eq!(config.logging.format, "pretty");

        let sensor = config.entity("sensor").unwrap();
        assert_eq!(sensor.members["device_id"].column.as_deref(), Some("deviceId"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [source]
            bucket = "telemetry"

            [[entities]]
            name = "reading"
            [entities.members.host]
            kind = "tag"
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.source.bucket, "telemetry");
        assert_eq!(config.source.org, "my-org");
        assert_eq!(config.logging.level, "info");

        let resolver = config.resolver_for("reading");
        assert_eq!(resolver.resolve_member_kind("host"), MemberKind::Tag);
        assert_eq!(resolver.resolve_member_kind("value"), MemberKind::Field);
    }

    #[test]
    fn test_unknown_entity_resolves_fields() {
        let resolver = Config::default().resolver_for("unknown");
        assert_eq!(resolver.resolve_member_kind("anything"), MemberKind::Field);
        assert_eq!(resolver.column_name("anything"), "anything");
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/fluxlinq.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[source\nbucket = 1").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_default_paths_end_with_working_directory() {
        let paths = Config::default_paths();
        assert_eq!(paths.last(), Some(&PathBuf::from("./config.toml")));
        assert!(paths.contains(&PathBuf::from("/etc/fluxlinq/config.toml")));
    }

    #[test]
    fn test_env_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[source]\nbucket = \"from-file\"").unwrap();

        std::env::set_var("FLUXLINQ_ORG", "from-env");
        let config = Config::load_with_env(file.path()).unwrap();
        std::env::remove_var("FLUXLINQ_ORG");

        assert_eq!(config.source.org, "from-env");
    }
}
