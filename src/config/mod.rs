pub(crate) mod duration;
pub mod polling;
mod raw;
pub mod variables;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_debug::Dbg;
use thiserror::Error;
use tracing::{debug, instrument};

use self::polling::PollingConfig;
use self::raw::RawConfig;
use self::variables::VariableStore;
use crate::retry::RetryConfig;

pub use self::raw::ConfigParseError;

/// Process-wide settings, loaded once at startup and passed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: DeploymentMode,
    pub namespace: String,
    pub driver_container: String,
    pub log_tail_lines: i64,
    pub object_store: Option<ObjectStoreConfig>,
    pub registry: Option<RegistryConfig>,
    pub spark: SparkSettings,
    pub polling: PollingConfig,
    pub connect_retry: RetryConfig,
}

/// Identifier of the environment (`dev`, `prod`, ...) sharing the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentMode(String);

impl DeploymentMode {
    pub const DEV: &'static str = "dev";

    pub fn new(mode: impl Into<String>) -> Result<Self, ConfigParseError> {
        let mode = mode.into();
        let valid = !mode.is_empty()
            && !mode.starts_with('-')
            && !mode.ends_with('-')
            && mode
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid {
            Ok(Self(mode))
        } else {
            Err(ConfigParseError::InvalidMode(mode))
        }
    }

    pub fn is_dev(&self) -> bool {
        self.0 == Self::DEV
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Dbg, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    #[dbg(placeholder = "***")]
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub url: String,
    pub repository: String,
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
}

/// Cluster-wide Spark settings merged into every application's `sparkConf`.
#[derive(Debug, Clone, Default)]
pub struct SparkSettings {
    pub s3: Option<S3aSettings>,
    pub hive_metastore: Option<HiveMetastoreSettings>,
    pub conf: BTreeMap<String, String>,
}

#[derive(Dbg, Clone)]
pub struct S3aSettings {
    pub endpoint: String,
    pub access_key: String,
    #[dbg(placeholder = "***")]
    pub secret_key: String,
}

#[derive(Dbg, Clone)]
pub struct HiveMetastoreSettings {
    pub url: String,
    pub user: String,
    #[dbg(placeholder = "***")]
    pub password: String,
}

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] ConfigParseError),
}

impl Config {
    #[instrument("config/load", skip(variables))]
    pub async fn new_from_file(
        path: &Path,
        variables: &dyn VariableStore,
    ) -> Result<Self, ConfigFileError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigFileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml(&text, variables)?;
        debug!(?config, "Config parsed.");
        Ok(config)
    }

    pub fn from_yaml(text: &str, variables: &dyn VariableStore) -> Result<Self, ConfigFileError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        Ok(raw.resolve(variables)?)
    }
}

#[cfg(test)]
impl Config {
    /// Minimal configuration for unit tests: `prod` mode, no external stores.
    pub(crate) fn for_tests() -> Self {
        Self::from_yaml("mode: prod", &BTreeMap::<String, String>::new()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_config_new_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: prod\nnamespace: batch").unwrap();

        let config = Config::new_from_file(file.path(), &BTreeMap::<String, String>::new())
            .await
            .unwrap();

        assert_eq!(config.mode.as_str(), "prod");
        assert_eq!(config.namespace, "batch");
    }

    #[tokio::test]
    async fn test_config_missing_file() {
        let err = Config::new_from_file(Path::new("/nonexistent/sparkjob.yaml"), &BTreeMap::<String, String>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
    }

    #[test]
    fn test_secrets_hidden_from_debug() {
        let settings = S3aSettings {
            endpoint: "http://s3".to_string(),
            access_key: "id".to_string(),
            secret_key: "hunter2".to_string(),
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_deployment_mode() {
        assert!(DeploymentMode::new("dev").unwrap().is_dev());
        assert!(!DeploymentMode::new("prod").unwrap().is_dev());
        assert!(DeploymentMode::new("").is_err());
        assert!(DeploymentMode::new("-prod").is_err());
    }
}
