use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::duration::deserialize_duration;
use super::polling::PollingConfig;
use super::variables::{RawSecret, VariableStore};
use super::{
    Config, DeploymentMode, HiveMetastoreSettings, ObjectStoreConfig, RegistryConfig,
    S3aSettings, SparkSettings,
};
use crate::kubernetes_objects::{DEFAULT_NAMESPACE, DRIVER_CONTAINER_NAME};
use crate::retry::RetryConfig;

/// Variable consulted for the deployment mode when the file does not set one.
pub(super) const MODE_VARIABLE: &str = "MODE";

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(super) struct RawConfig {
    /// Deployment mode, appended to every SparkApplication name
    pub(super) mode: Option<String>,

    pub(super) namespace: Option<String>,

    #[serde(default)]
    pub(super) cluster: RawCluster,

    pub(super) object_store: Option<RawObjectStore>,

    pub(super) registry: Option<RawRegistry>,

    #[serde(default)]
    pub(super) spark: RawSpark,

    #[serde(default)]
    pub(super) polling: PollingConfig,

    #[serde(default)]
    pub(super) connect_retry: RetryConfig,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct RawCluster {
    /// Container of the driver pod whose logs are surfaced while polling
    pub(super) driver_container: Option<String>,

    pub(super) log_tail_lines: Option<i64>,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(super) struct RawObjectStore {
    pub(super) endpoint: RawSecret,
    #[serde(default = "default_region")]
    pub(super) region: String,
    pub(super) access_key_id: RawSecret,
    pub(super) secret_access_key: RawSecret,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(super) struct RawRegistry {
    /// Search endpoint, e.g. "https://nexus.example.com/service/rest/v1/search"
    pub(super) url: String,
    #[serde(default = "default_repository")]
    pub(super) repository: String,
    /// PEM bundle of the CA that signed the registry certificate
    pub(super) ca_cert: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_duration", default = "default_timeout")]
    pub(super) timeout: Duration,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct RawSpark {
    pub(super) s3: Option<RawS3a>,
    pub(super) hive_metastore: Option<RawHiveMetastore>,
    #[serde(default)]
    pub(super) conf: BTreeMap<String, String>,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(super) struct RawS3a {
    pub(super) endpoint: RawSecret,
    pub(super) access_key: RawSecret,
    pub(super) secret_key: RawSecret,
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(super) struct RawHiveMetastore {
    pub(super) url: RawSecret,
    pub(super) user: RawSecret,
    pub(super) password: RawSecret,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_repository() -> String {
    "docker-private".to_string()
}
const fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

#[derive(Error, Debug)]
pub enum ConfigParseError {
    #[error("Field '{field}' references variable '{key}', which is not set")]
    UnresolvedVariable { field: String, key: String },

    #[error(
        "Deployment mode '{0}' is invalid: it must be a non-empty lowercase DNS label (a-z, 0-9, '-')"
    )]
    InvalidMode(String),

    #[error("cluster.log_tail_lines must be positive, got {0}")]
    InvalidLogTailLines(i64),
}

impl RawConfig {
    pub(super) fn resolve(self, variables: &dyn VariableStore) -> Result<Config, ConfigParseError> {
        let mode = match self.mode {
            Some(mode) => mode,
            None => variables
                .get(MODE_VARIABLE)
                .unwrap_or_else(|| DeploymentMode::DEV.to_string()),
        };
        let mode = DeploymentMode::new(mode)?;

        let log_tail_lines = self.cluster.log_tail_lines.unwrap_or(20);
        if log_tail_lines <= 0 {
            return Err(ConfigParseError::InvalidLogTailLines(log_tail_lines));
        }

        let object_store = self
            .object_store
            .map(|raw| {
                Ok::<_, ConfigParseError>(ObjectStoreConfig {
                    endpoint: raw.endpoint.resolve("object_store.endpoint", variables)?,
                    region: raw.region,
                    access_key_id: raw
                        .access_key_id
                        .resolve("object_store.access_key_id", variables)?,
                    secret_access_key: raw
                        .secret_access_key
                        .resolve("object_store.secret_access_key", variables)?,
                })
            })
            .transpose()?;

        let registry = self.registry.map(|raw| RegistryConfig {
            url: raw.url,
            repository: raw.repository,
            ca_cert: raw.ca_cert,
            timeout: raw.timeout,
        });

        let s3 = self
            .spark
            .s3
            .map(|raw| {
                Ok::<_, ConfigParseError>(S3aSettings {
                    endpoint: raw.endpoint.resolve("spark.s3.endpoint", variables)?,
                    access_key: raw.access_key.resolve("spark.s3.access_key", variables)?,
                    secret_key: raw.secret_key.resolve("spark.s3.secret_key", variables)?,
                })
            })
            .transpose()?;

        let hive_metastore = self
            .spark
            .hive_metastore
            .map(|raw| {
                Ok::<_, ConfigParseError>(HiveMetastoreSettings {
                    url: raw.url.resolve("spark.hive_metastore.url", variables)?,
                    user: raw.user.resolve("spark.hive_metastore.user", variables)?,
                    password: raw
                        .password
                        .resolve("spark.hive_metastore.password", variables)?,
                })
            })
            .transpose()?;

        Ok(Config {
            mode,
            namespace: self
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            driver_container: self
                .cluster
                .driver_container
                .unwrap_or_else(|| DRIVER_CONTAINER_NAME.to_string()),
            log_tail_lines,
            object_store,
            registry,
            spark: SparkSettings {
                s3,
                hive_metastore,
                conf: self.spark.conf,
            },
            polling: self.polling,
            connect_retry: self.connect_retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_resolves() {
        let yaml = r#"
          mode: prod
          namespace: spark-jobs
          cluster:
            log_tail_lines: 5
          object_store:
            endpoint: https://storage.example.net
            access_key_id: { from_env: AWS_ACCESS_KEY_ID }
            secret_access_key: { from_env: AWS_SECRET_ACCESS_KEY }
          registry:
            url: https://nexus.example.net/service/rest/v1/search
          spark:
            s3:
              endpoint: https://storage.example.net
              access_key: { from_env: AWS_ACCESS_KEY_ID }
              secret_key: { from_env: AWS_SECRET_ACCESS_KEY }
            conf:
              spark.sql.shuffle.partitions: "64"
          polling:
            poll_interval: 3s
        "#;
        let vars = BTreeMap::from([
            ("AWS_ACCESS_KEY_ID".to_string(), "id".to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), "secret".to_string()),
        ]);

        let raw: RawConfig = serde_yaml::from_str(yaml).unwrap();
        let config = raw.resolve(&vars).unwrap();

        assert_eq!(config.mode.as_str(), "prod");
        assert_eq!(config.namespace, "spark-jobs");
        assert_eq!(config.driver_container, DRIVER_CONTAINER_NAME);
        assert_eq!(config.log_tail_lines, 5);
        let store = config.object_store.unwrap();
        assert_eq!(store.region, "us-east-1");
        assert_eq!(store.secret_access_key, "secret");
        let registry = config.registry.unwrap();
        assert_eq!(registry.repository, "docker-private");
        assert_eq!(registry.timeout, Duration::from_secs(60));
        assert_eq!(config.spark.s3.unwrap().access_key, "id");
        assert!(config.spark.hive_metastore.is_none());
        assert_eq!(config.polling.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_mode_falls_back_to_variable_then_dev() {
        let raw: RawConfig = serde_yaml::from_str("{}").unwrap();
        let vars = BTreeMap::from([(MODE_VARIABLE.to_string(), "stage".to_string())]);
        assert_eq!(raw.clone().resolve(&vars).unwrap().mode.as_str(), "stage");

        let config = raw.resolve(&BTreeMap::<String, String>::new()).unwrap();
        assert!(config.mode.is_dev());
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let raw: RawConfig = serde_yaml::from_str("mode: Prod_1").unwrap();
        assert!(matches!(
            raw.resolve(&BTreeMap::<String, String>::new()),
            Err(ConfigParseError::InvalidMode(mode)) if mode == "Prod_1"
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<RawConfig, _> = serde_yaml::from_str("namespcae: spark");
        assert!(result.is_err());
    }
}
