use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{Level, info};

#[cfg(test)]
use mockall::automock;

use crate::config::ObjectStoreConfig;

/// Where a configuration document lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Local(PathBuf),
    Object { bucket: String, key: String },
    Inline(Value),
}

#[derive(Error, Debug)]
#[error("inline config is not valid YAML: {0}")]
pub struct ConfigSourceParseError(#[from] serde_yaml::Error);

impl FromStr for ConfigSource {
    type Err = ConfigSourceParseError;

    /// `s3://bucket/path/to/key.yaml` addresses the object store, a string opening with `{`
    /// is an inline YAML/JSON mapping, anything else a local path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim_start().starts_with('{') {
            return Ok(ConfigSource::Inline(serde_yaml::from_str(s)?));
        }
        if let Some(rest) = s.strip_prefix("s3://")
            && let Some((bucket, key)) = rest.split_once('/')
            && !bucket.is_empty()
            && !key.is_empty()
        {
            return Ok(ConfigSource::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(ConfigSource::Local(PathBuf::from(s)))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Local(path) => write!(f, "{}", path.display()),
            ConfigSource::Object { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            ConfigSource::Inline(_) => f.write_str("<inline>"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object does not exist")]
    NotFound,

    #[error("object store request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Key-addressed read access to configuration objects.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// S3-compatible object store with static credentials and path-style addressing.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: &ObjectStoreConfig) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(endpoint = %config.endpoint, "Object store client initialized.");

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument("object_store/get_object", level = Level::TRACE, skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    ObjectStoreError::NotFound
                } else {
                    ObjectStoreError::Request(Box::new(e))
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Request(Box::new(e)))?;
        Ok(body.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_source() {
        assert_eq!(
            "s3://configs/spark/base.yaml".parse::<ConfigSource>().unwrap(),
            ConfigSource::Object {
                bucket: "configs".to_string(),
                key: "spark/base.yaml".to_string(),
            }
        );
        assert_eq!(
            "jobs/daily.yaml".parse::<ConfigSource>().unwrap(),
            ConfigSource::Local(PathBuf::from("jobs/daily.yaml"))
        );
        assert_eq!(
            "s3://bucket-only".parse::<ConfigSource>().unwrap(),
            ConfigSource::Local(PathBuf::from("s3://bucket-only"))
        );
    }

    #[test]
    fn test_parse_inline_config_source() {
        assert_eq!(
            r#"{"executor_memory": "4g", "envs": {"TZ": "UTC"}}"#
                .parse::<ConfigSource>()
                .unwrap(),
            ConfigSource::Inline(serde_json::json!({"executor_memory": "4g", "envs": {"TZ": "UTC"}}))
        );
        assert_eq!(
            "{num_executors: 2}".parse::<ConfigSource>().unwrap(),
            ConfigSource::Inline(serde_json::json!({"num_executors": 2}))
        );
        assert!("{unclosed: [".parse::<ConfigSource>().is_err());
    }

    #[test]
    fn test_display_config_source() {
        let source = ConfigSource::Object {
            bucket: "b".to_string(),
            key: "k.yaml".to_string(),
        };
        assert_eq!(source.to_string(), "s3://b/k.yaml");
    }
}
