//! Base + override configuration documents and their merge into a [`JobSpec`].

mod document;
mod interpolate;
pub mod source;

use std::path::PathBuf;
use std::sync::Arc;

use derive_debug::Dbg;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{Level, debug, info};

pub use self::document::Document;
use self::source::{ConfigSource, ObjectStore, ObjectStoreError};
use crate::config::variables::VariableStore;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Object s3://{bucket}/{key} does not exist")]
    ObjectMissing { bucket: String, key: String },

    #[error("Failed to fetch s3://{bucket}/{key}: {source}")]
    ObjectStore {
        bucket: String,
        key: String,
        source: ObjectStoreError,
    },

    #[error("Cannot fetch s3://{bucket}/{key}: no object store is configured")]
    ObjectStoreNotConfigured { bucket: String, key: String },

    #[error("Failed to parse '{origin}': {source}")]
    Parse {
        origin: String,
        source: serde_yaml::Error,
    },

    #[error("'{origin}' must contain a mapping at its root")]
    NotAMapping { origin: String },
}

#[derive(Error, Debug)]
pub enum ConfigResolutionError {
    #[error("Interpolation at '{at}' references undefined key '{key}'")]
    UndefinedKey { key: String, at: String },

    #[error("Interpolation at '{at}' references unset variable '{name}'")]
    UndefinedVariable { name: String, at: String },

    #[error("Interpolation of '{key}' refers back to itself")]
    Cycle { key: String },

    #[error("Interpolation at '{at}' embeds non-scalar '{key}' in a string")]
    NonScalar { key: String, at: String },

    #[error("Unterminated interpolation in '{value}' at '{at}'")]
    Unterminated { value: String, at: String },
}

#[derive(Error, Debug)]
pub enum JobConfigError {
    #[error(transparent)]
    Load(#[from] ConfigLoadError),

    #[error(transparent)]
    Resolution(#[from] ConfigResolutionError),
}

/// Fully merged and interpolated job parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobSpec(Map<String, Value>);

impl JobSpec {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for JobSpec {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Fetches a document from the object store, a local file, or takes it inline.
#[tracing::instrument("job_config/load", level = Level::TRACE, skip(store), fields(source = %source))]
pub async fn load_document(
    store: Option<&dyn ObjectStore>,
    source: &ConfigSource,
) -> Result<Document, ConfigLoadError> {
    let origin = source.to_string();
    match source {
        ConfigSource::Local(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| ConfigLoadError::Io {
                    path: path.clone(),
                    source,
                })?;
            Document::from_yaml(&bytes, &origin)
        }
        ConfigSource::Object { bucket, key } => {
            let store = store.ok_or_else(|| ConfigLoadError::ObjectStoreNotConfigured {
                bucket: bucket.clone(),
                key: key.clone(),
            })?;
            let bytes = store
                .get_object(bucket, key)
                .await
                .map_err(|e| match e {
                    ObjectStoreError::NotFound => ConfigLoadError::ObjectMissing {
                        bucket: bucket.clone(),
                        key: key.clone(),
                    },
                    other => ConfigLoadError::ObjectStore {
                        bucket: bucket.clone(),
                        key: key.clone(),
                        source: other,
                    },
                })?;
            Document::from_yaml(&bytes, &origin)
        }
        ConfigSource::Inline(value) => Document::from_value(value.clone(), &origin),
    }
}

/// Deep-merges `overrides` onto `base`, resolves interpolations and materializes the result.
/// Performs no I/O.
pub fn merge_documents(
    base: &Document,
    overrides: &Document,
    variables: &dyn VariableStore,
) -> Result<JobSpec, ConfigResolutionError> {
    let merged = base.merged_with(overrides);
    Ok(JobSpec(interpolate::resolve_mapping(merged.as_map(), variables)?))
}

/// A base Spark job configuration, loaded once and reused for every job merged on top of it.
#[derive(Dbg, Clone)]
pub struct SparkJobConfig {
    base: Document,
    #[dbg(skip)]
    variables: Arc<dyn VariableStore>,
}

impl SparkJobConfig {
    pub async fn load(
        store: Option<&dyn ObjectStore>,
        source: &ConfigSource,
        variables: Arc<dyn VariableStore>,
    ) -> Result<Self, ConfigLoadError> {
        let base = load_document(store, source).await?;
        info!(source = %source, keys = base.as_map().len(), "Base job config loaded.");
        Ok(Self::from_document(base, variables))
    }

    pub fn from_document(base: Document, variables: Arc<dyn VariableStore>) -> Self {
        Self { base, variables }
    }

    pub fn base(&self) -> &Document {
        &self.base
    }

    pub fn merge(&self, overrides: &Document) -> Result<JobSpec, ConfigResolutionError> {
        merge_documents(&self.base, overrides, self.variables.as_ref())
    }

    /// Loads the override document at `source`, then merges it.
    pub async fn merge_source(
        &self,
        store: Option<&dyn ObjectStore>,
        source: &ConfigSource,
    ) -> Result<JobSpec, JobConfigError> {
        let overrides = load_document(store, source).await?;
        let spec = self.merge(&overrides)?;
        debug!(source = %source, "Job config merged.");
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::source::MockObjectStore;
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn vars() -> Arc<dyn VariableStore> {
        Arc::new(BTreeMap::from([(
            "HIVE_URL".to_string(),
            "jdbc:postgresql://hive/metastore".to_string(),
        )]))
    }

    #[tokio::test]
    async fn test_load_from_object_store() {
        let mut store = MockObjectStore::new();
        store
            .expect_get_object()
            .with(eq("configs"), eq("spark/base.yaml"))
            .times(1)
            .returning(|_, _| Ok(b"image: cr.example.net/etl\ndriver_memory: 1g\n".to_vec()));

        let source: ConfigSource = "s3://configs/spark/base.yaml".parse().unwrap();
        let document = load_document(Some(&store as &dyn ObjectStore), &source).await.unwrap();

        assert_eq!(document.as_map()["driver_memory"], json!("1g"));
    }

    #[tokio::test]
    async fn test_load_missing_object() {
        let mut store = MockObjectStore::new();
        store
            .expect_get_object()
            .returning(|_, _| Err(ObjectStoreError::NotFound));

        let source: ConfigSource = "s3://configs/absent.yaml".parse().unwrap();
        let err = load_document(Some(&store as &dyn ObjectStore), &source).await.unwrap_err();

        assert!(matches!(err, ConfigLoadError::ObjectMissing { ref key, .. } if key == "absent.yaml"));
    }

    #[tokio::test]
    async fn test_load_object_without_store() {
        let source: ConfigSource = "s3://configs/base.yaml".parse().unwrap();
        let err = load_document(None, &source).await.unwrap_err();
        assert!(matches!(err, ConfigLoadError::ObjectStoreNotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_merge_source_from_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name: daily-report\nexecutor_memory: 2g\nenvs:\n  HIVE: ${{oc.env:HIVE_URL}}\n  APP: ${{name}}"
        )
        .unwrap();

        let base = Document::from_value(
            json!({"image": "cr.example.net/reports", "executor_memory": "1g", "envs": {"TZ": "UTC"}}),
            "base",
        )
        .unwrap();
        let config = SparkJobConfig::from_document(base, vars());

        let spec = config
            .merge_source(None, &ConfigSource::Local(file.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(
            spec.into_value(),
            json!({
                "name": "daily-report",
                "image": "cr.example.net/reports",
                "executor_memory": "2g",
                "envs": {
                    "TZ": "UTC",
                    "HIVE": "jdbc:postgresql://hive/metastore",
                    "APP": "daily-report"
                }
            })
        );
    }

    #[tokio::test]
    async fn test_load_inline_document() {
        let source = ConfigSource::Inline(json!({"name": "adhoc", "num_executors": 2}));

        let document = load_document(None, &source).await.unwrap();

        assert_eq!(document.as_map()["num_executors"], json!(2));
    }

    #[tokio::test]
    async fn test_merge_source_from_inline_overrides() {
        let mut store = MockObjectStore::new();
        store.expect_get_object().times(0);
        let base = Document::from_value(
            json!({"name": "daily-report", "executor_memory": "1g", "envs": {"TZ": "UTC"}}),
            "base",
        )
        .unwrap();
        let config = SparkJobConfig::from_document(base, vars());

        let source: ConfigSource = r#"{"executor_memory": "8g", "envs": {"HIVE": "${oc.env:HIVE_URL}"}}"#
            .parse()
            .unwrap();
        let spec = config
            .merge_source(Some(&store as &dyn ObjectStore), &source)
            .await
            .unwrap();

        assert_eq!(
            spec.into_value(),
            json!({
                "name": "daily-report",
                "executor_memory": "8g",
                "envs": {"TZ": "UTC", "HIVE": "jdbc:postgresql://hive/metastore"}
            })
        );
    }

    #[test]
    fn test_override_precedence_for_every_shared_key() {
        let base = Document::from_value(
            json!({"name": "a", "image": "x/y", "num_executors": 1, "packages": ["p:q:1"], "envs": {"K": "base"}}),
            "base",
        )
        .unwrap();
        let overrides = Document::from_value(
            json!({"name": "b", "image": "x/z:1.0", "num_executors": 4, "packages": [], "envs": {"K": "job"}}),
            "job",
        )
        .unwrap();

        let spec = merge_documents(&base, &overrides, &BTreeMap::<String, String>::new()).unwrap();

        for (key, value) in overrides.as_map() {
            assert_eq!(spec.get(key), Some(value), "key {key}");
        }
    }

    #[test]
    fn test_base_reference_resolved_after_override() {
        let base = Document::from_value(
            json!({"cores": 1, "executor_cores": "${cores}"}),
            "base",
        )
        .unwrap();
        let overrides = Document::from_value(json!({"cores": 3}), "job").unwrap();

        let spec = merge_documents(&base, &overrides, &BTreeMap::<String, String>::new()).unwrap();

        assert_eq!(spec.get("executor_cores"), Some(&json!(3)));
    }

    #[test]
    fn test_debug_omits_variables() {
        let base = Document::from_value(json!({"image": "cr.example.net/etl"}), "base").unwrap();
        let debug = format!("{:?}", SparkJobConfig::from_document(base, vars()));

        assert!(debug.contains("cr.example.net/etl"));
        assert!(!debug.contains("jdbc:postgresql"));
    }

    #[test]
    fn test_merge_fails_on_undefined_reference() {
        let base = Document::default();
        let overrides =
            Document::from_value(json!({"image": "${registry.host}/etl"}), "job").unwrap();

        let err = merge_documents(&base, &overrides, &BTreeMap::<String, String>::new()).unwrap_err();

        assert!(matches!(err, ConfigResolutionError::UndefinedKey { .. }));
    }
}
