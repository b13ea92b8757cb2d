//! Turns a merged [`JobSpec`] into a SparkApplication submission manifest.

mod cluster;
mod defaults;
pub mod image;
mod run;
mod spark;
mod validate;

use std::sync::Arc;

use derive_debug::Dbg;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{Level, debug, instrument};

pub use self::cluster::ClusterConf;
use self::defaults::base_spark_conf;
use self::image::{ImageRegistry, NoTagFoundError, RegistryError, resolve_image};
pub use self::run::RunContext;
pub use self::spark::SparkJobConf;
pub use self::validate::ValidationError;
use crate::config::{Config, DeploymentMode, SparkSettings};
use crate::job_config::JobSpec;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NoTagFound(#[from] NoTagFoundError),

    #[error("Image '{image}' has no tag and no image registry is configured")]
    RegistryNotConfigured { image: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A complete SparkApplication document, ready to be created in the cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionManifest(Map<String, Value>);

impl SubmissionManifest {
    pub fn name(&self) -> Option<&str> {
        self.0.get("metadata")?.get("name")?.as_str()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.get("metadata")?.get("namespace")?.as_str()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let metadata = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = metadata {
            metadata.insert("name".to_string(), Value::String(name.into()));
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.0)
    }
}

impl From<Map<String, Value>> for SubmissionManifest {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Copies every runtime entry into the wrapper one section level deep; runtime wins.
fn merge_sections(wrapper: Value, runtime: Value) -> Map<String, Value> {
    let mut merged = match wrapper {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let Value::Object(runtime) = runtime else {
        return merged;
    };

    for (key, value) in runtime {
        match (merged.get_mut(&key), value) {
            (Some(Value::Object(section)), Value::Object(entries)) => section.extend(entries),
            (_, value) => {
                merged.insert(key, value);
            }
        }
    }
    merged
}

/// Builds submission manifests with the process-wide defaults and secrets applied.
#[derive(Dbg, Clone)]
pub struct ManifestBuilder {
    mode: DeploymentMode,
    namespace: String,
    spark_settings: SparkSettings,
    #[dbg(skip)]
    registry: Option<Arc<dyn ImageRegistry>>,
}

impl ManifestBuilder {
    pub fn new(config: &Config, registry: Option<Arc<dyn ImageRegistry>>) -> Self {
        Self {
            mode: config.mode.clone(),
            namespace: config.namespace.clone(),
            spark_settings: config.spark.clone(),
            registry,
        }
    }

    /// Validates the job, resolves its image and assembles the manifest.
    /// Validation happens before any registry request.
    #[instrument("manifest/build", level = Level::DEBUG, skip_all, fields(job = ?job_spec.get("name")))]
    pub async fn build(
        &self,
        job_spec: &JobSpec,
        cluster: &ClusterConf,
        run: &RunContext,
    ) -> Result<SubmissionManifest, ManifestError> {
        let job = SparkJobConf::from_spec(job_spec)?;
        cluster.validate("k8s")?;

        let image = resolve_image(&job.image, &self.mode, self.registry.as_deref()).await?;

        let wrapper = serde_json::to_value(cluster.generate(&self.namespace))?;
        let runtime = serde_json::to_value(job.generate(
            image,
            run,
            base_spark_conf(&self.spark_settings),
            cluster.repositories.clone(),
        ))?;

        let manifest = SubmissionManifest(merge_sections(wrapper, runtime));
        debug!(name = ?manifest.name(), namespace = ?manifest.namespace(), "Manifest built.");
        Ok(manifest)
    }
}
