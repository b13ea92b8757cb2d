use serde::Serialize;
use serde_json::{Map, Value};

use super::defaults::{
    APPLICATION_TYPE, DEPLOY_MODE, IMAGE_PULL_POLICIES, IMAGE_PULL_POLICY, RESTART_POLICIES,
    RESTART_POLICY, SPARK_VERSION, TIME_TO_LIVE_SECONDS,
};
use super::validate::{Fields, ValidationError};
use crate::job_config::JobSpec;
use crate::kubernetes_objects::{SPARK_API_GROUP, SPARK_API_VERSION, SPARK_APPLICATION_KIND};

const CLUSTER_SECTION: &str = "k8s";

/// Cluster-level options of a submission; every field falls back to a default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterConf {
    pub repositories: Option<Vec<String>>,
    pub restart_policy: Option<String>,
    pub namespace: Option<String>,
    pub image_pull_policy: Option<String>,
}

impl ClusterConf {
    const KNOWN_KEYS: &'static [&'static str] = &[
        "repositories",
        "restart_policy",
        "namespace",
        "image_pull_policy",
    ];

    /// Reads and validates the `k8s` section of a merged job config.
    pub fn from_section(section: &Map<String, Value>, prefix: &str) -> Result<Self, ValidationError> {
        let fields = Fields::new(section, prefix);

        if let Some(unknown) = fields.unknown_keys(Self::KNOWN_KEYS).first() {
            return Err(ValidationError::new(
                format!("{prefix}.{unknown}"),
                format!("Unknown cluster option; expected one of {:?}", Self::KNOWN_KEYS),
            ));
        }

        let conf = Self {
            repositories: fields.optional_str_list(
                "repositories",
                "The necessary format is a list, example: ['repository1', 'repository2', ..]",
            )?,
            restart_policy: fields.optional_str("restart_policy")?,
            namespace: fields.optional_str("namespace")?,
            image_pull_policy: fields.optional_str("image_pull_policy")?,
        };
        conf.validate(prefix)?;
        Ok(conf)
    }

    /// Cluster options carried inside a job config under `k8s`.
    pub fn from_spec(spec: &JobSpec) -> Result<Self, ValidationError> {
        match Fields::new(spec.as_map(), "").optional_section(CLUSTER_SECTION)? {
            Some(section) => Self::from_section(section, CLUSTER_SECTION),
            None => Ok(Self::default()),
        }
    }

    pub(crate) fn validate(&self, prefix: &str) -> Result<(), ValidationError> {
        if let Some(policy) = &self.restart_policy
            && !RESTART_POLICIES.contains(&policy.as_str())
        {
            return Err(ValidationError::new(
                format!("{prefix}.restart_policy"),
                format!("Expected one of {RESTART_POLICIES:?}"),
            ));
        }
        if let Some(policy) = &self.image_pull_policy
            && !IMAGE_PULL_POLICIES.contains(&policy.as_str())
        {
            return Err(ValidationError::new(
                format!("{prefix}.image_pull_policy"),
                format!("Expected one of {IMAGE_PULL_POLICIES:?}"),
            ));
        }
        if let Some(namespace) = &self.namespace
            && namespace.is_empty()
        {
            return Err(ValidationError::new(
                format!("{prefix}.namespace"),
                "A non-empty string value is required",
            ));
        }
        Ok(())
    }

    pub(crate) fn resolved_namespace<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }

    /// The SparkApplication wrapper: type, version, namespace and policies.
    pub(crate) fn generate(&self, default_namespace: &str) -> ClusterWrapper {
        ClusterWrapper {
            api_version: format!("{SPARK_API_GROUP}/{SPARK_API_VERSION}"),
            kind: SPARK_APPLICATION_KIND.to_string(),
            metadata: WrapperMetadata {
                namespace: self.resolved_namespace(default_namespace).to_string(),
            },
            spec: WrapperSpec {
                r#type: APPLICATION_TYPE.to_string(),
                mode: DEPLOY_MODE.to_string(),
                deps: WrapperDeps {
                    repositories: self.repositories.clone(),
                },
                image_pull_policy: self
                    .image_pull_policy
                    .clone()
                    .unwrap_or_else(|| IMAGE_PULL_POLICY.to_string()),
                time_to_live_seconds: TIME_TO_LIVE_SECONDS,
                spark_version: SPARK_VERSION.to_string(),
                restart_policy: RestartPolicy {
                    r#type: self
                        .restart_policy
                        .clone()
                        .unwrap_or_else(|| RESTART_POLICY.to_string()),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClusterWrapper {
    api_version: String,
    kind: String,
    metadata: WrapperMetadata,
    spec: WrapperSpec,
}

#[derive(Debug, Serialize)]
struct WrapperMetadata {
    namespace: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WrapperSpec {
    r#type: String,
    mode: String,
    deps: WrapperDeps,
    image_pull_policy: String,
    time_to_live_seconds: i64,
    spark_version: String,
    restart_policy: RestartPolicy,
}

#[derive(Debug, Serialize)]
struct WrapperDeps {
    #[serde(skip_serializing_if = "Option::is_none")]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct RestartPolicy {
    r#type: String,
}
