use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, HostPathVolumeSource, Volume, VolumeMount};
use serde::Serialize;
use tracing::debug;

use super::defaults::{
    BASE_PACKAGE, DRIVER_CORES, DRIVER_MEMORY, EXECUTOR_CORES, EXECUTOR_MEMORY, LABEL_VERSION,
    NUM_EXECUTORS, SCRATCH_VOLUME_NAME, SCRATCH_VOLUME_PATH, SERVICE_ACCOUNT,
};
use super::run::RunContext;
use super::validate::{Fields, ValidationError};
use crate::job_config::JobSpec;

/// Label key under which `node_selector` is placed on driver and executor pods.
const NODE_SELECTOR_KEY: &str = "spark";

/// Validated job parameters of one Spark application.
#[derive(Debug, Clone, PartialEq)]
pub struct SparkJobConf {
    pub name: String,
    pub image: String,
    pub main_application_file: String,
    pub node_selector: String,
    pub driver_memory: Option<String>,
    pub driver_cores: Option<i64>,
    pub driver_core_limit: Option<String>,
    pub num_executors: Option<i64>,
    pub max_executors: Option<i64>,
    pub executor_memory: Option<String>,
    pub executor_cores: Option<i64>,
    pub executor_core_limit: Option<String>,
    pub envs: BTreeMap<String, String>,
    pub env_from: Option<String>,
    pub spark_conf_overrides: Vec<(String, String)>,
    pub driver_java_options: Option<String>,
    pub executor_java_options: Option<String>,
    pub packages: Vec<String>,
    pub args: Vec<String>,
}

impl SparkJobConf {
    const KNOWN_KEYS: &'static [&'static str] = &[
        "name",
        "image",
        "main_application_file",
        "node_selector",
        "driver_memory",
        "driver_cores",
        "driver_core_limit",
        "num_executors",
        "max_executors",
        "executor_memory",
        "executor_cores",
        "executor_core_limit",
        "envs",
        "env_from",
        "spark_conf_overrides",
        "driver_java_options",
        "executor_java_options",
        "packages",
        "args",
        "k8s",
    ];

    pub fn from_spec(spec: &JobSpec) -> Result<Self, ValidationError> {
        let fields = Fields::new(spec.as_map(), "");

        let unknown = fields.unknown_keys(Self::KNOWN_KEYS);
        if !unknown.is_empty() {
            debug!(?unknown, "Ignoring unrecognized job parameters.");
        }

        Ok(Self {
            name: fields.required_str("name")?,
            image: fields.required_str("image")?,
            main_application_file: fields.required_str("main_application_file")?,
            node_selector: fields.required_str("node_selector")?,
            driver_memory: fields.optional_memory("driver_memory")?,
            driver_cores: fields.optional_cores("driver_cores")?,
            driver_core_limit: fields.optional_str("driver_core_limit")?,
            num_executors: fields.optional_count("num_executors")?,
            max_executors: fields.optional_count("max_executors")?,
            executor_memory: fields.optional_memory("executor_memory")?,
            executor_cores: fields.optional_cores("executor_cores")?,
            executor_core_limit: fields.optional_str("executor_core_limit")?,
            envs: fields
                .optional_scalar_map("envs", "Enter values in the dictionary format")?
                .unwrap_or_default(),
            env_from: fields.optional_str("env_from")?,
            spark_conf_overrides: parse_conf_overrides(
                fields
                    .optional_str_list(
                        "spark_conf_overrides",
                        "Enter values in the format of the list of lines 'key=value'",
                    )?
                    .unwrap_or_default(),
            )?,
            driver_java_options: fields.optional_str("driver_java_options")?,
            executor_java_options: fields.optional_str("executor_java_options")?,
            packages: fields
                .optional_str_list("packages", "Enter packages in the list format")?
                .unwrap_or_default(),
            args: fields.optional_args("args")?.unwrap_or_default(),
        })
    }

    /// Runtime part of the manifest: metadata name plus the application spec.
    pub(crate) fn generate(
        &self,
        image: String,
        run: &RunContext,
        mut spark_conf: BTreeMap<String, String>,
        repositories: Option<Vec<String>>,
    ) -> RuntimeManifest {
        spark_conf.extend(self.spark_conf_overrides.iter().cloned());

        let mut envs = self.envs.clone();
        envs.extend(run.envs.clone());
        let env: Vec<EnvVar> = envs
            .into_iter()
            .map(|(name, value)| EnvVar {
                name,
                value: Some(value),
                ..Default::default()
            })
            .collect();

        let env_from = self.env_from.as_ref().map(|secret| {
            vec![EnvFrom {
                secret_ref: SecretRef {
                    name: secret.clone(),
                },
            }]
        });
        let node_selector =
            BTreeMap::from([(NODE_SELECTOR_KEY.to_string(), self.node_selector.clone())]);
        let labels = BTreeMap::from([("version".to_string(), LABEL_VERSION.to_string())]);

        let driver_cores = self.driver_cores.unwrap_or(DRIVER_CORES);
        let executor_cores = self.executor_cores.unwrap_or(EXECUTOR_CORES);

        let mut arguments = self.args.clone();
        arguments.extend(run.args.iter().cloned());

        let mut packages = vec![BASE_PACKAGE.to_string()];
        packages.extend(self.packages.iter().cloned());

        RuntimeManifest {
            metadata: RuntimeMetadata {
                name: self.name.clone(),
            },
            spec: RuntimeSpec {
                arguments,
                spark_conf,
                deps: RuntimeDeps {
                    packages,
                    repositories,
                },
                image,
                main_application_file: self.main_application_file.clone(),
                volumes: vec![Volume {
                    name: SCRATCH_VOLUME_NAME.to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: SCRATCH_VOLUME_PATH.to_string(),
                        type_: Some("Directory".to_string()),
                    }),
                    ..Default::default()
                }],
                driver: DriverSpec {
                    memory: self
                        .driver_memory
                        .clone()
                        .unwrap_or_else(|| DRIVER_MEMORY.to_string()),
                    cores: driver_cores,
                    core_limit: core_limit(driver_cores, self.driver_core_limit.as_deref()),
                    labels: labels.clone(),
                    volume_mounts: vec![VolumeMount {
                        name: SCRATCH_VOLUME_NAME.to_string(),
                        mount_path: SCRATCH_VOLUME_PATH.to_string(),
                        ..Default::default()
                    }],
                    service_account: SERVICE_ACCOUNT.to_string(),
                    env: env.clone(),
                    env_from: env_from.clone(),
                    node_selector: node_selector.clone(),
                    java_options: self.driver_java_options.clone(),
                },
                executor: ExecutorSpec {
                    cores: executor_cores,
                    core_limit: core_limit(executor_cores, self.executor_core_limit.as_deref()),
                    memory: self
                        .executor_memory
                        .clone()
                        .unwrap_or_else(|| EXECUTOR_MEMORY.to_string()),
                    labels,
                    env,
                    env_from,
                    instances: self.num_executors.unwrap_or(NUM_EXECUTORS),
                    node_selector,
                    java_options: self.executor_java_options.clone(),
                },
                dynamic_allocation: self.max_executors.map(|max_executors| DynamicAllocation {
                    enabled: true,
                    max_executors,
                }),
            },
        }
    }
}

/// `"{cores * 1000}m"` unless an explicit limit is given.
pub(crate) fn core_limit(cores: i64, explicit: Option<&str>) -> String {
    match explicit {
        Some(limit) => limit.to_string(),
        None => format!("{}m", cores.saturating_mul(1000)),
    }
}

fn parse_conf_overrides(entries: Vec<String>) -> Result<Vec<(String, String)>, ValidationError> {
    entries
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ValidationError::new(
                "spark_conf_overrides",
                format!("Entry '{entry}' is not in the format 'key=value'"),
            )),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub(crate) struct RuntimeManifest {
    metadata: RuntimeMetadata,
    spec: RuntimeSpec,
}

#[derive(Debug, Serialize)]
struct RuntimeMetadata {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeSpec {
    arguments: Vec<String>,
    spark_conf: BTreeMap<String, String>,
    deps: RuntimeDeps,
    image: String,
    main_application_file: String,
    volumes: Vec<Volume>,
    driver: DriverSpec,
    executor: ExecutorSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    dynamic_allocation: Option<DynamicAllocation>,
}

#[derive(Debug, Serialize)]
struct RuntimeDeps {
    packages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DriverSpec {
    memory: String,
    cores: i64,
    core_limit: String,
    labels: BTreeMap<String, String>,
    volume_mounts: Vec<VolumeMount>,
    service_account: String,
    env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env_from: Option<Vec<EnvFrom>>,
    node_selector: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    java_options: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutorSpec {
    cores: i64,
    core_limit: String,
    memory: String,
    labels: BTreeMap<String, String>,
    env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env_from: Option<Vec<EnvFrom>>,
    instances: i64,
    node_selector: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    java_options: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvFrom {
    secret_ref: SecretRef,
}

#[derive(Debug, Clone, Serialize)]
struct SecretRef {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DynamicAllocation {
    enabled: bool,
    max_executors: i64,
}
