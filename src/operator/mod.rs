//! Submits a SparkApplication and follows it to a terminal state.

pub mod error;
pub mod poll;

use std::sync::Arc;

use async_trait::async_trait;
use derive_debug::Dbg;
use serde_json::Value;
use tracing::{Level, error, info, instrument};

pub use self::error::SparkOperatorError;
use self::poll::{StatusPoller, TerminalState};
use crate::config::{Config, DeploymentMode};
use crate::error::SpannedExt;
use crate::job_config::JobSpec;
use crate::kubernetes_objects::spark_application::SparkApplicationApi;
use crate::manifest::{ClusterConf, ManifestBuilder, RunContext, SubmissionManifest};
use crate::scheduler::Shutdown;

/// Anything a scheduler can run once per trigger.
#[async_trait]
pub trait ScheduledTask: Send {
    fn task_id(&self) -> &str;

    async fn execute(&mut self, run: &RunContext) -> Result<(), SparkOperatorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

/// What to submit: a rendered manifest, or a job with its cluster options.
#[derive(Debug, Clone, Default)]
pub struct SubmissionInput {
    pub manifest: Option<SubmissionManifest>,
    pub job: Option<(JobSpec, ClusterConf)>,
}

impl SubmissionInput {
    pub fn manifest(manifest: SubmissionManifest) -> Self {
        Self {
            manifest: Some(manifest),
            job: None,
        }
    }

    pub fn job(spec: JobSpec, cluster: ClusterConf) -> Self {
        Self {
            manifest: None,
            job: Some((spec, cluster)),
        }
    }

    fn label(&self) -> String {
        if let Some(name) = self.manifest.as_ref().and_then(SubmissionManifest::name) {
            return name.to_string();
        }
        self.job
            .as_ref()
            .and_then(|(spec, _)| spec.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("spark-job")
            .to_string()
    }
}

/// Resolves `input` to a manifest. Exactly one of its two alternatives must be set;
/// the check happens before any network call.
pub async fn render_manifest(
    input: &SubmissionInput,
    builder: &ManifestBuilder,
    run: &RunContext,
) -> Result<SubmissionManifest, SparkOperatorError> {
    match (&input.manifest, &input.job) {
        (Some(_), Some(_)) => Err(SparkOperatorError::ConfigurationConflict("both were given")),
        (None, None) => Err(SparkOperatorError::ConfigurationConflict("neither was given")),
        (Some(manifest), None) => Ok(manifest.clone()),
        (None, Some((spec, cluster))) => Ok(builder.build(spec, cluster, run).await?),
    }
}

#[derive(Dbg)]
pub struct SparkKubernetesOperator {
    task_id: String,
    input: SubmissionInput,
    mode: DeploymentMode,
    namespace: String,
    #[dbg(skip)]
    api: Arc<dyn SparkApplicationApi>,
    builder: ManifestBuilder,
    poller: StatusPoller,
    state: SubmissionState,
}

impl SparkKubernetesOperator {
    pub fn new(
        input: SubmissionInput,
        config: &Config,
        api: Arc<dyn SparkApplicationApi>,
        builder: ManifestBuilder,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            task_id: input.label(),
            input,
            mode: config.mode.clone(),
            namespace: config.namespace.clone(),
            poller: StatusPoller::new(api.clone(), config, shutdown),
            api,
            builder,
            state: SubmissionState::Idle,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// The manifest that `execute` would submit, before the deployment-mode suffix.
    pub async fn render(&self, run: &RunContext) -> Result<SubmissionManifest, SparkOperatorError> {
        render_manifest(&self.input, &self.builder, run).await
    }

    async fn submit(&mut self, run: &RunContext) -> Result<(String, String), SparkOperatorError> {
        self.state = SubmissionState::Submitting;
        let mut manifest = self.render(run).await?;

        let Some(base_name) = manifest.name() else {
            return Err(SparkOperatorError::Submission {
                name: self.task_id.clone(),
                reason: "the manifest has no metadata.name".to_string(),
            });
        };
        let name = format!("{base_name}-{}", self.mode);
        let namespace = manifest
            .namespace()
            .unwrap_or(&self.namespace)
            .to_string();
        manifest.set_name(name.clone());

        info!("Creating SparkApplication '{}' in namespace '{}'.", name, namespace);
        let response = self
            .api
            .create(&namespace, &manifest)
            .await
            .with_span_trace()?;

        let empty = match &response {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(text) => text.is_empty(),
            _ => false,
        };
        if empty {
            return Err(SparkOperatorError::Submission {
                name,
                reason: "the API server returned an empty response".to_string(),
            });
        }

        Ok((name, namespace))
    }

    async fn run(&mut self, run: &RunContext) -> Result<(), SparkOperatorError> {
        let (name, namespace) = self.submit(run).await?;

        self.state = SubmissionState::Polling;
        match self.poller.poll_until_terminal(&name, &namespace).await? {
            TerminalState::Succeeded => Ok(()),
            TerminalState::Failed { state } => {
                Err(SparkOperatorError::ApplicationFailed { name, state })
            }
        }
    }
}

#[async_trait]
impl ScheduledTask for SparkKubernetesOperator {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    #[instrument("operator/execute", level = Level::INFO, skip_all, fields(task_id = %self.task_id))]
    async fn execute(&mut self, run: &RunContext) -> Result<(), SparkOperatorError> {
        let result = self.run(run).await;
        match &result {
            Ok(()) => {
                self.state = SubmissionState::Succeeded;
                info!("Spark job '{}' succeeded.", self.task_id);
            }
            Err(e) => {
                self.state = SubmissionState::Failed;
                error!("Spark job '{}' failed: {}", self.task_id, e);
            }
        }
        result
    }
}
