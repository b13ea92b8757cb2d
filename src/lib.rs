use std::sync::Arc;

use self::cli::{Cli, JobArgs, RunConfArgs, SubCommands};
use self::config::Config;
use self::config::variables::{EnvVariableStore, VariableStore};
use self::job_config::source::{ConfigSource, ObjectStore, S3ObjectStore};
use self::job_config::{
    ConfigLoadError, Document, JobConfigError, SparkJobConfig, load_document, merge_documents,
};
use self::kubernetes_objects::spark_application::{KubeSparkApplicationApi, SparkApplicationApi};
use self::manifest::image::{ImageRegistry, NexusRegistry, RegistryError};
use self::manifest::{ClusterConf, ManifestBuilder, RunContext, SubmissionManifest, ValidationError};
use self::operator::{
    ScheduledTask, SparkKubernetesOperator, SparkOperatorError, SubmissionInput, render_manifest,
};
use self::scheduler::{SequentialRunError, SequentialRunner, Shutdown};
use clap::Parser;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use tracing_error::ExtractSpanTrace;
use tracing_error::SpanTrace;

pub mod cli;
pub mod config;
pub mod error;
pub mod job_config;
pub mod kubernetes_objects;
pub mod manifest;
pub mod operator;
pub mod retry;
pub mod scheduler;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load config.\n{0}")]
    ConfigError(#[from] config::ConfigFileError),

    #[error("Failed to initialize kubernetes client.\n{0}")]
    KubeClientError(#[from] kube::Error),

    #[error("Failed to initialize image registry client.\n{0}")]
    RegistryError(#[from] RegistryError),

    #[error("Failed to load job config.\n{0}")]
    JobConfigError(#[from] JobConfigError),

    #[error("Invalid job parameters.\n{0}")]
    ValidationError(#[from] ValidationError),

    #[error("Invalid --run-conf JSON.\n{0}")]
    RunConfError(#[from] serde_json::Error),

    #[error("Failed to render manifest.\n{0}")]
    RenderError(#[from] serde_yaml::Error),

    #[error("Spark job stopped due to following error:\n{0}")]
    SparkOperatorError(#[from] SparkOperatorError),

    #[error("Sequential run stopped due to following error:\n{0}")]
    SequentialRunError(#[from] SequentialRunError),
}

impl From<ConfigLoadError> for AppError {
    fn from(e: ConfigLoadError) -> Self {
        AppError::JobConfigError(JobConfigError::Load(e))
    }
}

impl ExtractSpanTrace for AppError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            AppError::SparkOperatorError(e) => e.span_trace(),
            AppError::SequentialRunError(e) => e.span_trace(),
            _ => None,
        }
    }
}

/// Shared clients, created once per process.
struct Clients {
    object_store: Option<S3ObjectStore>,
    builder: ManifestBuilder,
}

impl Clients {
    async fn new(config: &Config) -> Result<Self, AppError> {
        let object_store = match &config.object_store {
            Some(store) => Some(S3ObjectStore::new(store).await),
            None => None,
        };

        let registry: Option<Arc<dyn ImageRegistry>> = match &config.registry {
            Some(registry) => Some(Arc::new(NexusRegistry::new(registry).await?)),
            None => None,
        };

        Ok(Self {
            object_store,
            builder: ManifestBuilder::new(config, registry),
        })
    }

    fn object_store(&self) -> Option<&dyn ObjectStore> {
        self.object_store.as_ref().map(|s| s as &dyn ObjectStore)
    }
}

async fn spark_application_api(config: &Config) -> Result<Arc<dyn SparkApplicationApi>, AppError> {
    let client = retry::retry_fixed(
        &config.connect_retry,
        "kubernetes client",
        kube::Client::try_default,
    )
    .await?;

    info!("Kubernetes Client Initialized.");

    Ok(Arc::new(KubeSparkApplicationApi::new(client)))
}

fn parse_run_conf(args: &RunConfArgs) -> Result<RunContext, AppError> {
    match &args.run_conf {
        Some(text) => {
            let value: Value = serde_json::from_str(text)?;
            Ok(RunContext::from_value(&value)?)
        }
        None => Ok(RunContext::default()),
    }
}

async fn submission_input(
    args: &JobArgs,
    store: Option<&dyn ObjectStore>,
    variables: &dyn VariableStore,
) -> Result<SubmissionInput, AppError> {
    let has_job = args.base_config.is_some() || args.job_config.is_some();
    match (args.manifest.is_some(), has_job) {
        (true, true) => {
            return Err(SparkOperatorError::ConfigurationConflict("both were given").into());
        }
        (false, false) => {
            return Err(SparkOperatorError::ConfigurationConflict("neither was given").into());
        }
        _ => {}
    }

    let manifest = match &args.manifest {
        Some(source) => Some(load_manifest(store, source).await?),
        None => None,
    };

    let job = if has_job {
        let base = match &args.base_config {
            Some(source) => load_document(store, source).await?,
            None => Document::default(),
        };
        let overrides = match &args.job_config {
            Some(source) => load_document(store, source).await?,
            None => Document::default(),
        };
        let spec = merge_documents(&base, &overrides, variables).map_err(JobConfigError::from)?;
        let cluster = ClusterConf::from_spec(&spec)?;
        Some((spec, cluster))
    } else {
        None
    };

    Ok(SubmissionInput { manifest, job })
}

async fn load_manifest(
    store: Option<&dyn ObjectStore>,
    source: &ConfigSource,
) -> Result<SubmissionManifest, AppError> {
    match load_document(store, source).await?.into_value() {
        Value::Object(map) => Ok(SubmissionManifest::from(map)),
        _ => Err(ConfigLoadError::NotAMapping {
            origin: source.to_string(),
        }
        .into()),
    }
}

pub async fn app() -> Result<(), AppError> {
    let cli = Cli::parse();
    let variables: Arc<dyn VariableStore> = Arc::new(EnvVariableStore);
    let config = Config::new_from_file(&cli.config, variables.as_ref()).await?;

    info!(mode = %config.mode, namespace = %config.namespace, "Config Loaded.");

    let clients = Clients::new(&config).await?;

    match cli.subcommand {
        SubCommands::Render(args) => {
            let input =
                submission_input(&args, clients.object_store(), variables.as_ref()).await?;
            let run = parse_run_conf(&args.run)?;
            let manifest = render_manifest(&input, &clients.builder, &run).await?;
            print!("{}", manifest.to_yaml()?);
        }
        SubCommands::Submit(args) => {
            let input =
                submission_input(&args, clients.object_store(), variables.as_ref()).await?;
            let run = parse_run_conf(&args.run)?;
            let api = spark_application_api(&config).await?;

            let mut operator = SparkKubernetesOperator::new(
                input,
                &config,
                api,
                clients.builder.clone(),
                Shutdown::new(),
            );
            operator.execute(&run).await?;
        }
        SubCommands::Run(args) => {
            let run = parse_run_conf(&args.run)?;
            let base =
                SparkJobConfig::load(clients.object_store(), &args.base_config, variables.clone())
                    .await?;

            let mut jobs = Vec::with_capacity(args.job_configs.len());
            for source in &args.job_configs {
                let spec = base.merge_source(clients.object_store(), source).await?;
                let cluster = ClusterConf::from_spec(&spec)?;
                jobs.push(SubmissionInput::job(spec, cluster));
            }

            let api = spark_application_api(&config).await?;
            let shutdown = Shutdown::new();
            let tasks: Vec<Box<dyn ScheduledTask>> = jobs
                .into_iter()
                .map(|input| {
                    Box::new(SparkKubernetesOperator::new(
                        input,
                        &config,
                        api.clone(),
                        clients.builder.clone(),
                        shutdown.clone(),
                    )) as Box<dyn ScheduledTask>
                })
                .collect();

            SequentialRunner::new(tasks, shutdown).run(&run).await?;
        }
    }

    Ok(())
}
