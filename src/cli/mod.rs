use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

use crate::job_config::source::ConfigSource;

#[derive(Debug, Parser)]
#[command(version, about = "Submit Spark jobs to Kubernetes and wait for them to finish")]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) subcommand: SubCommands,

    #[clap(
        short,
        long,
        default_value = "/etc/sparkjob/config.yaml",
        global = true
    )]
    pub(crate) config: PathBuf,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum SubCommands {
    /// Submit one job and wait for its terminal state
    Submit(JobArgs),

    /// Print the manifest a `submit` would create, without touching the cluster
    Render(JobArgs),

    /// Submit several jobs sharing one base config, one after another
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct JobArgs {
    /// Base job config: a local path, s3://bucket/key or an inline '{...}' mapping
    #[clap(long)]
    pub(crate) base_config: Option<ConfigSource>,

    /// Job config merged over the base config
    #[clap(long)]
    pub(crate) job_config: Option<ConfigSource>,

    /// Pre-rendered SparkApplication manifest, used instead of job configs
    #[clap(long, conflicts_with_all = ["base_config", "job_config"])]
    pub(crate) manifest: Option<ConfigSource>,

    #[clap(flatten)]
    pub(crate) run: RunConfArgs,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RunArgs {
    #[clap(long)]
    pub(crate) base_config: ConfigSource,

    /// Job configs, submitted in the given order
    #[clap(long = "job-config", required = true, num_args = 1..)]
    pub(crate) job_configs: Vec<ConfigSource>,

    #[clap(flatten)]
    pub(crate) run: RunConfArgs,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RunConfArgs {
    /// Per-run parameters as JSON, e.g. '{"envs": {"DATE": "2024-01-01"}, "args": ["--full"]}'
    #[clap(long)]
    pub(crate) run_conf: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submit() {
        let cli = Cli::parse_from([
            "sparkjob",
            "submit",
            "--base-config",
            "s3://configs/base.yaml",
            "--job-config",
            "jobs/daily.yaml",
            "--run-conf",
            r#"{"args": ["--full"]}"#,
        ]);

        assert_eq!(cli.config, PathBuf::from("/etc/sparkjob/config.yaml"));
        let SubCommands::Submit(args) = cli.subcommand else {
            panic!("expected submit");
        };
        assert_eq!(
            args.base_config,
            Some(ConfigSource::Object {
                bucket: "configs".to_string(),
                key: "base.yaml".to_string(),
            })
        );
        assert_eq!(
            args.job_config,
            Some(ConfigSource::Local(PathBuf::from("jobs/daily.yaml")))
        );
        assert!(args.manifest.is_none());
        assert!(args.run.run_conf.is_some());
    }

    #[test]
    fn test_parse_run_with_global_config() {
        let cli = Cli::parse_from([
            "sparkjob",
            "run",
            "--base-config",
            "base.yaml",
            "--job-config",
            "extract.yaml",
            "load.yaml",
            "-c",
            "/tmp/sparkjob.yaml",
        ]);

        assert_eq!(cli.config, PathBuf::from("/tmp/sparkjob.yaml"));
        let SubCommands::Run(args) = cli.subcommand else {
            panic!("expected run");
        };
        assert_eq!(
            args.job_configs,
            vec![
                ConfigSource::Local(PathBuf::from("extract.yaml")),
                ConfigSource::Local(PathBuf::from("load.yaml")),
            ]
        );
    }

    #[test]
    fn test_manifest_conflicts_with_job_configs() {
        let result = Cli::try_parse_from([
            "sparkjob",
            "render",
            "--manifest",
            "s3://b/m.yaml",
            "--job-config",
            "s3://b/j.yaml",
        ]);

        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_parse_inline_job_config() {
        let cli = Cli::parse_from([
            "sparkjob",
            "render",
            "--base-config",
            "base.yaml",
            "--job-config",
            r#"{"executor_memory": "4g"}"#,
        ]);

        let SubCommands::Render(args) = cli.subcommand else {
            panic!("expected render");
        };
        assert_eq!(
            args.job_config,
            Some(ConfigSource::Inline(serde_json::json!({"executor_memory": "4g"})))
        );
    }
}
