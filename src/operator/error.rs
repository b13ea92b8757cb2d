use thiserror::Error;
use tracing_error::{ExtractSpanTrace, SpanTrace};

use crate::error::SpannedErr;
use crate::kubernetes_objects::spark_application::ClusterApiError;
use crate::manifest::ManifestError;

#[derive(Error, Debug)]
pub enum SparkOperatorError {
    #[error(
        "Exactly one of a rendered manifest or a job and cluster configuration must be given ({0})"
    )]
    ConfigurationConflict(&'static str),

    #[error("Failed to submit SparkApplication '{name}': {reason}")]
    Submission { name: String, reason: String },

    #[error("SparkApplication '{name}' failed with state {state}")]
    ApplicationFailed { name: String, state: String },

    #[error("Failed to build manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Kubernetes client error: {0}")]
    KubeClient(#[from] SpannedErr<ClusterApiError>),

    #[error("SparkApplication '{name}' did not finish within {waited_secs} seconds")]
    PollTimeout { name: String, waited_secs: u64 },

    #[error("Stopped waiting for SparkApplication '{name}' after {signal}")]
    Cancelled { name: String, signal: &'static str },
}

impl ExtractSpanTrace for SparkOperatorError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            SparkOperatorError::KubeClient(e) => e.span_trace(),
            _ => None,
        }
    }
}
