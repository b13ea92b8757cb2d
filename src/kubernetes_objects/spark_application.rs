use async_trait::async_trait;
use derive_debug::Dbg;
use futures::{AsyncBufReadExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, LogParams, PostParams};
use kube::{Api, Client};
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, Level, trace_span};

#[cfg(test)]
use mockall::automock;

use super::{
    MANAGER_ROLE_NAME, SPARK_API_GROUP, SPARK_API_VERSION, SPARK_APPLICATION_KIND,
    SPARK_APPLICATION_PLURAL,
};
use crate::manifest::SubmissionManifest;

#[derive(Error, Debug)]
pub enum ClusterApiError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Failed to convert SparkApplication object: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Failed to read driver log stream: {0}")]
    LogStream(#[from] std::io::Error),
}

/// Operations on `sparkapplications.sparkoperator.k8s.io` needed to submit and watch a job.
///
/// Objects are exchanged as plain JSON so that the status document can be
/// inspected without a typed schema for every operator version.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SparkApplicationApi: Send + Sync {
    /// Creates the custom resource and returns the object echoed by the API server.
    async fn create(
        &self,
        namespace: &str,
        manifest: &SubmissionManifest,
    ) -> Result<Value, ClusterApiError>;

    /// Fetches the current custom resource, including its `status` block.
    async fn get(&self, namespace: &str, name: &str) -> Result<Value, ClusterApiError>;

    /// Returns the last `lines` lines written by `container` in the driver pod.
    async fn driver_log_tail(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        lines: i64,
    ) -> Result<Vec<String>, ClusterApiError>;
}

#[derive(Dbg, Clone)]
pub struct KubeSparkApplicationApi {
    #[dbg(skip)]
    client: Client,
    resource: ApiResource,
}

impl KubeSparkApplicationApi {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(SPARK_API_GROUP, SPARK_API_VERSION, SPARK_APPLICATION_KIND);
        Self {
            client,
            resource: ApiResource::from_gvk_with_plural(&gvk, SPARK_APPLICATION_PLURAL),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl SparkApplicationApi for KubeSparkApplicationApi {
    #[tracing::instrument(
        "spark_application/create",
        level = Level::TRACE,
        skip(self, manifest),
        fields(kubernetes_namespace = %namespace)
    )]
    async fn create(
        &self,
        namespace: &str,
        manifest: &SubmissionManifest,
    ) -> Result<Value, ClusterApiError> {
        let object: DynamicObject = serde_json::from_value(manifest.to_value())?;
        let params = PostParams {
            field_manager: Some(MANAGER_ROLE_NAME.to_string()),
            ..Default::default()
        };

        let created = self.api(namespace).create(&params, &object).await?;
        Ok(serde_json::to_value(created)?)
    }

    #[tracing::instrument(
        "spark_application/get",
        level = Level::TRACE,
        skip(self),
        fields(kubernetes_namespace = %namespace, spark_application_name = %name)
    )]
    async fn get(&self, namespace: &str, name: &str) -> Result<Value, ClusterApiError> {
        let object = self.api(namespace).get(name).await?;
        Ok(serde_json::to_value(object)?)
    }

    async fn driver_log_tail(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        lines: i64,
    ) -> Result<Vec<String>, ClusterApiError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(lines),
            ..Default::default()
        };

        async {
            let stream = pods.log_stream(pod_name, &params).await?;
            let lines: Vec<String> = stream.lines().try_collect().await?;
            Ok(lines)
        }
        .instrument(trace_span!(
            "stream_driver_log",
            kubernetes_namespace = %namespace,
            pod_name = %pod_name,
            container = %container
        ))
        .await
    }
}
