pub mod spark_application;

pub(crate) const MANAGER_ROLE_NAME: &str = "sparkjob";

pub(crate) const SPARK_API_GROUP: &str = "sparkoperator.k8s.io";
pub(crate) const SPARK_API_VERSION: &str = "v1beta2";
pub(crate) const SPARK_APPLICATION_KIND: &str = "SparkApplication";
pub(crate) const SPARK_APPLICATION_PLURAL: &str = "sparkapplications";

pub(crate) const DEFAULT_NAMESPACE: &str = "spark";
pub(crate) const DRIVER_CONTAINER_NAME: &str = "spark-kubernetes-driver";
