use std::collections::BTreeMap;

use crate::config::SparkSettings;

pub(crate) const DRIVER_MEMORY: &str = "600m";
pub(crate) const DRIVER_CORES: i64 = 1;
pub(crate) const NUM_EXECUTORS: i64 = 1;
pub(crate) const EXECUTOR_MEMORY: &str = "600m";
pub(crate) const EXECUTOR_CORES: i64 = 1;
pub(crate) const LABEL_VERSION: &str = "3.3.1";
pub(crate) const SERVICE_ACCOUNT: &str = "spark";

pub(crate) const APPLICATION_TYPE: &str = "Python";
pub(crate) const DEPLOY_MODE: &str = "cluster";
pub(crate) const SPARK_VERSION: &str = "3.3.1";
pub(crate) const IMAGE_PULL_POLICY: &str = "Always";
pub(crate) const RESTART_POLICY: &str = "Never";
pub(crate) const TIME_TO_LIVE_SECONDS: i64 = 60;

pub(crate) const IMAGE_PULL_POLICIES: &[&str] = &["Always", "Never", "IfNotPresent"];
pub(crate) const RESTART_POLICIES: &[&str] = &["Never", "Always", "OnFailure"];

/// Always shipped ahead of the job's own packages.
pub(crate) const BASE_PACKAGE: &str = "org.postgresql:postgresql:42.5.0";

pub(crate) const SCRATCH_VOLUME_NAME: &str = "test-volume";
pub(crate) const SCRATCH_VOLUME_PATH: &str = "/tmp";

/// Tag used for untagged images in the `dev` deployment mode.
pub(crate) const DEV_IMAGE_TAG: &str = "develop";

const JARS_PACKAGES: &str = "org.postgresql:postgresql:42.5.0,com.clickhouse:clickhouse-jdbc:0.6.0,org.apache.httpcomponents.client5:httpclient5:5.3.1";
const TIMEOUT_MILLIS: &str = "60000";

/// Spark configuration shared by every application, before per-job overrides.
pub(crate) fn base_spark_conf(settings: &SparkSettings) -> BTreeMap<String, String> {
    let mut conf: BTreeMap<String, String> = [
        ("spark.jars.packages", JARS_PACKAGES),
        ("spark.jars.ivy", "/tmp/ivy"),
        ("spark.sql.catalogImplementation", "hive"),
        (
            "spark.kubernetes.executor.volumes.persistentVolumeClaim.data.options.claimName",
            "OnDemand",
        ),
        (
            "spark.kubernetes.executor.volumes.persistentVolumeClaim.data.options.storageClass",
            "yc-network-ssd",
        ),
        (
            "spark.kubernetes.executor.volumes.persistentVolumeClaim.data.options.sizeLimit",
            "50Gi",
        ),
        (
            "spark.kubernetes.executor.volumes.persistentVolumeClaim.data.mount.path",
            "/data",
        ),
        ("spark.kubernetes.submission.connectionTimeout", TIMEOUT_MILLIS),
        ("spark.kubernetes.submission.requestTimeout", TIMEOUT_MILLIS),
        ("spark.kubernetes.driver.connectionTimeout", TIMEOUT_MILLIS),
        ("spark.kubernetes.driver.requestTimeout", TIMEOUT_MILLIS),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    if let Some(s3) = &settings.s3 {
        conf.extend([
            ("spark.hadoop.fs.s3a.endpoint".to_string(), s3.endpoint.clone()),
            ("spark.hadoop.fs.s3a.access.key".to_string(), s3.access_key.clone()),
            ("spark.hadoop.fs.s3a.secret.key".to_string(), s3.secret_key.clone()),
            (
                "spark.hadoop.fs.s3a.connection.ssl.enabled".to_string(),
                "false".to_string(),
            ),
            (
                "spark.hadoop.fs.s3a.aws.credentials.provider".to_string(),
                "org.apache.hadoop.fs.s3a.SimpleAWSCredentialsProvider".to_string(),
            ),
            (
                "spark.hadoop.fs.s3a.path.style.access".to_string(),
                "true".to_string(),
            ),
        ]);
    }

    if let Some(hive) = &settings.hive_metastore {
        conf.extend([
            (
                "spark.hadoop.javax.jdo.option.ConnectionURL".to_string(),
                hive.url.clone(),
            ),
            (
                "spark.hadoop.javax.jdo.option.ConnectionUserName".to_string(),
                hive.user.clone(),
            ),
            (
                "spark.hadoop.javax.jdo.option.ConnectionPassword".to_string(),
                hive.password.clone(),
            ),
            (
                "spark.hadoop.javax.jdo.option.ConnectionDriverName".to_string(),
                "org.postgresql.Driver".to_string(),
            ),
        ]);
    }

    conf.extend(settings.conf.clone());
    conf
}
