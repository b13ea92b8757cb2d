use async_trait::async_trait;
use reqwest::{Certificate, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::{Level, debug, info};

#[cfg(test)]
use mockall::automock;

use super::defaults::DEV_IMAGE_TAG;
use super::validate::ValidationError;
use super::ManifestError;
use crate::config::{DeploymentMode, RegistryConfig};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read CA certificate '{path}': {source}")]
    CertificateIo {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid registry client configuration: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Registry request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("There is no tag in the repository for '{name}'. Make sure the image is deployed with a tag.")]
pub struct NoTagFoundError {
    pub name: String,
}

/// Lists the published versions of an image.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn list_versions(&self, name: &str) -> Result<Vec<String>, RegistryError>;
}

/// Nexus-style search API: `GET {url}?repository=..&name=..&sort=version`.
#[derive(Debug, Clone)]
pub struct NexusRegistry {
    client: Client,
    url: String,
    repository: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    version: String,
}

impl NexusRegistry {
    pub async fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(path) = &config.ca_cert {
            let pem = tokio::fs::read(path)
                .await
                .map_err(|source| RegistryError::CertificateIo {
                    path: path.clone(),
                    source,
                })?;
            let certificate = Certificate::from_pem(&pem).map_err(RegistryError::Client)?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder.build().map_err(RegistryError::Client)?;
        info!(url = %config.url, repository = %config.repository, "Image registry client initialized.");

        Ok(Self {
            client,
            url: config.url.clone(),
            repository: config.repository.clone(),
        })
    }

    #[cfg(test)]
    fn with_timeout(url: &str, timeout: std::time::Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap(),
            url: url.to_string(),
            repository: "docker-private".to_string(),
        }
    }
}

#[async_trait]
impl ImageRegistry for NexusRegistry {
    #[tracing::instrument("registry/list_versions", level = Level::TRACE, skip(self))]
    async fn list_versions(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let response: SearchResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("repository", self.repository.as_str()),
                ("name", name),
                ("sort", "version"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.items.into_iter().map(|item| item.version).collect())
    }
}

/// Position of a version relative to its bare release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    PreRelease,
    Final,
    PostRelease,
}

impl Stage {
    /// `+local` and `post`/`rev`/`r` suffixes rank above the release, anything else below it.
    fn of_suffix(suffix: &str) -> Self {
        if suffix.is_empty() {
            return Stage::Final;
        }
        if suffix.starts_with('+') {
            return Stage::PostRelease;
        }
        let label = suffix
            .trim_start_matches(['.', '-', '_'])
            .to_ascii_lowercase();
        if ["post", "rev", "r"]
            .iter()
            .any(|p| label.starts_with(p) && !label.starts_with("rc"))
        {
            Stage::PostRelease
        } else {
            Stage::PreRelease
        }
    }
}

/// Ordering key for a version string. Entries not starting with a digit rank as `0.0`;
/// a pre-release suffix ranks below the bare release, a post-release or local suffix above it.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct VersionKey {
    release: Vec<u64>,
    stage: Stage,
}

impl VersionKey {
    fn parse(version: &str) -> Self {
        if !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Self {
                release: Vec::new(),
                stage: Stage::Final,
            };
        }

        let numeric_len = version
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(version.len());
        let (numeric, suffix) = version.split_at(numeric_len);
        let (numeric, suffix) = match numeric.strip_suffix('.') {
            Some(trimmed) if !suffix.is_empty() => (trimmed, &version[trimmed.len()..]),
            _ => (numeric, suffix),
        };

        let mut release: Vec<u64> = numeric
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse().unwrap_or(u64::MAX))
            .collect();
        while release.last() == Some(&0) {
            release.pop();
        }

        Self {
            release,
            stage: Stage::of_suffix(suffix),
        }
    }

    fn is_zero(&self) -> bool {
        self.release.is_empty()
    }
}

/// Highest version among `versions`.
pub fn get_latest_tag<'a>(name: &str, versions: &'a [String]) -> Result<&'a str, NoTagFoundError> {
    versions
        .iter()
        .map(|v| (VersionKey::parse(v), v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .filter(|(key, _)| !key.is_zero())
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| NoTagFoundError {
            name: name.to_string(),
        })
}

fn has_tag(image: &str) -> bool {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    last_segment.contains(':') || image.contains('@')
}

/// Pins an untagged image reference to a concrete tag.
#[tracing::instrument("manifest/resolve_image", level = Level::TRACE, skip(registry))]
pub async fn resolve_image(
    image: &str,
    mode: &DeploymentMode,
    registry: Option<&dyn ImageRegistry>,
) -> Result<String, ManifestError> {
    if has_tag(image) {
        return Ok(image.to_string());
    }

    let (prefix, name) = image.rsplit_once('/').ok_or_else(|| {
        ValidationError::new(
            "image",
            "An untagged image must have the form '<registry>/<name>'",
        )
    })?;

    if mode.is_dev() {
        debug!(image, tag = DEV_IMAGE_TAG, "Using the development tag.");
        return Ok(format!("{prefix}/{name}:{DEV_IMAGE_TAG}"));
    }

    let registry = registry.ok_or_else(|| ManifestError::RegistryNotConfigured {
        image: image.to_string(),
    })?;
    let versions = registry.list_versions(name).await?;
    let tag = get_latest_tag(name, &versions)?;
    info!(image, tag, "Resolved the latest image tag.");

    Ok(format!("{prefix}/{name}:{tag}"))
}
