//! Dockerfile source acquisition.
//!
//! An image identifier is either a local Dockerfile path or a registry
//! reference. Local files win; anything else must look like a reference
//! and is fetched through a [`DockerfileFetcher`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ocifit_core::error::{FitError, Result};

use crate::oci::{is_docker_uri, reconstruct_dockerfile, ImageReference, RegistryClient};

/// Fetches Dockerfile text for a registry reference.
#[async_trait]
pub trait DockerfileFetcher: Send + Sync {
    async fn fetch_dockerfile(&self, uri: &str) -> Result<String>;
}

/// Fetcher that rebuilds a Dockerfile from the image config in a registry.
pub struct RegistryDockerfileFetcher {
    client: RegistryClient,
}

impl RegistryDockerfileFetcher {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }
}

impl Default for RegistryDockerfileFetcher {
    fn default() -> Self {
        Self::new(RegistryClient::new())
    }
}

#[async_trait]
impl DockerfileFetcher for RegistryDockerfileFetcher {
    async fn fetch_dockerfile(&self, uri: &str) -> Result<String> {
        let reference = ImageReference::parse(uri)?;
        let config = self
            .client
            .pull_config(&reference)
            .await
            .map_err(|e| FitError::AcquisitionFailure {
                reference: uri.to_string(),
                message: e.to_string(),
            })?;

        let dockerfile = reconstruct_dockerfile(&config);
        tracing::debug!(
            uri,
            lines = dockerfile.lines().count(),
            "Reconstructed Dockerfile from image config"
        );
        Ok(dockerfile)
    }
}

/// Dockerfile content and the registry reference it came from, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredSource {
    pub content: String,
    pub uri: Option<String>,
}

/// Resolves image identifiers to Dockerfile content.
pub struct SourceAcquirer {
    fetcher: Arc<dyn DockerfileFetcher>,
}

impl SourceAcquirer {
    pub fn new(fetcher: Arc<dyn DockerfileFetcher>) -> Self {
        Self { fetcher }
    }

    /// Read a local Dockerfile or fetch one by reference.
    ///
    /// A directory resolves to the `Dockerfile` inside it.
    pub async fn resolve(&self, image: &str) -> Result<AcquiredSource> {
        let local = absolute_path(image)?;
        if local.exists() {
            let path = if local.is_dir() {
                local.join("Dockerfile")
            } else {
                local
            };
            let content = read_local(&path)?;
            tracing::info!(path = %path.display(), "Read local Dockerfile");
            return Ok(AcquiredSource { content, uri: None });
        }

        if !is_docker_uri(image) {
            return Err(FitError::InvalidImageReference(image.to_string()));
        }

        tracing::info!(uri = image, "Fetching Dockerfile from registry");
        let content = self.fetcher.fetch_dockerfile(image).await?;
        Ok(AcquiredSource {
            content,
            uri: Some(image.to_string()),
        })
    }
}

/// Absolute form of `image`, used only to probe the local filesystem.
fn absolute_path(image: &str) -> Result<PathBuf> {
    let path = Path::new(image);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn read_local(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| FitError::AcquisitionFailure {
        reference: path.display().to_string(),
        message: e.to_string(),
    })
}
