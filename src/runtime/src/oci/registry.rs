//! OCI registry client for reading image configs and layers.
//!
//! Uses the `oci-distribution` crate to talk to container registries
//! (Docker Hub, GHCR, etc.). Everything is kept in memory: ocifit never
//! writes an image layout to disk.

use ocifit_core::error::{FitError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciImageManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use oci_spec::image::ImageConfiguration;

use super::reference::ImageReference;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    /// Convert to oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// A layer blob pulled into memory.
#[derive(Debug, Clone)]
pub struct LayerBlob {
    /// Layer digest (e.g., "sha256:abc123...")
    pub digest: String,
    /// Layer media type (gzip or uncompressed tar)
    pub media_type: String,
    /// Raw blob bytes
    pub data: Vec<u8>,
}

/// Reads manifests, configs and layers from container registries.
pub struct RegistryClient {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryClient {
    /// Create a client with credentials from the environment.
    pub fn new() -> Self {
        Self::with_auth(RegistryAuth::from_env())
    }

    /// Create a client with the given authentication.
    pub fn with_auth(auth: RegistryAuth) -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            platform_resolver: Some(Box::new(linux_platform_resolver)),
            ..Default::default()
        };
        let client = Client::new(config);

        Self { client, auth }
    }

    /// Pull the image configuration (env, labels, history, ...).
    pub async fn pull_config(&self, reference: &ImageReference) -> Result<ImageConfiguration> {
        let oci_ref = to_oci_reference(reference)?;
        let manifest = self.pull_manifest(reference, &oci_ref).await?;

        let mut config_data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&oci_ref, &manifest.config, &mut config_data)
            .await
            .map_err(|e| FitError::RegistryError {
                registry: reference.registry.clone(),
                message: format!("Failed to pull config blob: {}", e),
            })?;

        let config: ImageConfiguration = serde_json::from_slice(&config_data)?;
        Ok(config)
    }

    /// Pull layer blobs bottom to top, handing each to `visit` before the
    /// next one is fetched. Returns the number of layers visited.
    pub async fn for_each_layer<F>(&self, reference: &ImageReference, mut visit: F) -> Result<usize>
    where
        F: FnMut(LayerBlob) -> Result<()> + Send,
    {
        let oci_ref = to_oci_reference(reference)?;
        let manifest = self.pull_manifest(reference, &oci_ref).await?;

        for layer in &manifest.layers {
            tracing::debug!(
                digest = %layer.digest,
                size = layer.size,
                "Pulling layer"
            );

            let mut data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(&oci_ref, layer, &mut data)
                .await
                .map_err(|e| FitError::RegistryError {
                    registry: reference.registry.clone(),
                    message: format!("Failed to pull layer {}: {}", layer.digest, e),
                })?;

            visit(LayerBlob {
                digest: layer.digest.clone(),
                media_type: layer.media_type.clone(),
                data,
            })?;
        }

        Ok(manifest.layers.len())
    }

    /// Pull the manifest, resolving multi-arch indexes to the linux platform.
    async fn pull_manifest(
        &self,
        reference: &ImageReference,
        oci_ref: &Reference,
    ) -> Result<OciImageManifest> {
        tracing::info!(reference = %reference, "Pulling manifest");

        let auth = self.auth.to_oci_auth();
        let (manifest, digest) = self
            .client
            .pull_image_manifest(oci_ref, &auth)
            .await
            .map_err(|e| FitError::RegistryError {
                registry: reference.registry.clone(),
                message: format!("Failed to pull manifest: {}", e),
            })?;

        tracing::debug!(
            reference = %reference,
            digest = %digest,
            layers = manifest.layers.len(),
            "Pulled manifest"
        );

        Ok(manifest)
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert an ImageReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = if let Some(ref digest) = reference.digest {
        format!("{}/{}@{}", reference.registry, reference.repository, digest)
    } else if let Some(ref tag) = reference.tag {
        format!("{}/{}:{}", reference.registry, reference.repository, tag)
    } else {
        format!("{}/{}:latest", reference.registry, reference.repository)
    };

    ref_str.parse::<Reference>().map_err(|e| FitError::RegistryError {
        registry: reference.registry.clone(),
        message: format!("Invalid OCI reference '{}': {}", ref_str, e),
    })
}

/// Platform resolver that always selects linux images matching the host architecture.
///
/// Compatibility is reported for the linux image the host would run.
fn linux_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };

    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == "linux" && p.architecture == arch)
        })
        .map(|entry| entry.digest.clone())
}
