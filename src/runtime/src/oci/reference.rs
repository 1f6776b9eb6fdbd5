//! OCI image reference parsing.
//!
//! Parses image references like `ghcr.io/rse-ops/openmpi:4.1` into structured
//! components, and decides whether an identifier is shaped like a registry
//! reference at all.

use ocifit_core::error::{FitError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Maximum tag length accepted by the distribution spec.
const MAX_TAG_LEN: usize = 128;

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/ubuntu", "rse-ops/openmpi")
    pub repository: String,
    /// Tag (e.g., "latest", "4.1")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

/// Name, tag and digest as written, before defaults are applied.
struct RawParts<'a> {
    name: &'a str,
    tag: Option<&'a str>,
    digest: Option<&'a str>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `ubuntu` → docker.io/library/ubuntu:latest
    /// - `ubuntu:22.04` → docker.io/library/ubuntu:22.04
    /// - `myuser/myimage` → docker.io/myuser/myimage:latest
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let raw = split_raw(reference)?;
        let (registry, repository) = split_registry_repository(raw.name, reference)?;

        // Apply default tag if no tag and no digest
        let tag = match (raw.tag, raw.digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest: raw.digest.map(str::to_string),
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Whether `reference` is a syntactically valid registry reference.
///
/// Stricter than [`ImageReference::parse`]: the identifier must name a
/// registry host, a tag or a digest explicitly, so a bare word such as a
/// mistyped file name is never taken for `docker.io/library/<word>`.
/// Repository components must be lowercase `[a-z0-9]` runs joined by
/// `.`, `_`, `__` or `-`.
pub fn is_docker_uri(reference: &str) -> bool {
    if reference.is_empty() || reference.chars().any(char::is_whitespace) {
        return false;
    }
    if reference.starts_with(&['/', '.', '~'][..]) {
        return false;
    }
    let Ok(raw) = split_raw(reference) else {
        return false;
    };
    let Ok((registry, repository)) = split_registry_repository(raw.name, reference) else {
        return false;
    };

    let explicit_registry = raw.name.starts_with(&format!("{}/", registry));
    if !explicit_registry && raw.tag.is_none() && raw.digest.is_none() {
        return false;
    }
    if !is_valid_host(&registry) {
        return false;
    }
    if !repository.split('/').all(is_valid_component) {
        return false;
    }
    if let Some(tag) = raw.tag {
        if !is_valid_tag(tag) {
            return false;
        }
    }
    match raw.digest {
        Some(digest) => is_valid_digest(digest),
        None => true,
    }
}

/// Split off digest (`@`) and tag (`:` after the last `/`).
fn split_raw(reference: &str) -> Result<RawParts<'_>> {
    if reference.is_empty() {
        return Err(FitError::InvalidImageReference(reference.to_string()));
    }

    let (name_tag, digest) = match reference.rfind('@') {
        Some(at_pos) => {
            let digest_part = &reference[at_pos + 1..];
            if !digest_part.contains(':') {
                return Err(FitError::InvalidImageReference(reference.to_string()));
            }
            (&reference[..at_pos], Some(digest_part))
        }
        None => (reference, None),
    };

    let (name, tag) = match name_tag.rfind('/') {
        Some(slash_pos) => {
            let after_slash = &name_tag[slash_pos + 1..];
            match after_slash.rfind(':') {
                Some(colon_pos) => (
                    &name_tag[..slash_pos + 1 + colon_pos],
                    Some(&after_slash[colon_pos + 1..]),
                ),
                None => (name_tag, None),
            }
        }
        None => match name_tag.rfind(':') {
            // Without a slash the colon always introduces a tag ("ubuntu:22")
            Some(colon_pos) => (&name_tag[..colon_pos], Some(&name_tag[colon_pos + 1..])),
            None => (name_tag, None),
        },
    };

    if name.is_empty() || tag == Some("") {
        return Err(FitError::InvalidImageReference(reference.to_string()));
    }

    Ok(RawParts { name, tag, digest })
}

/// Split a name into registry and repository components.
fn split_registry_repository(name: &str, reference: &str) -> Result<(String, String)> {
    // The first component is a registry hostname if it contains a dot or
    // colon, or is "localhost"
    if let Some(slash_pos) = name.find('/') {
        let first = &name[..slash_pos];
        if first.contains('.') || first.contains(':') || first == "localhost" {
            let repo = &name[slash_pos + 1..];
            if repo.is_empty() {
                return Err(FitError::InvalidImageReference(reference.to_string()));
            }
            return Ok((first.to_string(), repo.to_string()));
        }
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        // Single name like "ubuntu" → "library/ubuntu" for Docker Hub
        format!("library/{}", name)
    };

    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

fn is_valid_host(host: &str) -> bool {
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    !name.is_empty()
        && name.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn is_valid_component(component: &str) -> bool {
    if component.is_empty() {
        return false;
    }
    let bytes = component.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    // Separators: '.', '-', '_' or '__', never adjacent otherwise
    let mut prev_sep: Option<u8> = None;
    let mut run = 0;
    for &b in bytes {
        if is_alnum(b) {
            prev_sep = None;
            run = 0;
            continue;
        }
        match (b, prev_sep) {
            (b'-', None) | (b'.', None) | (b'_', None) => {}
            (b'-', Some(b'-')) => {}
            (b'_', Some(b'_')) if run == 1 => {}
            _ => return false,
        }
        prev_sep = Some(b);
        run += 1;
    }
    true
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= MAX_TAG_LEN && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn is_valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-'))
                && !hex.is_empty()
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}
