use crate::error::{OciError, Result};
use std::fmt;

/// Registry assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed when a reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

const MAX_TAG_LEN: usize = 128;
const MAX_REPOSITORY_LEN: usize = 255;

// ---------------------------------------------------------------------------
// ImageRef
// ---------------------------------------------------------------------------

/// Tag or digest part of an image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(String),
}

/// A parsed and validated image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry hostname (e.g. "docker.io", "localhost:5000").
    pub registry: String,
    /// Repository path (e.g. "library/alpine").
    pub repository: String,
    /// Tag or digest.
    pub reference: Reference,
}

impl ImageRef {
    /// Parse a raw image reference string.
    ///
    /// Supported formats:
    /// - `alpine:latest`
    /// - `ubuntu`
    /// - `ghcr.io/foo/bar:v1`
    /// - `localhost:5000/repo`
    /// - `my.registry.io/org/repo@sha256:<64 hex>`
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(OciError::Reference("empty image reference".to_string()));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(OciError::Reference(format!(
                "invalid reference '{}': contains whitespace or control characters",
                raw
            )));
        }

        // Split off the reference (tag or digest).
        let (name_part, reference) = if let Some(at_pos) = raw.find('@') {
            let digest = &raw[at_pos + 1..];
            validate_digest(digest)?;
            (&raw[..at_pos], Reference::Digest(digest.to_string()))
        } else if let Some(colon_pos) = raw.rfind(':') {
            // A tag colon always comes after the last '/', otherwise it is a
            // registry port (e.g. "localhost:5000/repo").
            let after_last_slash = raw.rfind('/').map(|p| p + 1).unwrap_or(0);
            if colon_pos > after_last_slash {
                let tag = &raw[colon_pos + 1..];
                validate_tag(tag)?;
                (&raw[..colon_pos], Reference::Tag(tag.to_string()))
            } else {
                (raw, Reference::Tag(DEFAULT_TAG.to_string()))
            }
        } else {
            (raw, Reference::Tag(DEFAULT_TAG.to_string()))
        };

        // A first component is a registry hostname when it contains a dot,
        // a colon (port), or is exactly "localhost".
        let (registry, repository) = match name_part.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                validate_registry(first)?;
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), name_part.to_string()),
        };

        validate_repository(&repository)?;

        // Docker Hub official images live under "library/".
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    /// Parse a reference that must name a tag (digest references are
    /// rejected because they cannot be assigned to an image).
    pub fn parse_tag(raw: &str) -> Result<Self> {
        let parsed = Self::parse(raw)?;
        if let Reference::Digest(_) = parsed.reference {
            return Err(OciError::Reference(format!(
                "'{}' is a digest reference, expected a tag",
                raw
            )));
        }
        Ok(parsed)
    }

    /// Tag name, if this reference is a tag.
    pub fn tag(&self) -> Option<&str> {
        match &self.reference {
            Reference::Tag(tag) => Some(tag),
            Reference::Digest(_) => None,
        }
    }

    /// Short form the Docker CLI prints: default registry and the
    /// `library/` prefix are dropped (`alpine:latest`).
    pub fn familiar(&self) -> String {
        let name = if self.registry == DEFAULT_REGISTRY {
            self.repository
                .strip_prefix("library/")
                .unwrap_or(&self.repository)
                .to_string()
        } else {
            format!("{}/{}", self.registry, self.repository)
        };
        match &self.reference {
            Reference::Tag(tag) => format!("{}:{}", name, tag),
            Reference::Digest(digest) => format!("{}@{}", name, digest),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        match &self.reference {
            Reference::Tag(tag) => write!(f, ":{}", tag),
            Reference::Digest(digest) => write!(f, "@{}", digest),
        }
    }
}

// ---------------------------------------------------------------------------
// Grammar checks
// ---------------------------------------------------------------------------

fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let valid_first = chars
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

    if !valid_first || !valid_rest || tag.len() > MAX_TAG_LEN {
        return Err(OciError::Reference(format!(
            "invalid tag '{}': must match [A-Za-z0-9_][A-Za-z0-9_.-]{{0,127}}",
            tag
        )));
    }
    Ok(())
}

fn validate_digest(digest: &str) -> Result<()> {
    let hex = digest.strip_prefix("sha256:").ok_or_else(|| {
        OciError::Reference(format!("unsupported digest algorithm in '{}'", digest))
    })?;
    if hex.len() != 64 || !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return Err(OciError::Reference(format!(
            "invalid digest '{}': expected 64 lowercase hex characters",
            digest
        )));
    }
    Ok(())
}

fn validate_registry(registry: &str) -> Result<()> {
    let valid = !registry.is_empty()
        && registry
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    if !valid {
        return Err(OciError::Reference(format!(
            "invalid registry '{}'",
            registry
        )));
    }
    Ok(())
}

fn validate_repository(repository: &str) -> Result<()> {
    if repository.is_empty() || repository.len() > MAX_REPOSITORY_LEN {
        return Err(OciError::Reference(format!(
            "invalid repository '{}': length must be 1..={}",
            repository, MAX_REPOSITORY_LEN
        )));
    }
    for component in repository.split('/') {
        if !is_path_component(component) {
            return Err(OciError::Reference(format!(
                "invalid repository '{}': component '{}' must be lowercase alphanumerics \
                 joined by '.', '_', '__' or '-'",
                repository, component
            )));
        }
    }
    Ok(())
}

/// `[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*`
fn is_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    let (Some(&first), Some(&last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    if !alnum(first) || !alnum(last) {
        return false;
    }

    let mut i = 0;
    while i < bytes.len() {
        if alnum(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !alnum(bytes[i]) {
            i += 1;
        }
        let separator = &component[start..i];
        let ok = matches!(separator, "." | "_" | "__") || separator.bytes().all(|b| b == b'-');
        if !ok {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
