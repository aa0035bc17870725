//! Build request model
//!
//! A [`BuildRequest`] is everything one image build needs: startup
//! metadata, the ordered layer sources, and the tags to publish under.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Maximum number of layers a single image may carry.
pub const MAX_LAYERS: usize = 255;

/// Caller-supplied description of one image build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub work_dir: String,
    #[serde(default)]
    pub stop_signal: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub on_build: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// `KEY=VALUE` entries, in order.
    #[serde(default)]
    pub env_vars: Vec<String>,
    #[serde(default)]
    pub volumes: BTreeSet<String>,
    /// Port specs such as `8080/tcp`.
    #[serde(default)]
    pub exposed_ports: BTreeSet<String>,
    /// `amd64` or `arm64`; empty means `amd64`.
    #[serde(default)]
    pub architecture: String,
    /// Base image. Only the empty (scratch) base is supported.
    #[serde(default)]
    pub from: String,
    /// Layer sources, bottom layer first.
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    /// `tags[0]` is the primary tag; the rest are aliases.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BuildRequest {
    /// Check the request-level invariants that do not need the filesystem,
    /// in build order, and return the normalized architecture.
    pub fn validate(&self) -> Result<Architecture> {
        if self.entrypoint.is_empty() && self.cmd.is_empty() {
            return Err(Error::MissingStartupInfo);
        }

        if self.layers.is_empty() {
            return Err(Error::NoLayers);
        }
        if self.layers.len() > MAX_LAYERS {
            return Err(Error::TooManyLayers(self.layers.len()));
        }

        let arch = Architecture::normalize(&self.architecture)?;

        if !self.from.is_empty() {
            return Err(Error::UnsupportedBaseImage(self.from.clone()));
        }

        Ok(arch)
    }

    pub fn primary_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }

    pub fn secondary_tags(&self) -> &[String] {
        self.tags.get(1..).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// Where a layer's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// A pre-built tar archive, used verbatim.
    #[serde(alias = "tar")]
    Archive,
    /// A directory tree, archived during the build.
    #[serde(alias = "dir")]
    Directory,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Archive => write!(f, "archive"),
            LayerKind::Directory => write!(f, "directory"),
        }
    }
}

/// One layer of the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    pub kind: LayerKind,
    pub source: PathBuf,
    #[serde(default)]
    pub params: Option<LayerParams>,
}

/// Extra options for directory sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerParams {
    /// Image path the directory is placed at. Empty means `/`.
    #[serde(default)]
    pub target_path: String,
}

impl LayerSpec {
    pub fn archive(source: impl Into<PathBuf>) -> Self {
        Self {
            kind: LayerKind::Archive,
            source: source.into(),
            params: None,
        }
    }

    pub fn directory(source: impl Into<PathBuf>) -> Self {
        Self {
            kind: LayerKind::Directory,
            source: source.into(),
            params: None,
        }
    }

    pub fn with_target_path(mut self, target_path: impl Into<String>) -> Self {
        self.params = Some(LayerParams {
            target_path: target_path.into(),
        });
        self
    }

    /// Root the layer's entries are placed under.
    pub fn target_path(&self) -> &str {
        match &self.params {
            Some(params) if !params.target_path.is_empty() => &params.target_path,
            _ => "/",
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Architecture
// ---------------------------------------------------------------------------

/// Supported image architectures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Architecture {
    #[default]
    Amd64,
    Arm64,
}

impl Architecture {
    /// Map a request value to an architecture; the empty string means amd64.
    pub fn normalize(raw: &str) -> Result<Self> {
        match raw {
            "" | "amd64" => Ok(Self::Amd64),
            "arm64" => Ok(Self::Arm64),
            other => Err(Error::BadArchitecture(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
