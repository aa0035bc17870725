pub mod archive;
pub mod error;
pub mod layer;
pub mod manifest;
pub mod reference;

pub use error::{OciError, Result};
pub use layer::{Compression, Layer};
pub use manifest::ConfigFile;
pub use reference::{ImageRef, Reference};

use manifest::{Descriptor, History, OciManifest, MEDIA_TYPE_OCI_CONFIG, MEDIA_TYPE_OCI_MANIFEST};
use tracing::debug;

/// An immutable in-memory image: one config plus an ordered layer list.
///
/// Every operation consumes the image and returns a new one, so a value
/// that has been handed out never changes underneath its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    config: ConfigFile,
    layers: Vec<Layer>,
}

impl Image {
    /// The scratch image: no layers, no platform, an empty layer chain.
    pub fn empty() -> Self {
        Self {
            config: ConfigFile::default(),
            layers: Vec::new(),
        }
    }

    /// Replace the image config.
    ///
    /// The layer chain (`rootfs`) and layer history already recorded on the
    /// image are kept; everything else comes from `config`.
    pub fn with_config(mut self, mut config: ConfigFile) -> Result<Self> {
        if config.architecture.is_empty() || config.os.is_empty() {
            return Err(OciError::Config(
                "image config must name both architecture and os".to_string(),
            ));
        }
        config.rootfs = std::mem::take(&mut self.config.rootfs);
        config.history = std::mem::take(&mut self.config.history);
        self.config = config;
        Ok(self)
    }

    /// Append layers on top of the existing ones, preserving their order.
    pub fn append_layers(mut self, layers: impl IntoIterator<Item = Layer>) -> Self {
        for layer in layers {
            debug!(
                index = self.layers.len(),
                digest = %layer.digest(),
                size = layer.size(),
                "appending layer",
            );
            self.config.rootfs.diff_ids.push(layer.diff_id().to_string());
            self.config.history.push(History {
                created: self.config.created.clone(),
                ..Default::default()
            });
            self.layers.push(layer);
        }
        self
    }

    pub fn config_file(&self) -> &ConfigFile {
        &self.config
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Serialized config blob.
    pub fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.config)?)
    }

    pub fn config_digest(&self) -> Result<String> {
        Ok(layer::sha256_digest(&self.raw_config()?))
    }

    /// OCI manifest describing the config and layer blobs.
    pub fn manifest(&self) -> Result<OciManifest> {
        let raw_config = self.raw_config()?;
        Ok(OciManifest {
            schema_version: 2,
            media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
            config: Descriptor {
                media_type: MEDIA_TYPE_OCI_CONFIG.to_string(),
                digest: layer::sha256_digest(&raw_config),
                size: raw_config.len() as u64,
            },
            layers: self.layers.iter().map(Layer::descriptor).collect(),
        })
    }

    /// Image identity: the digest of the serialized manifest.
    pub fn digest(&self) -> Result<String> {
        let raw = serde_json::to_vec(&self.manifest()?)?;
        Ok(layer::sha256_digest(&raw))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
