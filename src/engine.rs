//! Build orchestration
//!
//! [`Engine::build`] runs one build end to end on the calling thread:
//!
//! 1. validate the request (startup info, layer count, architecture, base)
//! 2. configure an empty image
//! 3. validate and synthesize every layer, in order
//! 4. append the layers and resolve the primary tag
//! 5. load into the daemon under the primary tag, then alias the rest
//!
//! The first failure aborts the build; nothing is published before the
//! image is fully assembled.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use stratum_oci::manifest::{object_set, ContainerConfig};
use stratum_oci::{ConfigFile, Image, ImageRef, Layer};
use tracing::{debug, info, warn};

use crate::layer::{layer_from_archive, layer_from_dir};
use crate::publish::{
    apply_secondary_tags, publish_primary, Daemon, DockerCli, RegistryPush, TagOutcome,
};
use crate::request::{Architecture, BuildRequest, LayerKind, LayerSpec};
use crate::source::validate_source;
use crate::{Error, Result};

/// Author recorded in every image config.
pub const AUTHOR: &str = "stratum";

/// Operating system recorded in every image config.
pub const OS: &str = "linux";

/// Engine-wide switches, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Log the daemon's load response at info level instead of debug.
    pub show_build_logs: bool,
    /// Load the image into the local daemon.
    pub push_to_daemon: bool,
    /// Push to a remote registry (not implemented).
    pub push_to_registry: bool,
}

impl EngineConfig {
    pub fn new(show_build_logs: bool, push_to_daemon: bool, push_to_registry: bool) -> Self {
        Self {
            show_build_logs,
            push_to_daemon,
            push_to_registry,
        }
    }
}

/// A fully assembled image and the tag it will be published under.
#[derive(Debug, Clone)]
pub struct AssembledImage {
    pub image: Image,
    pub tag: ImageRef,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Manifest digest of the assembled image.
    pub image_digest: String,
    /// Primary tag, in the short docker form.
    pub primary_tag: String,
    /// Daemon response to the load, when the image was loaded.
    pub load_response: Option<String>,
    /// One entry per secondary tag, in request order.
    pub secondary_tags: Vec<TagOutcome>,
    pub registry: RegistryPush,
}

/// The image build engine.
///
/// Holds only immutable configuration and a daemon handle, so one engine
/// can serve concurrent builds; each build owns its own buffers.
pub struct Engine {
    config: EngineConfig,
    daemon: Arc<dyn Daemon>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine that publishes through the docker CLI.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_daemon(config, Arc::new(DockerCli::from_env()))
    }

    pub fn with_daemon(config: EngineConfig, daemon: Arc<dyn Daemon>) -> Self {
        Self { config, daemon }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Build the image described by `request` and publish it according to
    /// the engine configuration.
    pub fn build(&self, request: &BuildRequest) -> Result<BuildReport> {
        let assembled = self.assemble(request)?;
        self.publish(&assembled, request.secondary_tags())
    }

    /// Validate the request and assemble the image in memory, without any
    /// externally visible effect.
    pub fn assemble(&self, request: &BuildRequest) -> Result<AssembledImage> {
        let arch = request.validate()?;

        let img = Image::empty().with_config(image_config(request, arch))?;
        debug!(architecture = %arch, "configured image");

        let layers = synthesize_layers(&request.layers)?;

        debug!(count = layers.len(), "adding layers to image");
        let image = img.append_layers(layers);

        let raw_tag = request.primary_tag().ok_or(Error::MissingTags)?;
        let tag = ImageRef::parse_tag(raw_tag).map_err(|source| Error::InvalidTag {
            tag: raw_tag.to_string(),
            source,
        })?;

        Ok(AssembledImage { image, tag })
    }

    /// Publish an assembled image: load under its primary tag, then alias
    /// `secondary_tags`.
    pub fn publish(
        &self,
        assembled: &AssembledImage,
        secondary_tags: &[String],
    ) -> Result<BuildReport> {
        let image_digest = assembled.image.digest()?;
        let mut report = BuildReport {
            image_digest,
            primary_tag: assembled.tag.familiar(),
            load_response: None,
            secondary_tags: Vec::new(),
            registry: RegistryPush::Disabled,
        };

        if self.config.push_to_daemon {
            let response =
                publish_primary(self.daemon.as_ref(), &assembled.image, &assembled.tag)?;
            if self.config.show_build_logs {
                info!(tag = %report.primary_tag, response = %response, "loaded image into daemon");
            } else {
                debug!(tag = %report.primary_tag, response = %response, "loaded image into daemon");
            }
            report.load_response = Some(response);
            report.secondary_tags =
                apply_secondary_tags(self.daemon.as_ref(), &assembled.tag, secondary_tags);
        }

        if self.config.push_to_registry {
            warn!(
                tag = %report.primary_tag,
                "registry push is not implemented; image was not pushed",
            );
            report.registry = RegistryPush::NotImplemented;
        }

        info!(
            tag = %report.primary_tag,
            digest = %report.image_digest,
            layers = assembled.image.layers().len(),
            "build complete",
        );
        Ok(report)
    }
}

fn image_config(request: &BuildRequest, arch: Architecture) -> ConfigFile {
    ConfigFile {
        created: Some(humantime::format_rfc3339_seconds(SystemTime::now()).to_string()),
        author: AUTHOR.to_string(),
        architecture: arch.as_str().to_string(),
        os: OS.to_string(),
        config: ContainerConfig {
            user: request.user.clone(),
            exposed_ports: object_set(&request.exposed_ports),
            env: request.env_vars.clone(),
            entrypoint: request.entrypoint.clone(),
            cmd: request.cmd.clone(),
            volumes: object_set(&request.volumes),
            working_dir: request.work_dir.clone(),
            labels: request.labels.clone(),
            stop_signal: request.stop_signal.clone(),
            on_build: request.on_build.clone(),
        },
        ..Default::default()
    }
}

/// Validate and synthesize every layer, stopping at the first failure.
fn synthesize_layers(specs: &[LayerSpec]) -> Result<Vec<Layer>> {
    let mut layers = Vec::with_capacity(specs.len());

    for (index, spec) in specs.iter().enumerate() {
        debug!(
            layer = index,
            kind = %spec.kind,
            source = %spec.source.display(),
            "create image layer",
        );

        validate_source(&spec.source, spec.kind)
            .map_err(|source| Error::Source { index, source })?;

        let layer = match spec.kind {
            LayerKind::Archive => layer_from_archive(&spec.source),
            LayerKind::Directory => layer_from_dir(&spec.source, spec.target_path()),
        }
        .map_err(|source| Error::Synthesis {
            index,
            path: spec.source.clone(),
            source,
        })?;

        layers.push(layer);
    }

    Ok(layers)
}
