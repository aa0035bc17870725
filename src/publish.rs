//! Publishing assembled images to a local image store
//!
//! The primary tag is load-critical: if the daemon does not accept the
//! image under it, the build fails. Secondary tags are aliases applied
//! afterwards; each one yields a [`TagOutcome`] and none of them can fail
//! the build.

use std::ffi::OsStr;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::{Command, Output};

use stratum_oci::archive::write_docker_archive;
use stratum_oci::{Image, ImageRef};
use tracing::{debug, error, info};

use crate::{Error, Result};

/// Environment variable overriding the docker binary used by [`DockerCli`].
pub const DOCKER_BIN_ENV: &str = "STRATUM_DOCKER_BIN";

/// A local image store that can load images and alias tags.
pub trait Daemon: Send + Sync {
    /// Load `image` under `tag`; returns the daemon's response text.
    fn load_image(&self, tag: &ImageRef, image: &Image) -> Result<String>;

    /// Point `new` at the image currently tagged `existing`.
    fn tag_image(&self, existing: &ImageRef, new: &ImageRef) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one secondary tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStatus {
    Applied,
    /// The tag string could not be parsed; nothing was sent to the daemon.
    Skipped { reason: String },
    /// The daemon rejected the alias.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOutcome {
    pub tag: String,
    pub status: TagStatus,
}

impl TagOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == TagStatus::Applied
    }
}

/// Registry push state. Pushing to a registry is not implemented; when it
/// is requested the report says so instead of claiming a push happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPush {
    Disabled,
    NotImplemented,
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Load `image` under the primary `tag`. Any failure is fatal.
pub fn publish_primary(daemon: &dyn Daemon, image: &Image, tag: &ImageRef) -> Result<String> {
    debug!(tag = %tag, "loading image into daemon");
    daemon
        .load_image(tag, image)
        .map_err(|e| Error::Publish {
            tag: tag.familiar(),
            message: e.to_string(),
        })
}

/// Alias the image loaded as `primary` under every tag in `tags`.
///
/// Every tag is attempted exactly once, in order; failures are logged and
/// recorded, never returned.
pub fn apply_secondary_tags(
    daemon: &dyn Daemon,
    primary: &ImageRef,
    tags: &[String],
) -> Vec<TagOutcome> {
    if !tags.is_empty() {
        debug!(count = tags.len(), "adding other tags");
    }

    tags.iter()
        .map(|raw| {
            let status = match ImageRef::parse_tag(raw) {
                Err(e) => {
                    error!(tag = %raw, error = %e, "error creating tag");
                    TagStatus::Skipped {
                        reason: e.to_string(),
                    }
                }
                Ok(tag) => match daemon.tag_image(primary, &tag) {
                    Ok(()) => {
                        info!(tag = %tag.familiar(), "tagged image");
                        TagStatus::Applied
                    }
                    Err(e) => {
                        error!(tag = %raw, error = %e, "error tagging");
                        TagStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                },
            };
            TagOutcome {
                tag: raw.clone(),
                status,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// DockerCli
// ---------------------------------------------------------------------------

/// [`Daemon`] backed by the `docker` command line client.
///
/// Images are written as a docker-archive to a temporary file and handed to
/// `docker load --input`; aliases use `docker tag`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use `$STRATUM_DOCKER_BIN`, falling back to `docker` on `PATH`.
    pub fn from_env() -> Self {
        let program = std::env::var_os(DOCKER_BIN_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("docker"));
        Self::new(program)
    }

    fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.program).args(args).output().map_err(|e| {
            Error::Daemon(format!("failed to run {}: {}", self.program.display(), e))
        })?;

        if !output.status.success() {
            return Err(Error::Daemon(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Daemon for DockerCli {
    fn load_image(&self, tag: &ImageRef, image: &Image) -> Result<String> {
        let archive = tempfile::Builder::new()
            .prefix("stratum-")
            .suffix(".tar")
            .tempfile()?;
        let writer = write_docker_archive(
            image,
            std::slice::from_ref(tag),
            BufWriter::new(archive.as_file()),
        )?;
        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .sync_all()?;

        let output = self.run([
            OsStr::new("load"),
            OsStr::new("--input"),
            archive.path().as_os_str(),
        ])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn tag_image(&self, existing: &ImageRef, new: &ImageRef) -> Result<()> {
        self.run(["tag".to_string(), existing.familiar(), new.familiar()])?;
        Ok(())
    }
}
