//! Error types for stratum

use std::path::PathBuf;

use stratum_oci::OciError;
use thiserror::Error;

use crate::layer::SynthesisError;
use crate::request::MAX_LAYERS;
use crate::source::SourceError;

/// Result type alias using stratum Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or publishing an image
#[derive(Error, Debug)]
pub enum Error {
    /// Neither entrypoint nor cmd was given
    #[error("missing startup info: entrypoint or cmd is required")]
    MissingStartupInfo,

    /// The request has no layers
    #[error("no layers")]
    NoLayers,

    /// The request has more layers than an image may carry
    #[error("too many layers: {0} (max {max})", max = MAX_LAYERS)]
    TooManyLayers(usize),

    /// Architecture other than amd64/arm64
    #[error("bad architecture value '{0}' (expected amd64 or arm64)")]
    BadArchitecture(String),

    /// A base image was requested
    #[error("custom base images are not supported yet (from: '{0}')")]
    UnsupportedBaseImage(String),

    /// The request names no tags
    #[error("missing tags")]
    MissingTags,

    /// The primary tag could not be parsed
    #[error("invalid primary tag '{tag}': {source}")]
    InvalidTag {
        tag: String,
        #[source]
        source: OciError,
    },

    /// A layer source failed validation
    #[error("layer {index}: {source}")]
    Source {
        index: usize,
        #[source]
        source: SourceError,
    },

    /// A layer could not be synthesized from its source
    #[error("layer {index} ({}): {source}", .path.display())]
    Synthesis {
        index: usize,
        path: PathBuf,
        #[source]
        source: SynthesisError,
    },

    /// Image assembly errors
    #[error("Image error: {0}")]
    Oci(#[from] OciError),

    /// Loading the image under its primary tag failed
    #[error("failed to load image as '{tag}': {message}")]
    Publish { tag: String, message: String },

    /// Daemon client errors
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
