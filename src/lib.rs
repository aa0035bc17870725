//! stratum: Build container images from plain directories and tar archives
//!
//! Turns a declarative [`BuildRequest`] into an OCI image on an empty
//! (scratch) base and publishes it to the local docker daemon, without a
//! Dockerfile and without running any build steps.
//!
//! # Key Features
//!
//! - **Directory layers**: a host directory tree archived under any target path
//! - **Archive layers**: pre-built tar (or gzip/zstd tar) files used verbatim
//! - **Deterministic headers**: sorted walk, zeroed mtime and ownership
//! - **Best-effort aliases**: secondary tags never fail a build
//!
//! # Example
//!
//! ```no_run
//! use stratum::{BuildRequest, Engine, EngineConfig, LayerSpec};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = BuildRequest {
//!         entrypoint: vec!["/app/bin/server".into()],
//!         layers: vec![LayerSpec::directory("./dist").with_target_path("/app")],
//!         tags: vec!["server:v1".into(), "server:latest".into()],
//!         ..Default::default()
//!     };
//!
//!     let engine = Engine::new(EngineConfig::new(false, true, false));
//!     let report = engine.build(&request)?;
//!
//!     println!("{} {}", report.primary_tag, report.image_digest);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod layer;
pub mod publish;
pub mod request;
pub mod source;

// Re-exports for convenience
pub use engine::{AssembledImage, BuildReport, Engine, EngineConfig};
pub use error::{Error, Result};
pub use publish::{Daemon, DockerCli, RegistryPush, TagOutcome, TagStatus};
pub use request::{Architecture, BuildRequest, LayerKind, LayerParams, LayerSpec, MAX_LAYERS};

pub use stratum_oci as oci;
