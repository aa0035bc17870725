//! `docker save` / `docker load` archive layout.
//!
//! ```text
//! manifest.json
//! <config-hex>.json
//! <layer-digest-hex>/layer.tar   (one per distinct layer payload)
//! ```

use crate::error::Result;
use crate::layer::hex_from_digest;
use crate::reference::ImageRef;
use crate::Image;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use tracing::debug;

/// One entry of the archive's `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifestEntry {
    #[serde(rename = "Config")]
    pub config: String,

    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,

    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// Serialize `image` into a docker-archive tar stream on `writer`, naming it
/// with `tags`. Returns the writer once the archive is finished.
pub fn write_docker_archive<W: Write>(image: &Image, tags: &[ImageRef], writer: W) -> Result<W> {
    let mut builder = tar::Builder::new(writer);

    let raw_config = image.raw_config()?;
    let config_name = format!("{}.json", hex_from_digest(&image.config_digest()?));
    append_blob(&mut builder, &config_name, &raw_config)?;

    let mut written = BTreeSet::new();
    let mut layer_names = Vec::with_capacity(image.layers().len());
    for layer in image.layers() {
        let name = format!("{}/layer.tar", hex_from_digest(layer.digest()));
        if written.insert(name.clone()) {
            append_blob(&mut builder, &name, layer.bytes())?;
        }
        layer_names.push(name);
    }

    let manifest = vec![ArchiveManifestEntry {
        config: config_name,
        repo_tags: tags.iter().map(ImageRef::familiar).collect(),
        layers: layer_names,
    }];
    append_blob(&mut builder, "manifest.json", &serde_json::to_vec(&manifest)?)?;

    debug!(
        layers = image.layers().len(),
        distinct = written.len(),
        "wrote docker archive",
    );
    Ok(builder.into_inner()?)
}

fn append_blob<W: Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
