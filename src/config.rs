//! Build request files
//!
//! Requests are read from YAML (`.yaml`/`.yml`) or JSON files. Relative
//! layer sources are resolved against the directory holding the file, so a
//! request can travel with its layer data.

use std::fs;
use std::path::Path;

use crate::request::BuildRequest;
use crate::{Error, Result};

pub fn load_request(path: &Path) -> Result<BuildRequest> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let mut request: BuildRequest = if is_yaml {
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid YAML request {}: {}", path.display(), e)))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid JSON request {}: {}", path.display(), e)))?
    };

    if let Some(base) = path.parent() {
        resolve_sources(&mut request, base);
    }
    Ok(request)
}

/// Make relative layer sources relative to `base`. Empty sources are left
/// alone so validation still reports them as empty.
pub fn resolve_sources(request: &mut BuildRequest, base: &Path) {
    for layer in &mut request.layers {
        if !layer.source.as_os_str().is_empty() && layer.source.is_relative() {
            layer.source = base.join(&layer.source);
        }
    }
}
