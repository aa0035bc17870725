#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use stratum::oci::{Image, ImageRef};
use stratum::{BuildRequest, Daemon, Engine, EngineConfig, Error, LayerSpec, Result};

/// One call made against a [`RecordingDaemon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Load { tag: String, layers: usize },
    Tag { existing: String, new: String },
}

/// In-memory daemon that records every call and keeps the last loaded image.
#[derive(Default)]
pub struct RecordingDaemon {
    calls: Mutex<Vec<Call>>,
    loaded: Mutex<Option<Image>>,
    fail_load: bool,
    reject_tags: Vec<String>,
}

impl RecordingDaemon {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_load() -> Arc<Self> {
        Arc::new(Self {
            fail_load: true,
            ..Default::default()
        })
    }

    pub fn rejecting(tags: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            reject_tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Option<Image> {
        self.loaded.lock().unwrap().clone()
    }
}

impl Daemon for RecordingDaemon {
    fn load_image(&self, tag: &ImageRef, image: &Image) -> Result<String> {
        self.calls.lock().unwrap().push(Call::Load {
            tag: tag.familiar(),
            layers: image.layers().len(),
        });
        if self.fail_load {
            return Err(Error::Daemon("connection refused".into()));
        }
        *self.loaded.lock().unwrap() = Some(image.clone());
        Ok(format!("Loaded image: {}", tag.familiar()))
    }

    fn tag_image(&self, existing: &ImageRef, new: &ImageRef) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Tag {
            existing: existing.familiar(),
            new: new.familiar(),
        });
        if self.reject_tags.contains(&new.familiar()) {
            return Err(Error::Daemon(format!("no such image: {}", existing.familiar())));
        }
        Ok(())
    }
}

pub fn engine_with(daemon: Arc<RecordingDaemon>, config: EngineConfig) -> Engine {
    Engine::with_daemon(config, daemon)
}

pub fn daemon_config() -> EngineConfig {
    EngineConfig::new(false, true, false)
}

/// A small tree: `bin/run` (0755) and `etc/app.conf` (0644).
pub fn app_tree(root: &Path) -> PathBuf {
    let dir = root.join("rootfs");
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::create_dir_all(dir.join("etc")).unwrap();
    fs::write(dir.join("bin/run"), b"#!/bin/sh\necho running\n").unwrap();
    fs::write(dir.join("etc/app.conf"), b"port=8080\n").unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir.join("bin/run"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(dir.join("etc/app.conf"), fs::Permissions::from_mode(0o644)).unwrap();
    }
    dir
}

/// A tar archive with a single `hello.txt` entry.
pub fn hello_tar(root: &Path) -> PathBuf {
    let path = root.join("hello.tar");
    let mut builder = tar::Builder::new(fs::File::create(&path).unwrap());
    let mut header = tar::Header::new_gnu();
    header.set_path("hello.txt").unwrap();
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &b"hello"[..]).unwrap();
    builder.finish().unwrap();
    path
}

pub fn request(layers: Vec<LayerSpec>, tags: &[&str]) -> BuildRequest {
    BuildRequest {
        entrypoint: vec!["/app/bin/run".into()],
        layers,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}
