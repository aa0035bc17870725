//! Build contract tests.
//!
//! These drive [`Engine`] end to end against an in-memory daemon and check:
//! - Request validation order and that failures happen before any source
//!   is read or anything is published
//! - Architecture defaulting and pass-through
//! - Primary tag is load-critical, secondary tags are best-effort
//! - Registry push reports "not implemented" instead of pretending
//! - Engines can be shared between concurrent builds

mod common;

use std::sync::Arc;
use std::thread;

use common::{
    app_tree, daemon_config, engine_with, hello_tar, request, Call, RecordingDaemon,
};
use stratum::{
    BuildRequest, EngineConfig, Error, LayerSpec, RegistryPush, TagStatus, MAX_LAYERS,
};

#[test]
fn no_layers_fails_without_daemon_interaction() {
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let err = engine.build(&request(vec![], &["app:v1"])).unwrap_err();

    assert!(matches!(err, Error::NoLayers), "{err}");
    assert!(daemon.calls().is_empty());
}

#[test]
fn too_many_layers_rejected_before_sources_are_read() {
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    // None of these sources exist; the count check must fire first.
    let layers = vec![LayerSpec::directory("/nonexistent/stratum/layer"); MAX_LAYERS + 1];
    let err = engine.build(&request(layers, &["app:v1"])).unwrap_err();

    assert!(matches!(err, Error::TooManyLayers(256)), "{err}");
    assert!(err.to_string().contains("too many layers"));
    assert!(daemon.calls().is_empty());
}

#[test]
fn missing_startup_info_checked_first() {
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = BuildRequest {
        entrypoint: vec![],
        cmd: vec![],
        layers: vec![LayerSpec::archive("/nonexistent/stratum/base.tar")],
        tags: vec![],
        architecture: "sparc".into(),
        ..Default::default()
    };
    let err = engine.build(&req).unwrap_err();

    assert!(matches!(err, Error::MissingStartupInfo), "{err}");
    assert!(daemon.calls().is_empty());
}

#[test]
fn architecture_defaults_to_amd64() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine_with(RecordingDaemon::new(), EngineConfig::default());

    let req = request(vec![LayerSpec::directory(app_tree(tmp.path()))], &["app:v1"]);
    let assembled = engine.assemble(&req).unwrap();

    let config = assembled.image.config_file();
    assert_eq!(config.architecture, "amd64");
    assert_eq!(config.os, "linux");
    assert_eq!(config.author, "stratum");
    assert_eq!(config.config.entrypoint, vec!["/app/bin/run"]);
}

#[test]
fn arm64_passes_through() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine_with(RecordingDaemon::new(), EngineConfig::default());

    let req = BuildRequest {
        architecture: "arm64".into(),
        ..request(vec![LayerSpec::directory(app_tree(tmp.path()))], &["app:v1"])
    };
    let assembled = engine.assemble(&req).unwrap();

    assert_eq!(assembled.image.config_file().architecture, "arm64");
}

#[test]
fn bad_architecture_rejected() {
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = BuildRequest {
        architecture: "riscv64".into(),
        ..request(vec![LayerSpec::directory("/nonexistent")], &["app:v1"])
    };
    let err = engine.build(&req).unwrap_err();

    assert!(matches!(err, Error::BadArchitecture(ref v) if v == "riscv64"), "{err}");
    assert!(err.to_string().contains("bad architecture value"));
    assert!(daemon.calls().is_empty());
}

#[test]
fn custom_base_image_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine_with(RecordingDaemon::new(), daemon_config());

    let req = BuildRequest {
        from: "alpine:3.20".into(),
        ..request(vec![LayerSpec::archive(hello_tar(tmp.path()))], &["app:v1"])
    };
    let err = engine.build(&req).unwrap_err();

    assert!(matches!(err, Error::UnsupportedBaseImage(_)), "{err}");
    assert!(err.to_string().contains("not supported yet"));
}

#[test]
fn missing_tags_fails_after_assembly_without_publishing() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = request(vec![LayerSpec::archive(hello_tar(tmp.path()))], &[]);
    let err = engine.build(&req).unwrap_err();

    assert!(matches!(err, Error::MissingTags), "{err}");
    assert!(daemon.calls().is_empty());
}

#[test]
fn invalid_primary_tag_fails_build() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = request(
        vec![LayerSpec::archive(hello_tar(tmp.path()))],
        &["Bad Tag", "app:v2"],
    );
    let err = engine.build(&req).unwrap_err();

    assert!(matches!(err, Error::InvalidTag { ref tag, .. } if tag == "Bad Tag"), "{err}");
    assert!(daemon.calls().is_empty());
}

#[test]
fn source_of_wrong_kind_names_the_layer() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = request(
        vec![
            LayerSpec::archive(hello_tar(tmp.path())),
            LayerSpec::archive(app_tree(tmp.path())),
        ],
        &["app:v1"],
    );
    let err = engine.build(&req).unwrap_err();

    assert!(matches!(err, Error::Source { index: 1, .. }), "{err}");
    assert!(err.to_string().contains("not a file"), "{err}");
    assert!(daemon.calls().is_empty());
}

#[test]
fn secondary_tags_are_best_effort() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = request(
        vec![LayerSpec::directory(app_tree(tmp.path())).with_target_path("/app")],
        &["good:v1", "bad tag with spaces", "good:v2"],
    );
    let report = engine.build(&req).unwrap();

    assert_eq!(report.primary_tag, "good:v1");
    assert!(report.image_digest.starts_with("sha256:"));
    assert_eq!(report.load_response.as_deref(), Some("Loaded image: good:v1"));
    assert_eq!(report.registry, RegistryPush::Disabled);

    assert_eq!(report.secondary_tags.len(), 2);
    assert_eq!(report.secondary_tags[0].tag, "bad tag with spaces");
    assert!(matches!(report.secondary_tags[0].status, TagStatus::Skipped { .. }));
    assert_eq!(report.secondary_tags[1].tag, "good:v2");
    assert!(report.secondary_tags[1].is_applied());

    assert_eq!(
        daemon.calls(),
        vec![
            Call::Load {
                tag: "good:v1".into(),
                layers: 1
            },
            Call::Tag {
                existing: "good:v1".into(),
                new: "good:v2".into()
            },
        ]
    );
}

#[test]
fn rejected_alias_does_not_fail_build() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::rejecting(&["app:broken"]);
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = request(
        vec![LayerSpec::archive(hello_tar(tmp.path()))],
        &["app:v1", "app:broken", "app:latest"],
    );
    let report = engine.build(&req).unwrap();

    assert!(matches!(report.secondary_tags[0].status, TagStatus::Failed { .. }));
    assert!(report.secondary_tags[1].is_applied());
    assert_eq!(daemon.calls().len(), 3);
}

#[test]
fn primary_load_failure_fails_build_and_skips_aliases() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::failing_load();
    let engine = engine_with(daemon.clone(), daemon_config());

    let req = request(
        vec![LayerSpec::archive(hello_tar(tmp.path()))],
        &["app:v1", "app:v2", "app:v3"],
    );
    let err = engine.build(&req).unwrap_err();

    match err {
        Error::Publish { ref tag, ref message } => {
            assert_eq!(tag, "app:v1");
            assert!(message.contains("connection refused"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        daemon.calls(),
        vec![Call::Load {
            tag: "app:v1".into(),
            layers: 1
        }]
    );
}

#[test]
fn registry_push_reports_not_implemented() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), EngineConfig::new(false, false, true));

    let req = request(vec![LayerSpec::archive(hello_tar(tmp.path()))], &["app:v1"]);
    let report = engine.build(&req).unwrap();

    assert_eq!(report.registry, RegistryPush::NotImplemented);
    assert!(daemon.calls().is_empty());
}

#[test]
fn without_daemon_nothing_is_published() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), EngineConfig::default());

    let req = request(
        vec![LayerSpec::archive(hello_tar(tmp.path()))],
        &["app:v1", "app:v2"],
    );
    let report = engine.build(&req).unwrap();

    assert_eq!(report.primary_tag, "app:v1");
    assert!(report.load_response.is_none());
    assert!(report.secondary_tags.is_empty());
    assert!(daemon.calls().is_empty());
}

#[test]
fn layers_keep_request_order() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = engine_with(daemon.clone(), daemon_config());

    let tar = hello_tar(tmp.path());
    let tree = app_tree(tmp.path());
    let req = request(
        vec![
            LayerSpec::archive(&tar),
            LayerSpec::directory(&tree).with_target_path("/app"),
        ],
        &["app:v1"],
    );
    engine.build(&req).unwrap();

    let image = daemon.loaded().unwrap();
    assert_eq!(image.layers().len(), 2);
    assert_eq!(image.layers()[0].bytes(), std::fs::read(&tar).unwrap().as_slice());

    let rootfs = &image.config_file().rootfs;
    assert_eq!(rootfs.diff_ids.len(), 2);
    assert_eq!(rootfs.diff_ids[0], image.layers()[0].diff_id());
    assert_eq!(rootfs.diff_ids[1], image.layers()[1].diff_id());
    assert_eq!(image.config_file().history.len(), 2);
}

#[test]
fn engine_is_shared_across_threads() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = RecordingDaemon::new();
    let engine = Arc::new(engine_with(daemon.clone(), daemon_config()));
    let tar = hello_tar(tmp.path());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let tar = tar.clone();
            thread::spawn(move || {
                let tag = format!("app:v{i}");
                let req = request(vec![LayerSpec::archive(tar)], &[tag.as_str()]);
                engine.build(&req).unwrap()
            })
        })
        .collect();

    let digests: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().image_digest)
        .collect();

    assert_eq!(daemon.calls().len(), 4);
    assert!(digests.iter().all(|d| d.starts_with("sha256:")));
}
