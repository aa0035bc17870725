use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stratum::config::load_request;
use stratum::oci::archive::write_docker_archive;
use stratum::oci::ImageRef;
use stratum::source::validate_source;
use stratum::{Engine, EngineConfig, Error, RegistryPush, TagStatus};

#[derive(Parser)]
#[command(name = "stratum", version)]
#[command(about = "Build container images from directories and tar archives", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image from a request file
    Build {
        /// Request file (.json, .yaml or .yml)
        #[arg(short, long)]
        file: PathBuf,

        /// Extra tags, appended after the ones in the request
        #[arg(short, long)]
        tag: Vec<String>,

        /// Also write the image as a docker-archive tarball
        #[arg(long)]
        save: Option<PathBuf>,

        /// Do not load the image into the local daemon
        #[arg(long)]
        no_daemon: bool,

        /// Push to a registry (not implemented yet)
        #[arg(long)]
        push: bool,

        /// Show the daemon load response
        #[arg(long, env = "STRATUM_SHOW_BUILD_LOGS")]
        show_build_logs: bool,
    },

    /// Check a request file without building
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Build {
            file,
            tag,
            save,
            no_daemon,
            push,
            show_build_logs,
        } => cmd_build(file, tag, save, !no_daemon, push, show_build_logs)?,
        Commands::Validate { file } => cmd_validate(file)?,
        Commands::Version => println!("stratum {}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}

fn cmd_build(
    file: PathBuf,
    extra_tags: Vec<String>,
    save: Option<PathBuf>,
    push_to_daemon: bool,
    push_to_registry: bool,
    show_build_logs: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = load_request(&file)?;
    request.tags.extend(extra_tags);

    let engine = Engine::new(EngineConfig::new(
        show_build_logs,
        push_to_daemon,
        push_to_registry,
    ));

    let assembled = engine.assemble(&request)?;

    if let Some(path) = save {
        let out = File::create(&path)
            .map_err(|e| Error::Config(format!("failed to create {}: {}", path.display(), e)))?;
        let tags: Vec<ImageRef> = request
            .tags
            .iter()
            .filter_map(|t| ImageRef::parse_tag(t).ok())
            .collect();
        let mut writer = write_docker_archive(&assembled.image, &tags, BufWriter::new(out))?;
        writer.flush()?;
        println!("saved: {}", path.display());
    }

    let report = engine.publish(&assembled, request.secondary_tags())?;

    println!("image: {}", report.primary_tag);
    println!("digest: {}", report.image_digest);
    if let Some(response) = &report.load_response {
        if !response.is_empty() {
            println!("daemon: {}", response);
        }
    }
    for outcome in &report.secondary_tags {
        match &outcome.status {
            TagStatus::Applied => println!("tag: {} (applied)", outcome.tag),
            TagStatus::Skipped { reason } => println!("tag: {} (skipped: {})", outcome.tag, reason),
            TagStatus::Failed { reason } => println!("tag: {} (failed: {})", outcome.tag, reason),
        }
    }
    if report.registry == RegistryPush::NotImplemented {
        println!("registry: push not implemented, image not pushed");
    }
    Ok(())
}

fn cmd_validate(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let request = load_request(&file)?;
    let arch = request.validate()?;

    for (index, layer) in request.layers.iter().enumerate() {
        validate_source(&layer.source, layer.kind)
            .map_err(|source| Error::Source { index, source })?;
    }

    let primary = request.primary_tag().ok_or(Error::MissingTags)?;
    let tag = ImageRef::parse_tag(primary).map_err(|source| Error::InvalidTag {
        tag: primary.to_string(),
        source,
    })?;

    println!(
        "valid: {} (architecture={}, layers={}, tag={})",
        file.display(),
        arch,
        request.layers.len(),
        tag.familiar()
    );
    Ok(())
}
