//! Layer synthesis
//!
//! Turns a validated layer source into a [`Layer`] blob. Archive sources
//! are wrapped byte-for-byte; directory sources are walked parent-first and
//! serialized into a fresh tar stream re-rooted under the layer's target
//! path.

use std::ffi::OsStr;
use std::fs::{File, FileType, Metadata};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use stratum_oci::{Layer, OciError};
use tar::{EntryType, Header};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Length of the name field in a tar header.
const NAME_FIELD_LEN: usize = 100;

/// Errors that abort synthesis of a single layer.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("not implemented archiving file type {kind} ({})", .path.display())]
    UnsupportedEntry { path: PathBuf, kind: &'static str },

    #[error("failed to calculate relative path for {}", .0.display())]
    RelativePath(PathBuf),

    #[error("failed to write tar entry {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read file into the tar ({}): {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file changed size while archiving ({}): expected {expected} bytes", .path.display())]
    SizeMismatch { path: PathBuf, expected: u64 },

    #[error("failed to finish tar: {0}")]
    Finish(#[source] io::Error),

    #[error(transparent)]
    Oci(#[from] OciError),
}

type Result<T> = std::result::Result<T, SynthesisError>;

/// Wrap an archive file as a layer; its bytes become the payload verbatim.
pub fn layer_from_archive(path: &Path) -> Result<Layer> {
    Ok(Layer::from_archive_file(path)?)
}

/// Archive the tree under `source` into a layer rooted at `target_path`.
///
/// Entries are visited in pre-order, siblings sorted by file name, so the
/// output only depends on the tree's content. An entry that cannot be
/// listed is skipped; anything that goes wrong while archiving a listed
/// entry aborts the whole layer.
pub fn layer_from_dir(source: &Path, target_path: &str) -> Result<Layer> {
    let mut writer = LayerWriter::new();
    let mut entries = 0usize;

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        // TODO: a listing error silently drops the entry (and its subtree)
        // from the image; decide whether this should fail the build instead.
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(source = %source.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| SynthesisError::RelativePath(entry.path().to_path_buf()))?;
        let name = entry_name(target_path, rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            writer.append_dir(&name, mode_of(&metadata, 0o755))?;
        } else if file_type.is_file() {
            let mode = mode_of(&metadata, 0o644);
            writer.append_file(&name, mode, metadata.len(), entry.path())?;
        } else {
            return Err(SynthesisError::UnsupportedEntry {
                path: rel.to_path_buf(),
                kind: describe(file_type),
            });
        }
        entries += 1;
    }

    let data = writer.finish()?;
    debug!(
        source = %source.display(),
        target = target_path,
        entries,
        size = data.len(),
        "archived directory",
    );
    Ok(Layer::from_archive_bytes(data)?)
}

/// Join `rel` onto `base` the way `path.Join` does: forward slashes,
/// `.` and empty components dropped, `..` resolved lexically.
///
/// The result is raw bytes; file names are not required to be UTF-8.
pub fn entry_name(base: &str, rel: &Path) -> Vec<u8> {
    let rooted = base.starts_with('/');
    let rel_parts = rel.components().filter_map(|c| match c {
        Component::Normal(part) => Some(os_bytes(part)),
        Component::ParentDir => Some(b"..".to_vec()),
        _ => None,
    });

    let mut parts: Vec<Vec<u8>> = Vec::new();
    for part in base.split('/').map(|p| p.as_bytes().to_vec()).chain(rel_parts) {
        match part.as_slice() {
            b"" | b"." => {}
            b".." => match parts.last() {
                Some(last) if last != b".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(part),
            },
            _ => parts.push(part),
        }
    }

    let joined = parts.join(&b'/');
    if rooted {
        let mut name = Vec::with_capacity(joined.len() + 1);
        name.push(b'/');
        name.extend_from_slice(&joined);
        name
    } else if joined.is_empty() {
        b".".to_vec()
    } else {
        joined
    }
}

#[cfg(unix)]
fn os_bytes(part: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    part.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_bytes(part: &OsStr) -> Vec<u8> {
    part.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn mode_of(metadata: &Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_metadata: &Metadata, fallback: u32) -> u32 {
    fallback
}

fn describe(file_type: FileType) -> &'static str {
    if file_type.is_symlink() {
        return "symlink";
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() {
            return "block device";
        }
        if file_type.is_char_device() {
            return "character device";
        }
        if file_type.is_fifo() {
            return "fifo";
        }
        if file_type.is_socket() {
            return "socket";
        }
    }
    "unknown"
}

// ---------------------------------------------------------------------------
// LayerWriter
// ---------------------------------------------------------------------------

/// Append-only tar stream for one layer.
///
/// [`LayerWriter::finish`] consumes the writer, so the archive is finalized
/// exactly once and nothing can be appended afterwards. Dropping a writer
/// without finishing it discards the partial archive.
///
/// Entry names are written as given, including a leading `/`; names that do
/// not fit the header are carried in a GNU long-name record.
pub struct LayerWriter {
    builder: tar::Builder<Vec<u8>>,
}

impl LayerWriter {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    pub fn append_dir(&mut self, name: &[u8], mode: u32) -> Result<()> {
        let header = entry_header(EntryType::Directory, mode, 0);
        self.append(name, header, io::empty())
            .map_err(|source| SynthesisError::Write {
                name: String::from_utf8_lossy(name).into_owned(),
                source,
            })
    }

    /// Stream `size` bytes of the file at `path` into a regular entry.
    pub fn append_file(&mut self, name: &[u8], mode: u32, size: u64, path: &Path) -> Result<()> {
        let read_err = |source| SynthesisError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(read_err)?;
        let header = entry_header(EntryType::Regular, mode, size);
        let mut limited = (&mut file).take(size);
        self.append(name, header, &mut limited)
            .map_err(|source| SynthesisError::Write {
                name: String::from_utf8_lossy(name).into_owned(),
                source,
            })?;

        let shrunk = limited.limit() > 0;
        let grew = file.read(&mut [0u8; 1]).map_err(read_err)? > 0;
        if shrunk || grew {
            return Err(SynthesisError::SizeMismatch {
                path: path.to_path_buf(),
                expected: size,
            });
        }
        Ok(())
    }

    /// Write the end-of-archive marker and return the archive bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.builder.into_inner().map_err(SynthesisError::Finish)
    }

    fn append<R: Read>(&mut self, name: &[u8], mut header: Header, data: R) -> io::Result<()> {
        if name.len() > NAME_FIELD_LEN {
            let mut long = entry_header(EntryType::GNULongName, 0o644, name.len() as u64 + 1);
            set_name_field(&mut long, b"././@LongLink");
            long.set_cksum();
            let mut payload = name.to_vec();
            payload.push(0);
            self.builder.append(&long, &payload[..])?;
        }
        set_name_field(&mut header, name);
        header.set_cksum();
        self.builder.append(&header, data)
    }
}

impl Default for LayerWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

/// Copy raw name bytes into the header, truncating to the field width.
fn set_name_field(header: &mut Header, name: &[u8]) {
    let field = &mut header.as_old_mut().name;
    let len = name.len().min(field.len());
    field[..len].copy_from_slice(&name[..len]);
    field[len..].fill(0);
}
