use crate::error::{OciError, Result};
use crate::manifest::{
    Descriptor, MEDIA_TYPE_OCI_LAYER, MEDIA_TYPE_OCI_LAYER_GZIP, MEDIA_TYPE_OCI_LAYER_ZSTD,
};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Gzip magic bytes (1f 8b).
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Zstandard frame magic (28 b5 2f fd).
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Compression applied to a layer archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Sniff the compression from the first bytes of a blob.
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(&GZIP_MAGIC) {
            Self::Gzip
        } else if prefix.starts_with(&ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// OCI layer media type for a tar compressed this way.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::None => MEDIA_TYPE_OCI_LAYER,
            Self::Gzip => MEDIA_TYPE_OCI_LAYER_GZIP,
            Self::Zstd => MEDIA_TYPE_OCI_LAYER_ZSTD,
        }
    }

    /// Wrap `inner` in a reader that yields the uncompressed tar stream.
    pub fn reader<'a, R: Read + 'a>(self, inner: R) -> Result<Box<dyn Read + 'a>> {
        match self {
            Self::None => Ok(Box::new(inner)),
            Self::Gzip => Ok(Box::new(GzDecoder::new(inner))),
            Self::Zstd => {
                let decoder = zstd::Decoder::new(inner)
                    .map_err(|e| OciError::Layer(format!("zstd init: {}", e)))?;
                Ok(Box::new(decoder))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// An immutable layer blob: the archive payload plus its digests.
///
/// The payload is kept byte-for-byte as supplied; `digest` covers those
/// bytes and `diff_id` covers the uncompressed tar stream (they are equal
/// for uncompressed layers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    data: Vec<u8>,
    digest: String,
    diff_id: String,
    compression: Compression,
}

impl Layer {
    /// Wrap an existing archive file as a layer without re-archiving it.
    pub fn from_archive_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        debug!(path = %path.display(), size = data.len(), "read layer archive");
        Self::from_archive_bytes(data)
    }

    /// Wrap an in-memory archive stream as a layer.
    pub fn from_archive_bytes(data: Vec<u8>) -> Result<Self> {
        let compression = Compression::detect(&data);
        let digest = sha256_digest(&data);
        let diff_id = match compression {
            Compression::None => digest.clone(),
            _ => {
                let mut reader = compression.reader(&data[..])?;
                let mut hasher = Sha256::new();
                io::copy(&mut reader, &mut hasher).map_err(|e| {
                    OciError::Layer(format!("failed to decompress layer for diff_id: {}", e))
                })?;
                format!("sha256:{}", hex(&hasher.finalize()))
            }
        };

        Ok(Self {
            data,
            digest,
            diff_id,
            compression,
        })
    }

    /// Raw payload bytes, exactly as supplied.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Digest of the payload (`sha256:<hex>`).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Digest of the uncompressed tar stream (`sha256:<hex>`).
    pub fn diff_id(&self) -> &str {
        &self.diff_id
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn media_type(&self) -> &'static str {
        self.compression.media_type()
    }

    /// Manifest descriptor for this layer.
    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            media_type: self.media_type().to_string(),
            digest: self.digest.clone(),
            size: self.size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Digest helpers
// ---------------------------------------------------------------------------

/// `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex(&Sha256::digest(data)))
}

/// Extract the hex portion from a digest string like "sha256:abcdef…".
pub fn hex_from_digest(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
