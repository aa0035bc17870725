/// Errors produced by the OCI image library.
#[derive(Debug, thiserror::Error)]
pub enum OciError {
    #[error("reference error: {0}")]
    Reference(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("layer error: {0}")]
    Layer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OciError>;
