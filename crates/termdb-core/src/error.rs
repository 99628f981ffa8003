use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported search backend: {0}")]
    UnsupportedBackend(String),

    #[error("Build failed at {}: {source}", .path.display())]
    Build {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing shard: {}", .0.display())]
    MissingShard(PathBuf),

    #[error("Malformed line in {} at offset {offset}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record source failed: {0}")]
    Source(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an I/O failure that happened while writing index artifacts.
    pub fn build(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Build { path: path.into(), source }
    }

    /// Missing shards degrade to empty candidate sets instead of failing a query.
    pub fn is_missing(&self) -> bool {
        match self {
            Error::MissingShard(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
