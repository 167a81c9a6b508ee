//! Errors for tree walking and archive encoding.

use std::io;
use thiserror::Error;

/// Errors from walking a virtual filesystem or writing an archive.
///
/// Every variant names the virtual path it was raised for.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported entry type at {path}")]
    UnsupportedEntry { path: String },

    #[error("short read at {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("encoding error at {path}: {source}")]
    Encoding {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    pub(crate) fn filesystem(path: impl Into<String>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn encoding(path: impl Into<String>, source: io::Error) -> Self {
        Self::Encoding {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the filesystem side (stat, read, open,
    /// unsupported entry, short payload) rather than from archive encoding.
    pub fn is_filesystem(&self) -> bool {
        !matches!(self, Self::Encoding { .. })
    }

    /// The virtual path the error was raised for.
    pub fn path(&self) -> &str {
        match self {
            Self::Filesystem { path, .. }
            | Self::UnsupportedEntry { path }
            | Self::ShortRead { path, .. }
            | Self::Encoding { path, .. } => path,
        }
    }
}

/// Result alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
