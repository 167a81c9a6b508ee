//! Repository backend seam used by the resolver

use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;

/// Commit facts needed for the patch line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    /// Full hex object id
    pub hash: String,
    pub committer_time: DateTime<Utc>,
}

/// Failures talking to the repository backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not run git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: io::Error,
    },

    #[error("git {args} failed: {stderr}")]
    CommandFailed { args: String, stderr: String },

    #[error("malformed output from git {args}: {output:?}")]
    Malformed { args: String, output: String },

    #[error("repository error: {0}")]
    Git(#[from] git2::Error),

    #[error("repository I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    /// Whether the command ran and exited non-zero.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// Ref queries and commit lookups against one repository.
pub trait RefBackend {
    /// Verify `name` and return the commit it peels to.
    fn verify_ref(&self, name: &str) -> Result<String, BackendError>;

    /// Name `hash` using only refs matching `pattern`.
    ///
    /// `None` when no matching ref reaches the commit.
    fn name_rev(&self, hash: &str, pattern: &str) -> Result<Option<String>, BackendError>;

    /// Human readable description relative to the nearest tag.
    fn describe(&self, hash: &str) -> Result<String, BackendError>;

    fn commit_metadata(&self, hash: &str) -> Result<CommitMetadata, BackendError>;
}

impl<B: RefBackend + ?Sized> RefBackend for &B {
    fn verify_ref(&self, name: &str) -> Result<String, BackendError> {
        (**self).verify_ref(name)
    }

    fn name_rev(&self, hash: &str, pattern: &str) -> Result<Option<String>, BackendError> {
        (**self).name_rev(hash, pattern)
    }

    fn describe(&self, hash: &str) -> Result<String, BackendError> {
        (**self).describe(hash)
    }

    fn commit_metadata(&self, hash: &str) -> Result<CommitMetadata, BackendError> {
        (**self).commit_metadata(hash)
    }
}
