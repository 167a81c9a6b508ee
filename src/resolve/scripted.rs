//! In-memory backend with canned answers, for resolver tests

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;

use super::{BackendError, CommitMetadata, RefBackend};

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    refs: HashMap<String, String>,
    names: HashMap<String, String>,
    describe: HashMap<String, String>,
    commits: HashMap<String, DateTime<Utc>>,
    unavailable: bool,
    calls: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_ref(mut self, name: &str, hash: &str) -> Self {
        self.refs.insert(name.to_string(), hash.to_string());
        self
    }

    /// Answer `name-rev` for `pattern` with `name`, whatever the hash.
    pub(crate) fn with_name(mut self, pattern: &str, name: &str) -> Self {
        self.names.insert(pattern.to_string(), name.to_string());
        self
    }

    pub(crate) fn with_describe(mut self, hash: &str, describe: &str) -> Self {
        self.describe.insert(hash.to_string(), describe.to_string());
        self
    }

    pub(crate) fn with_commit(mut self, hash: &str, committer_time: DateTime<Utc>) -> Self {
        self.commits.insert(hash.to_string(), committer_time);
        self
    }

    /// Every call fails as if `git` were not installed.
    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) -> Result<(), BackendError> {
        self.calls.borrow_mut().push(call.clone());
        if self.unavailable {
            return Err(BackendError::Spawn {
                args: call,
                source: io::Error::new(io::ErrorKind::NotFound, "git not found"),
            });
        }
        Ok(())
    }

    fn failed(args: String) -> BackendError {
        BackendError::CommandFailed {
            args,
            stderr: "fatal: Needed a single revision".to_string(),
        }
    }
}

impl RefBackend for ScriptedBackend {
    fn verify_ref(&self, name: &str) -> Result<String, BackendError> {
        self.record(format!("verify {name}"))?;
        self.refs
            .get(name)
            .cloned()
            .ok_or_else(|| Self::failed(format!("rev-parse --verify {name}")))
    }

    fn name_rev(&self, hash: &str, pattern: &str) -> Result<Option<String>, BackendError> {
        self.record(format!("name-rev {hash} {pattern}"))?;
        Ok(self.names.get(pattern).cloned())
    }

    fn describe(&self, hash: &str) -> Result<String, BackendError> {
        self.record(format!("describe {hash}"))?;
        self.describe
            .get(hash)
            .cloned()
            .ok_or_else(|| Self::failed(format!("describe {hash}")))
    }

    fn commit_metadata(&self, hash: &str) -> Result<CommitMetadata, BackendError> {
        self.record(format!("commit {hash}"))?;
        let committer_time = self
            .commits
            .get(hash)
            .copied()
            .ok_or_else(|| Self::failed(format!("cat-file commit {hash}")))?;
        Ok(CommitMetadata {
            hash: hash.to_string(),
            committer_time,
        })
    }
}
