//! Bare mirror of the upstream repository

use chrono::{DateTime, Utc};
use git2::{AutotagOption, Direction, FetchOptions, Oid, Repository};
use git_tar_archive::MemFs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::checkout::{checkout_commit, CheckoutStats};
use super::command::GitCommand;
use crate::resolve::{BackendError, CommitMetadata, RefBackend};

/// Name of the single remote the mirror tracks
pub const REMOTE_NAME: &str = "origin";

const HEADS_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
const TAGS_REFSPEC: &str = "+refs/tags/*:refs/tags/*";
const REMOTE_HEAD: &str = "refs/remotes/origin/HEAD";

/// A bare clone whose branches live under `refs/remotes/origin/`.
///
/// Library operations (clone, fetch, commit lookup, checkout) go through
/// `git2`; ref naming queries go through the `git` binary.
pub struct GitMirror {
    url: String,
    dir: PathBuf,
    repo: Repository,
    git: GitCommand,
}

impl GitMirror {
    /// Open the bare repository in `dir`, or create it and fetch from `url`.
    ///
    /// An existing repository is recognized by its `HEAD` file and is not
    /// fetched here; call [`GitMirror::update`] for that.
    pub fn open_or_clone(url: &str, dir: &Path) -> Result<Self, BackendError> {
        if dir.join("HEAD").is_file() {
            info!(dir = %dir.display(), "opening existing clone");
            let repo = Repository::open_bare(dir)?;
            return Ok(Self::from_parts(url, dir, repo));
        }

        info!(%url, dir = %dir.display(), "cloning");
        fs::create_dir_all(dir).map_err(|e| BackendError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let repo = Repository::init_bare(dir)?;
        repo.remote_with_fetch(REMOTE_NAME, url, HEADS_REFSPEC)?;

        let mirror = Self::from_parts(url, dir, repo);
        mirror.fetch_remote(REMOTE_NAME)?;
        Ok(mirror)
    }

    fn from_parts(url: &str, dir: &Path, repo: Repository) -> Self {
        Self {
            url: url.to_string(),
            dir: dir.to_path_buf(),
            repo,
            git: GitCommand::new(dir),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Point every remote at the configured URL and force-fetch it.
    pub fn update(&self) -> Result<(), BackendError> {
        let remotes = self.repo.remotes()?;
        for name in remotes.iter().flatten() {
            self.repo.remote_set_url(name, &self.url)?;
            info!(remote = %name, url = %self.url, "updating");
            self.fetch_remote(name)?;
        }
        Ok(())
    }

    fn fetch_remote(&self, name: &str) -> Result<(), BackendError> {
        let mut remote = self.repo.find_remote(name)?;
        let mut options = FetchOptions::new();
        options.download_tags(AutotagOption::All);
        remote.fetch(&[HEADS_REFSPEC, TAGS_REFSPEC], Some(&mut options), None)?;

        let stats = remote.stats();
        debug!(
            remote = %name,
            objects = stats.received_objects(),
            bytes = stats.received_bytes(),
            "fetched"
        );

        if name == REMOTE_NAME {
            if let Err(e) = self.set_remote_head() {
                warn!(error = %e, "could not set {REMOTE_HEAD}");
            }
        }
        Ok(())
    }

    /// Point `refs/remotes/origin/HEAD` at the remote's default branch.
    fn set_remote_head(&self) -> Result<(), BackendError> {
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;
        remote.connect(Direction::Fetch)?;
        let default = remote.default_branch();
        remote.disconnect()?;

        let default = default?;
        let branch = default
            .as_str()
            .and_then(|b| b.strip_prefix("refs/heads/"))
            .ok_or_else(|| BackendError::Malformed {
                args: "ls-remote --symref origin HEAD".to_string(),
                output: String::from_utf8_lossy(&default).into_owned(),
            })?;

        let target = format!("refs/remotes/{REMOTE_NAME}/{branch}");
        self.repo
            .reference_symbolic(REMOTE_HEAD, &target, true, "set remote HEAD")?;
        debug!(%target, "set {REMOTE_HEAD}");
        Ok(())
    }

    /// Populate `fs` with the tree of commit `hash`.
    pub fn checkout(&self, hash: &str, fs: &mut MemFs) -> Result<CheckoutStats, BackendError> {
        checkout_commit(&self.repo, hash, fs)
    }
}

impl RefBackend for GitMirror {
    fn verify_ref(&self, name: &str) -> Result<String, BackendError> {
        self.git.rev_parse_commit(name)
    }

    fn name_rev(&self, hash: &str, pattern: &str) -> Result<Option<String>, BackendError> {
        self.git.name_rev(hash, pattern)
    }

    fn describe(&self, hash: &str) -> Result<String, BackendError> {
        self.git.describe(hash)
    }

    fn commit_metadata(&self, hash: &str) -> Result<CommitMetadata, BackendError> {
        let commit = self.repo.find_commit(Oid::from_str(hash)?)?;
        let seconds = commit.committer().when().seconds();
        let committer_time =
            DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| BackendError::Malformed {
                args: format!("cat-file commit {hash}"),
                output: format!("committer time {seconds}"),
            })?;

        Ok(CommitMetadata {
            hash: commit.id().to_string(),
            committer_time,
        })
    }
}
