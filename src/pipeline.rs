//! End-to-end archive pipeline
//!
//! - Open or clone the bare mirror, fetching when asked
//! - Resolve the commit and compute its patch line
//! - Check the commit out into memory and add the patch file
//! - Write the archive, stamped with the committer time and annotated with
//!   the commit hash

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{info, warn};

use git_tar_archive::{write_archive, ArchiveError, ArchiveStats, EncodeOptions, GlobalAttributes, MemFs, Vfs};

use crate::config::{ConfigError, GitTarConfig};
use crate::git::{CheckoutStats, GitMirror};
use crate::resolve::{BackendError, PatchLine, RefBackend, RefResolver, ResolveError};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("repository error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("could not write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::Backend(_) => 3,
            PipelineError::Resolve(ResolveError::UnresolvedReference { .. }) => 4,
            PipelineError::Resolve(ResolveError::Backend(_)) => 3,
            PipelineError::Archive(e) if e.is_filesystem() => 5,
            PipelineError::Archive(_) => 6,
            PipelineError::Output { .. } => 6,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// What a finished archive run produced
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub output: PathBuf,
    pub hash: String,
    pub patch_line: String,
    pub entries: u64,
    pub files: u64,
    pub directories: u64,
    pub payload_bytes: u64,
    /// Submodules left out of the checkout
    pub skipped: u64,
    pub size: u64,
    pub sha256: String,
}

impl ArchiveSummary {
    fn new(output: &Path, line: &PatchLine, archive: ArchiveStats, checkout: CheckoutStats, size: u64, sha256: String) -> Self {
        Self {
            output: output.to_path_buf(),
            hash: line.hash.clone(),
            patch_line: line.to_string(),
            entries: archive.entries,
            files: archive.files,
            directories: archive.directories,
            payload_bytes: archive.payload_bytes,
            skipped: checkout.skipped,
            size,
            sha256,
        }
    }
}

/// Location of the bare clone for one run
#[derive(Debug)]
pub enum CloneDir {
    Configured(PathBuf),
    /// Removed when dropped
    Temporary(TempDir),
}

impl CloneDir {
    /// The configured directory, or a fresh temporary one.
    pub fn prepare(config: &GitTarConfig) -> PipelineResult<Self> {
        match &config.repo.directory {
            Some(dir) => Ok(Self::Configured(dir.clone())),
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("git-tar-")
                    .tempdir()
                    .map_err(|e| PipelineError::Output {
                        path: std::env::temp_dir(),
                        source: e,
                    })?;
                info!(dir = %temp.path().display(), "cloning into temporary directory (will be cleaned up)");
                Ok(Self::Temporary(temp))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Configured(dir) => dir.as_path(),
            Self::Temporary(temp) => temp.path(),
        }
    }
}

/// Open the mirror in `dir`, cloning on first use and fetching if asked.
pub fn open_mirror(config: &GitTarConfig, dir: &Path) -> PipelineResult<GitMirror> {
    let fresh = !dir.join("HEAD").is_file();
    let mirror = GitMirror::open_or_clone(&config.repo.url, dir)?;
    if config.archive.fetch && !fresh {
        mirror.update()?;
    }
    Ok(mirror)
}

/// Compute the patch line for the configured commit.
pub fn compute_patch_line<B: RefBackend>(backend: B, config: &GitTarConfig) -> PipelineResult<PatchLine> {
    let resolver = RefResolver::with_candidates(backend, config.resolve.branch_candidates.iter().cloned());
    Ok(resolver.patch_line(&config.archive.commit)?)
}

/// Run the full pipeline.
pub fn run_archive(config: &GitTarConfig) -> PipelineResult<ArchiveSummary> {
    let clone_dir = CloneDir::prepare(config)?;
    run_archive_in(config, clone_dir.path())
}

/// Run the full pipeline with the bare clone in `dir`.
pub fn run_archive_in(config: &GitTarConfig, dir: &Path) -> PipelineResult<ArchiveSummary> {
    let mirror = open_mirror(config, dir)?;
    let line = compute_patch_line(&mirror, config)?;

    let mut tree = MemFs::with_mtime(line.committer_time);
    let checkout = mirror.checkout(&line.hash, &mut tree)?;
    info!(
        hash = %line.hash,
        files = checkout.files,
        directories = checkout.directories,
        "checked out commit"
    );

    write_patch_file(&mut tree, &config.archive.patch_file, &line)?;

    let output = &config.archive.output;
    let stats = write_archive_file(&tree, output, &config.archive.base_dir, &line)?;
    let (size, sha256) = file_digest(output)?;
    info!(
        output = %output.display(),
        entries = stats.entries,
        size,
        %sha256,
        "wrote archive"
    );

    Ok(ArchiveSummary::new(output, &line, stats, checkout, size, sha256))
}

/// Write `line` (no trailing newline) to `/<name>` in `tree`.
pub fn write_patch_file<F: Vfs + ?Sized>(tree: &mut F, name: &str, line: &PatchLine) -> PipelineResult<()> {
    let path = format!("/{name}");
    let fs_err = |e| ArchiveError::Filesystem {
        path: path.clone(),
        source: e,
    };
    let mut file = tree.create(&path).map_err(fs_err)?;
    file.write_all(line.to_string().as_bytes()).map_err(fs_err)?;
    file.flush().map_err(fs_err)?;
    Ok(())
}

/// Archive `tree` into a new file at `output`.
///
/// A failed build leaves no file behind.
pub fn write_archive_file<F: Vfs + ?Sized>(
    tree: &F,
    output: &Path,
    base_dir: &str,
    line: &PatchLine,
) -> PipelineResult<ArchiveStats> {
    let output_err = |source| PipelineError::Output {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(output_err)?;
    }
    let file = File::create(output).map_err(output_err)?;

    let options = EncodeOptions::new(base_dir).with_mtime(line.committer_time);
    let attrs = GlobalAttributes::with_comment(line.hash.clone());

    match write_archive(tree, BufWriter::new(file), options, &attrs) {
        Ok((writer, stats)) => {
            let file = writer.into_inner().map_err(|e| output_err(e.into_error()))?;
            file.sync_all().map_err(output_err)?;
            Ok(stats)
        }
        Err(e) => {
            discard_partial_output(output);
            Err(e.into())
        }
    }
}

/// Remove a partially written archive. Failure is logged, not returned, so
/// the build error stays the one reported.
fn discard_partial_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %output.display(), error = %e, "could not remove partial archive");
        }
    }
}

/// Size and SHA-256 of a file.
pub fn file_digest(path: &Path) -> PipelineResult<(u64, String)> {
    let output_err = |source| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(output_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(output_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}
