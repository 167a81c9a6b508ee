//! Materialize a commit tree into a [`MemFs`]

use git2::{ObjectType, Oid, Repository, Tree};
use git_tar_archive::vfs::join_path;
use git_tar_archive::MemFs;
use tracing::{debug, warn};

use crate::resolve::BackendError;

const MODE_SYMLINK: i32 = 0o120000;
const MODE_EXECUTABLE: i32 = 0o100755;

/// Counts of what a checkout wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    /// Submodule entries left out of the tree
    pub skipped: u64,
}

/// Write the tree of commit `hash` into `fs`, rooted at `/`.
///
/// Executable blobs get mode `0755`, all other blobs `0644`. Symlinks are
/// recorded as symlinks. Submodules are skipped.
pub fn checkout_commit(repo: &Repository, hash: &str, fs: &mut MemFs) -> Result<CheckoutStats, BackendError> {
    let commit = repo.find_commit(Oid::from_str(hash)?)?;
    let tree = commit.tree()?;

    let mut stats = CheckoutStats::default();
    let mut pending: Vec<(String, Tree<'_>)> = vec![("/".to_string(), tree)];

    while let Some((dir, tree)) = pending.pop() {
        for entry in tree.iter() {
            let name = entry.name().ok_or_else(|| BackendError::Malformed {
                args: format!("ls-tree {}", tree.id()),
                output: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
            })?;
            let path = join_path(&dir, name);
            let io_err = |source| BackendError::Io {
                path: path.clone(),
                source,
            };

            match entry.kind() {
                Some(ObjectType::Tree) => {
                    fs.create_dir_all(&path).map_err(io_err)?;
                    stats.directories += 1;
                    let subtree = repo.find_tree(entry.id())?;
                    pending.push((path, subtree));
                }
                Some(ObjectType::Blob) => {
                    let blob = repo.find_blob(entry.id())?;
                    match entry.filemode() {
                        MODE_SYMLINK => {
                            let target = String::from_utf8_lossy(blob.content()).into_owned();
                            fs.symlink(&path, &target).map_err(io_err)?;
                            stats.symlinks += 1;
                        }
                        MODE_EXECUTABLE => {
                            fs.write_file(&path, blob.content(), 0o755).map_err(io_err)?;
                            stats.files += 1;
                        }
                        _ => {
                            fs.write_file(&path, blob.content(), 0o644).map_err(io_err)?;
                            stats.files += 1;
                        }
                    }
                }
                Some(ObjectType::Commit) => {
                    warn!(%path, "skipping submodule");
                    stats.skipped += 1;
                }
                other => {
                    return Err(BackendError::Malformed {
                        args: format!("ls-tree {}", tree.id()),
                        output: format!("{path}: unexpected object {other:?}"),
                    });
                }
            }
        }
    }

    debug!(
        files = stats.files,
        directories = stats.directories,
        symlinks = stats.symlinks,
        "checked out {hash}"
    );
    Ok(stats)
}
