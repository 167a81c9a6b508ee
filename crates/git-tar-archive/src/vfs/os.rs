//! Host directory exposed as a virtual filesystem

use chrono::{DateTime, Utc};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{join_path, normalize_path, EntryKind, TreeEntry, Vfs};

/// A host directory viewed as a `/`-rooted tree.
///
/// Symlinks are reported as [`EntryKind::Symlink`] and never followed.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> io::Result<(String, PathBuf)> {
        let normalized = normalize_path(path)?;
        let host = self.root.join(normalized.trim_start_matches('/'));
        Ok((normalized, host))
    }

    fn entry(path: String, metadata: &Metadata) -> io::Result<TreeEntry> {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        let mtime = modified_time(&path, metadata.modified())?;
        let (mode, uid, gid) = ownership(metadata);

        Ok(TreeEntry {
            path,
            kind,
            size: if kind == EntryKind::Directory { 0 } else { metadata.len() },
            mtime,
            mode,
            uid,
            gid,
        })
    }
}

fn modified_time(path: &str, modified: io::Result<SystemTime>) -> io::Result<DateTime<Utc>> {
    modified
        .map(DateTime::<Utc>::from)
        .map_err(|e| io::Error::new(e.kind(), format!("modification time of {path}: {e}")))
}

#[cfg(unix)]
fn ownership(metadata: &Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (metadata.mode() & 0o7777, metadata.uid(), metadata.gid())
}

#[cfg(not(unix))]
fn ownership(metadata: &Metadata) -> (u32, u32, u32) {
    let mode = if metadata.is_dir() {
        0o755
    } else if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    };
    (mode, 0, 0)
}

impl Vfs for OsFs {
    fn stat(&self, path: &str) -> io::Result<TreeEntry> {
        let (path, host) = self.host_path(path)?;
        let metadata = fs::symlink_metadata(host)?;
        Self::entry(path, &metadata)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<TreeEntry>> {
        let (path, host) = self.host_path(path)?;
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(host)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().into_string().map_err(|raw| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name in {path}: {raw:?}"),
                )
            })?;
            let metadata = fs::symlink_metadata(dir_entry.path())?;
            entries.push(Self::entry(join_path(&path, &name), &metadata)?);
        }
        Ok(entries)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let (_, host) = self.host_path(path)?;
        Ok(Box::new(File::open(host)?))
    }

    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let (_, host) = self.host_path(path)?;
        Ok(Box::new(File::create(host)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README"), "hello").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/strict.pm"), "package strict;").unwrap();
        dir
    }

    #[test]
    fn test_stat_and_read_dir() {
        let dir = create_test_dir();
        let fs = OsFs::new(dir.path());

        let root = fs.stat("/").unwrap();
        assert!(root.is_dir());
        assert_eq!(root.path, "/");

        let readme = fs.stat("/README").unwrap();
        assert_eq!(readme.kind, EntryKind::File);
        assert_eq!(readme.size, 5);

        let mut children: Vec<_> = fs
            .read_dir("/")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        children.sort();
        assert_eq!(children, vec!["/README", "/lib"]);
    }

    #[test]
    fn test_create_and_open() {
        let dir = create_test_dir();
        let mut fs = OsFs::new(dir.path());

        fs.create("/.patch").unwrap().write_all(b"blead").unwrap();

        let mut contents = String::new();
        fs.open("/.patch")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "blead");
    }

    #[test]
    fn test_missing_path() {
        let dir = create_test_dir();
        let fs = OsFs::new(dir.path());
        assert_eq!(
            fs.stat("/missing").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_modified_time_error_propagates() {
        let err = modified_time(
            "/README",
            Err(io::Error::new(io::ErrorKind::Unsupported, "no mtime")),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(err.to_string().contains("/README"));

        let stamp = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_362_696_697);
        assert_eq!(
            modified_time("/README", Ok(stamp)).unwrap().timestamp(),
            1_362_696_697
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_not_followed() {
        let dir = create_test_dir();
        std::os::unix::fs::symlink("README", dir.path().join("link")).unwrap();

        let fs = OsFs::new(dir.path());
        assert_eq!(fs.stat("/link").unwrap().kind, EntryKind::Symlink);
    }
}
