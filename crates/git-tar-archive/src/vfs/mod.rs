//! Virtual filesystem abstraction
//!
//! The archive encoder never touches the host filesystem directly. It reads
//! through [`Vfs`], which addresses entries by `/`-rooted virtual paths.
//! Two implementations are provided: [`MemFs`] (an in-memory tree, used as
//! the checkout target) and [`OsFs`] (a host directory).

mod mem;
mod os;

pub use mem::MemFs;
pub use os::OsFs;

use chrono::{DateTime, Utc};
use std::io::{self, Read, Write};

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, fifos, devices and anything else the host reports.
    Other,
}

/// Metadata for one entry of a virtual filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Absolute virtual path, rooted at `/`
    pub path: String,
    pub kind: EntryKind,
    /// Payload size in bytes (0 for directories)
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// Permission bits (`0o7777` range)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Last path component (empty for the root).
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

/// Read/write access to a tree addressed by `/`-rooted virtual paths.
pub trait Vfs {
    /// Metadata for a single path, without following symlinks.
    fn stat(&self, path: &str) -> io::Result<TreeEntry>;

    /// Entries directly below `path`, in no particular order.
    fn read_dir(&self, path: &str) -> io::Result<Vec<TreeEntry>>;

    /// Open a regular file for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    /// Create or truncate a regular file inside an existing directory.
    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>>;
}

/// Normalize a virtual path to `/`-rooted form with no empty or `.`
/// components.
///
/// Relative input is treated as relative to the root. `..` is rejected.
pub fn normalize_path(path: &str) -> io::Result<String> {
    let mut normalized = String::with_capacity(path.len() + 1);
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("parent components are not allowed: {path}"),
                ))
            }
            name => {
                normalized.push('/');
                normalized.push_str(name);
            }
        }
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Join a child name onto a normalized virtual directory path.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent of a normalized virtual path (`None` for the root).
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => Some("/"),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}
