//! Archive entry encoding
//!
//! Turns a [`TreeEntry`] into a normalized [`ArchiveHeader`]:
//! - the source root is replaced by the base directory prefix
//! - permission bits always include `0664`, directories also `0111`
//! - directories carry a trailing `/`
//! - uid/gid 0 are named `root`
//! - an optional uniform timestamp replaces per-entry mtimes

use chrono::{DateTime, Utc};
use std::io::{self, Read};
use tar::Header;

use crate::error::{ArchiveError, Result};
use crate::pax::{truncate_on_char_boundary, unix_seconds};
use crate::vfs::{normalize_path, EntryKind, TreeEntry};

/// Permission bits every entry carries
pub const MODE_FLOOR: u32 = 0o664;

/// Extra bits every directory carries
pub const DIR_MODE_BITS: u32 = 0o111;

/// Owner and group name used for id 0
pub const ROOT_NAME: &str = "root";

/// Entry type recorded in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    RegularFile,
    Directory,
}

/// Normalized metadata for one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Name inside the archive, relative, `/`-terminated for directories
    pub name: String,
    pub kind: HeaderKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// `root` for uid 0, otherwise empty
    pub owner_name: String,
    /// `root` for gid 0, otherwise empty
    pub group_name: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
}

impl ArchiveHeader {
    /// Build the ustar header for this entry.
    ///
    /// Returns the header and, when the name does not fit the ustar name and
    /// prefix fields, the full name to carry in a PAX `path` record.
    pub fn to_tar_header(&self) -> io::Result<(Header, Option<String>)> {
        let mut header = Header::new_ustar();
        header.set_entry_type(match self.kind {
            HeaderKind::RegularFile => tar::EntryType::Regular,
            HeaderKind::Directory => tar::EntryType::Directory,
        });
        header.set_mode(self.mode);
        header.set_uid(u64::from(self.uid));
        header.set_gid(u64::from(self.gid));
        header.set_mtime(unix_seconds(self.mtime));
        header.set_size(match self.kind {
            HeaderKind::RegularFile => self.size,
            HeaderKind::Directory => 0,
        });
        if !self.owner_name.is_empty() {
            header.set_username(&self.owner_name)?;
        }
        if !self.group_name.is_empty() {
            header.set_groupname(&self.group_name)?;
        }

        let long_name = match header.set_path(&self.name) {
            Ok(()) => None,
            Err(_) => {
                let truncated = truncate_on_char_boundary(&self.name, 100).as_bytes();
                if let Some(ustar) = header.as_ustar_mut() {
                    ustar.prefix.fill(0);
                }
                let field = &mut header.as_old_mut().name;
                field.fill(0);
                field[..truncated.len()].copy_from_slice(truncated);
                Some(self.name.clone())
            }
        };

        header.set_cksum();
        Ok((header, long_name))
    }
}

/// How entry paths and times are rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Virtual path whose contents are archived, usually `/`
    pub source_root: String,
    /// Prefix every archive name is placed under
    pub base_dir: String,
    /// Timestamp stamped on every entry instead of its own mtime
    pub mtime: Option<DateTime<Utc>>,
}

impl EncodeOptions {
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            source_root: "/".to_string(),
            base_dir: base_dir.into(),
            mtime: None,
        }
    }

    pub fn with_source_root(mut self, source_root: impl Into<String>) -> Self {
        self.source_root = source_root.into();
        self
    }

    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Archive name for a virtual path, without the directory suffix.
    ///
    /// An empty result means the path is the source root and there is no
    /// base directory to name it by.
    pub fn archive_name(&self, path: &str) -> Result<String> {
        let root = normalize_path(&self.source_root)
            .map_err(|e| ArchiveError::filesystem(self.source_root.clone(), e))?;
        let path = normalize_path(path).map_err(|e| ArchiveError::filesystem(path, e))?;

        let relative = if root == "/" {
            path.trim_start_matches('/')
        } else if path == root {
            ""
        } else if let Some(rest) = path.strip_prefix(&root).and_then(|r| r.strip_prefix('/')) {
            rest
        } else {
            return Err(ArchiveError::filesystem(
                path.clone(),
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("outside of source root {root}"),
                ),
            ));
        };

        let base = self.base_dir.trim_matches('/');
        Ok(match (base.is_empty(), relative.is_empty()) {
            (true, _) => relative.to_string(),
            (false, true) => base.to_string(),
            (false, false) => format!("{base}/{relative}"),
        })
    }

    /// Normalize one entry into an archive header.
    pub fn encode(&self, entry: &TreeEntry) -> Result<ArchiveHeader> {
        let kind = match entry.kind {
            EntryKind::File => HeaderKind::RegularFile,
            EntryKind::Directory => HeaderKind::Directory,
            EntryKind::Symlink | EntryKind::Other => {
                return Err(ArchiveError::UnsupportedEntry {
                    path: entry.path.clone(),
                })
            }
        };

        let mut name = self.archive_name(&entry.path)?;
        let mut mode = (entry.mode & 0o7777) | MODE_FLOOR;
        if kind == HeaderKind::Directory {
            mode |= DIR_MODE_BITS;
            if !name.is_empty() {
                name.push('/');
            }
        }

        Ok(ArchiveHeader {
            name,
            kind,
            mode,
            uid: entry.uid,
            gid: entry.gid,
            owner_name: root_name(entry.uid),
            group_name: root_name(entry.gid),
            mtime: self.mtime.unwrap_or(entry.mtime),
            size: match kind {
                HeaderKind::RegularFile => entry.size,
                HeaderKind::Directory => 0,
            },
        })
    }
}

fn root_name(id: u32) -> String {
    if id == 0 {
        ROOT_NAME.to_string()
    } else {
        String::new()
    }
}

/// Reader yielding exactly `expected` bytes from `inner`.
///
/// Extra source bytes are ignored. If the source ends early the read fails
/// with `UnexpectedEof` and [`ExactSize::is_short`] reports it. Errors from
/// `inner` itself are flagged by [`ExactSize::source_failed`], which lets a
/// caller tell them apart from failures of the archive sink.
pub struct ExactSize<R> {
    inner: R,
    expected: u64,
    read: u64,
    short: bool,
    failed: bool,
}

impl<R: Read> ExactSize<R> {
    pub fn new(inner: R, expected: u64) -> Self {
        Self {
            inner,
            expected,
            read: 0,
            short: false,
            failed: false,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn is_short(&self) -> bool {
        self.short
    }

    pub fn source_failed(&self) -> bool {
        self.failed
    }
}

impl<R: Read> Read for ExactSize<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.expected - self.read;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let limit = usize::try_from(remaining).unwrap_or(usize::MAX).min(buf.len());
        let n = match self.inner.read(&mut buf[..limit]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => {
                self.failed = true;
                return Err(e);
            }
        };
        if n == 0 {
            self.short = true;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload ended after {} of {} bytes", self.read, self.expected),
            ));
        }
        self.read += n as u64;
        Ok(n)
    }
}
