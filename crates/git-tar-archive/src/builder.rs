//! Archive builder
//!
//! Drives the [`TreeWalker`](crate::walk::TreeWalker) over a virtual tree and
//! appends every entry to a tar stream, preceded by an optional global PAX
//! record. Output depends only on tree contents, the encode options and the
//! attributes, so repeated builds are byte-identical.

use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::time::UNIX_EPOCH;
use tar::Builder;
use tracing::debug;

use crate::encode::{EncodeOptions, ExactSize, HeaderKind};
use crate::error::{ArchiveError, Result};
use crate::pax::{self, GlobalAttributes, GLOBAL_HEADER_NAME};
use crate::vfs::{TreeEntry, Vfs};
use crate::walk::walk;

/// Counters for a finished archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Entries appended, excluding extension headers
    pub entries: u64,
    pub files: u64,
    pub directories: u64,
    /// Sum of regular file payload sizes
    pub payload_bytes: u64,
}

/// Writer that refuses all I/O once closed, so dropping an aborted
/// [`tar::Builder`] cannot append an end-of-archive marker.
struct Gate<W> {
    inner: W,
    open: bool,
}

impl<W: Write> Write for Gate<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::Other, "archive aborted"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::Other, "archive aborted"));
        }
        self.inner.flush()
    }
}

/// Streaming tar writer with normalized entries.
pub struct ArchiveBuilder<W: Write> {
    tar: Builder<Gate<W>>,
    options: EncodeOptions,
    stats: ArchiveStats,
}

impl<W: Write> ArchiveBuilder<W> {
    pub fn new(sink: W, options: EncodeOptions) -> Self {
        let tar = Builder::new(Gate {
            inner: sink,
            open: true,
        });
        Self {
            tar,
            options,
            stats: ArchiveStats::default(),
        }
    }

    pub fn stats(&self) -> ArchiveStats {
        self.stats
    }

    /// Write the archive-wide PAX record. Must precede every entry.
    pub fn append_global_attributes(&mut self, attrs: &GlobalAttributes) -> Result<()> {
        let mtime = self.options.mtime.unwrap_or_else(|| DateTime::<Utc>::from(UNIX_EPOCH));
        let (header, data) = pax::global_header(attrs, mtime)
            .map_err(|e| ArchiveError::encoding(GLOBAL_HEADER_NAME, e))?;
        self.tar
            .append(&header, data.as_slice())
            .map_err(|e| ArchiveError::encoding(GLOBAL_HEADER_NAME, e))?;
        debug!(records = attrs.len(), "wrote global attributes");
        Ok(())
    }

    /// Encode and append a single entry, streaming file contents from `fs`.
    pub fn append_entry<F: Vfs + ?Sized>(&mut self, fs: &F, entry: &TreeEntry) -> Result<()> {
        let header = self.options.encode(entry)?;
        if header.name.is_empty() {
            // source root with no base directory: nothing to name it by
            return Ok(());
        }

        let (tar_header, long_name) = header
            .to_tar_header()
            .map_err(|e| ArchiveError::encoding(entry.path.clone(), e))?;

        if let Some(name) = long_name {
            let (ext, data) = pax::long_name_header(&name, header.mtime)
                .map_err(|e| ArchiveError::encoding(entry.path.clone(), e))?;
            self.tar
                .append(&ext, data.as_slice())
                .map_err(|e| ArchiveError::encoding(entry.path.clone(), e))?;
        }

        match header.kind {
            HeaderKind::Directory => {
                self.tar
                    .append(&tar_header, io::empty())
                    .map_err(|e| ArchiveError::encoding(entry.path.clone(), e))?;
                self.stats.directories += 1;
            }
            HeaderKind::RegularFile => {
                let file = fs
                    .open(&entry.path)
                    .map_err(|e| ArchiveError::filesystem(entry.path.clone(), e))?;
                let mut payload = ExactSize::new(file, header.size);
                let appended = self.tar.append(&tar_header, &mut payload);
                if payload.is_short() {
                    return Err(ArchiveError::ShortRead {
                        path: entry.path.clone(),
                        expected: header.size,
                        actual: payload.bytes_read(),
                    });
                }
                if let Err(e) = appended {
                    return Err(if payload.source_failed() {
                        ArchiveError::filesystem(entry.path.clone(), e)
                    } else {
                        ArchiveError::encoding(entry.path.clone(), e)
                    });
                }
                self.stats.files += 1;
                self.stats.payload_bytes += header.size;
            }
        }

        self.stats.entries += 1;
        debug!(path = %entry.path, name = %header.name, "appended entry");
        Ok(())
    }

    /// Append every entry below `root` in walk order.
    pub fn append_tree<F: Vfs + ?Sized>(&mut self, fs: &F, root: &str) -> Result<()> {
        for entry in walk(fs, root) {
            self.append_entry(fs, &entry?)?;
        }
        Ok(())
    }

    /// Write the end-of-archive marker, flush, and hand back the sink.
    pub fn finish(self) -> Result<(W, ArchiveStats)> {
        let stats = self.stats;
        let gate = self
            .tar
            .into_inner()
            .map_err(|e| ArchiveError::encoding("<end of archive>", e))?;
        let mut sink = gate.inner;
        sink.flush()
            .map_err(|e| ArchiveError::encoding("<end of archive>", e))?;
        Ok((sink, stats))
    }

    /// Drop the builder without writing the end-of-archive marker.
    pub fn abort(mut self) {
        self.tar.get_mut().open = false;
    }
}

/// Build a complete archive of `fs` into `sink`.
///
/// Writes the global attributes (when non-empty), then every entry from the
/// root of `fs`. On error the sink is released without an end-of-archive
/// marker.
pub fn write_archive<F, W>(
    fs: &F,
    sink: W,
    options: EncodeOptions,
    attrs: &GlobalAttributes,
) -> Result<(W, ArchiveStats)>
where
    F: Vfs + ?Sized,
    W: Write,
{
    let root = options.source_root.clone();
    let mut builder = ArchiveBuilder::new(sink, options);

    match append_all(&mut builder, fs, &root, attrs) {
        Ok(()) => builder.finish(),
        Err(e) => {
            builder.abort();
            Err(e)
        }
    }
}

fn append_all<F, W>(
    builder: &mut ArchiveBuilder<W>,
    fs: &F,
    root: &str,
    attrs: &GlobalAttributes,
) -> Result<()>
where
    F: Vfs + ?Sized,
    W: Write,
{
    if !attrs.is_empty() {
        builder.append_global_attributes(attrs)?;
    }
    builder.append_tree(fs, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemFs;
    use std::io::Read;

    fn sample_tree() -> MemFs {
        let mut fs = MemFs::new();
        fs.write_file("/README", "hello\n", 0o644).unwrap();
        fs.write_file("/lib/strict.pm", "package strict;\n1;\n", 0o644).unwrap();
        fs.write_file("/lib.txt", "x", 0o600).unwrap();
        fs.write_file("/Configure", "#!/bin/sh\n", 0o755).unwrap();
        fs
    }

    fn options() -> EncodeOptions {
        EncodeOptions::new("pkg-123")
            .with_mtime(DateTime::<Utc>::from_timestamp(1_362_696_697, 0).unwrap())
    }

    fn build(fs: &MemFs, attrs: &GlobalAttributes) -> Vec<u8> {
        let (bytes, _) = write_archive(fs, Vec::new(), options(), attrs).unwrap();
        bytes
    }

    #[test]
    fn test_entries_in_walk_order() {
        let fs = sample_tree();
        let bytes = build(&fs, &GlobalAttributes::new());

        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "pkg-123/",
                "pkg-123/Configure",
                "pkg-123/README",
                "pkg-123/lib.txt",
                "pkg-123/lib/",
                "pkg-123/lib/strict.pm",
            ]
        );
    }

    #[test]
    fn test_stats() {
        let fs = sample_tree();
        let (_, stats) = write_archive(&fs, Vec::new(), options(), &GlobalAttributes::new()).unwrap();

        assert_eq!(stats.entries, 6);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.files, 4);
        assert_eq!(stats.payload_bytes, 6 + 19 + 1 + 10);
    }

    #[test]
    fn test_global_attributes_first() {
        let fs = sample_tree();
        let attrs = GlobalAttributes::with_comment("e94431af0ada74486afd65207f3e0345fe7485fe");
        let bytes = build(&fs, &attrs);

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut entries = archive.entries().unwrap();

        let mut first = entries.next().unwrap().unwrap();
        assert_eq!(first.header().entry_type(), tar::EntryType::XGlobalHeader);
        let mut body = String::new();
        first.read_to_string(&mut body).unwrap();
        assert_eq!(body, "52 comment=e94431af0ada74486afd65207f3e0345fe7485fe\n");

        let second = entries.next().unwrap().unwrap();
        assert_eq!(second.header().entry_type(), tar::EntryType::Directory);
    }

    #[test]
    fn test_no_attributes_no_global_record() {
        let fs = sample_tree();
        let bytes = build(&fs, &GlobalAttributes::new());

        let mut archive = tar::Archive::new(bytes.as_slice());
        let first = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(first.header().entry_type(), tar::EntryType::Directory);
    }

    #[test]
    fn test_deterministic_output() {
        let attrs = GlobalAttributes::with_comment("abc");
        let first = build(&sample_tree(), &attrs);

        // different native mtimes and insertion order
        let mut fs = MemFs::with_mtime(Utc::now());
        fs.write_file("/Configure", "#!/bin/sh\n", 0o755).unwrap();
        fs.write_file("/lib.txt", "x", 0o600).unwrap();
        fs.write_file("/lib/strict.pm", "package strict;\n1;\n", 0o644).unwrap();
        fs.write_file("/README", "hello\n", 0o644).unwrap();
        let second = build(&fs, &attrs);

        assert_eq!(first, second);
    }

    #[test]
    fn test_archive_ends_with_marker() {
        let bytes = build(&sample_tree(), &GlobalAttributes::new());
        assert_eq!(bytes.len() % 512, 0);
        assert!(bytes[bytes.len() - 1024..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_symlink_aborts_without_marker() {
        let mut fs = MemFs::new();
        fs.write_file("/a", "a", 0o644).unwrap();
        fs.symlink("/b", "a").unwrap();

        let mut sink = Vec::new();
        let err = write_archive(&fs, &mut sink, options(), &GlobalAttributes::new()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedEntry { ref path } if path == "/b"));

        // root dir header + "/a" header and one padded block, no trailing zeros
        assert_eq!(sink.len(), 512 * 3);
    }

    #[test]
    fn test_long_names_round_trip() {
        let mut fs = MemFs::new();
        let long_dir = "d".repeat(150);
        let long_file = "f".repeat(120);
        fs.write_file(&format!("/{long_dir}/{long_file}"), "deep", 0o644).unwrap();

        let bytes = build(&fs, &GlobalAttributes::new());
        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "pkg-123/".to_string(),
                format!("pkg-123/{long_dir}/"),
                format!("pkg-123/{long_dir}/{long_file}"),
            ]
        );
    }

    struct Truncated(MemFs);

    impl Vfs for Truncated {
        fn stat(&self, path: &str) -> io::Result<TreeEntry> {
            let mut entry = self.0.stat(path)?;
            if !entry.is_dir() {
                entry.size += 10;
            }
            Ok(entry)
        }

        fn read_dir(&self, path: &str) -> io::Result<Vec<TreeEntry>> {
            self.0
                .read_dir(path)?
                .into_iter()
                .map(|e| self.stat(&e.path))
                .collect()
        }

        fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
            self.0.open(path)
        }

        fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>> {
            self.0.create(path)
        }
    }

    #[test]
    fn test_short_read_reported() {
        let mut inner = MemFs::new();
        inner.write_file("/a", "abc", 0o644).unwrap();
        let fs = Truncated(inner);

        let err = write_archive(&fs, Vec::new(), options(), &GlobalAttributes::new()).unwrap_err();
        match err {
            ArchiveError::ShortRead {
                path,
                expected,
                actual,
            } => {
                assert_eq!(path, "/a");
                assert_eq!(expected, 13);
                assert_eq!(actual, 3);
            }
            other => panic!("expected ShortRead, got {:?}", other),
        }
    }
}
