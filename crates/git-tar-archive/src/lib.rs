//! Reproducible tar archives of virtual trees
//!
//! Walks a [`Vfs`] in a fixed order and writes a POSIX tar stream with
//! normalized entry metadata, optionally preceded by a global PAX record
//! such as `comment=<commit hash>`.

pub mod builder;
pub mod encode;
pub mod error;
pub mod pax;
pub mod vfs;
pub mod walk;

pub use builder::{write_archive, ArchiveBuilder, ArchiveStats};
pub use encode::{ArchiveHeader, EncodeOptions, HeaderKind};
pub use error::{ArchiveError, Result};
pub use pax::GlobalAttributes;
pub use vfs::{normalize_path, EntryKind, MemFs, OsFs, TreeEntry, Vfs};
pub use walk::{walk, TreeWalker};
