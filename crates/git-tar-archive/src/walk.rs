//! Ordered tree walker
//!
//! Enumerates a virtual tree depth-first in pre-order. Siblings are visited
//! in byte-wise ascending order of their name, where directory names are
//! compared with a trailing `/` appended. `apple.txt` therefore sorts before
//! the directory `apple` (`.` < `/`), and the directory `apple` sorts before
//! `apple0`. Archive reproducibility depends on this order.

use crate::error::{ArchiveError, Result};
use crate::vfs::{normalize_path, TreeEntry, Vfs};

/// Sort key for a sibling: the name, plus `/` for directories.
pub fn sort_key(entry: &TreeEntry) -> String {
    if entry.is_dir() {
        format!("{}/", entry.name())
    } else {
        entry.name().to_string()
    }
}

/// Sort siblings into walk order.
pub fn sort_siblings(entries: &mut [TreeEntry]) {
    entries.sort_by_cached_key(sort_key);
}

/// Lazy pre-order walk over a [`Vfs`].
///
/// The walk uses an explicit stack, so depth is bounded by memory rather
/// than the call stack. The first error ends the sequence.
pub struct TreeWalker<'a, F: Vfs + ?Sized> {
    fs: &'a F,
    root: String,
    stack: Vec<TreeEntry>,
    started: bool,
    done: bool,
}

impl<'a, F: Vfs + ?Sized> TreeWalker<'a, F> {
    pub fn new(fs: &'a F, root: &str) -> Self {
        Self {
            fs,
            root: root.to_string(),
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    fn fail(&mut self, err: ArchiveError) -> Option<Result<TreeEntry>> {
        self.done = true;
        self.stack.clear();
        Some(Err(err))
    }
}

impl<'a, F: Vfs + ?Sized> Iterator for TreeWalker<'a, F> {
    type Item = Result<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.started {
            self.started = true;
            let root = match normalize_path(&self.root) {
                Ok(root) => root,
                Err(e) => return self.fail(ArchiveError::filesystem(self.root.clone(), e)),
            };
            match self.fs.stat(&root) {
                Ok(entry) => self.stack.push(entry),
                Err(e) => return self.fail(ArchiveError::filesystem(root, e)),
            }
        }

        let entry = match self.stack.pop() {
            Some(entry) => entry,
            None => {
                self.done = true;
                return None;
            }
        };

        if entry.is_dir() {
            let mut children = match self.fs.read_dir(&entry.path) {
                Ok(children) => children,
                Err(e) => return self.fail(ArchiveError::filesystem(entry.path.clone(), e)),
            };
            sort_siblings(&mut children);
            self.stack.extend(children.into_iter().rev());
        }

        Some(Ok(entry))
    }
}

/// Walk `root` of `fs` in archive order.
pub fn walk<'a, F: Vfs + ?Sized>(fs: &'a F, root: &str) -> TreeWalker<'a, F> {
    TreeWalker::new(fs, root)
}
