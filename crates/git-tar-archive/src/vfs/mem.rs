//! In-memory virtual filesystem

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use super::{join_path, normalize_path, parent_path, EntryKind, TreeEntry, Vfs};

#[derive(Debug, Clone)]
enum Content {
    File(Vec<u8>),
    Directory,
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    content: Content,
    mode: u32,
    mtime: DateTime<Utc>,
}

/// An in-memory tree.
///
/// All entries are owned by uid/gid 0. Nodes are kept in a flat map keyed
/// by normalized path, so the children of a directory are a contiguous
/// key range.
#[derive(Debug, Clone)]
pub struct MemFs {
    nodes: BTreeMap<String, Node>,
    mtime: DateTime<Utc>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create an empty tree containing only the root directory.
    pub fn new() -> Self {
        Self::with_mtime(Utc::now())
    }

    /// Create an empty tree whose new entries are stamped with `mtime`.
    pub fn with_mtime(mtime: DateTime<Utc>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                content: Content::Directory,
                mode: 0o755,
                mtime,
            },
        );
        Self { nodes, mtime }
    }

    /// Number of entries, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Create a directory and any missing parents.
    pub fn create_dir_all(&mut self, path: &str) -> io::Result<()> {
        let path = normalize_path(path)?;
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            match self.nodes.get(&current) {
                Some(Node {
                    content: Content::Directory,
                    ..
                }) => {}
                Some(_) => return Err(not_a_directory(&current)),
                None => {
                    self.nodes.insert(
                        current.clone(),
                        Node {
                            content: Content::Directory,
                            mode: 0o755,
                            mtime: self.mtime,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Write a regular file, creating missing parent directories.
    pub fn write_file(&mut self, path: &str, data: impl Into<Vec<u8>>, mode: u32) -> io::Result<()> {
        let path = normalize_path(path)?;
        if let Some(parent) = parent_path(&path) {
            self.create_dir_all(parent)?;
        }
        self.insert_leaf(path, Content::File(data.into()), mode)
    }

    /// Record a symbolic link, creating missing parent directories.
    pub fn symlink(&mut self, path: &str, target: &str) -> io::Result<()> {
        let path = normalize_path(path)?;
        if let Some(parent) = parent_path(&path) {
            self.create_dir_all(parent)?;
        }
        self.insert_leaf(path, Content::Symlink(target.to_string()), 0o777)
    }

    /// Override the permission bits of an existing entry.
    pub fn set_mode(&mut self, path: &str, mode: u32) -> io::Result<()> {
        let path = normalize_path(path)?;
        let node = self.nodes.get_mut(&path).ok_or_else(|| not_found(&path))?;
        node.mode = mode & 0o7777;
        Ok(())
    }

    /// Override the modification time of an existing entry.
    pub fn set_mtime(&mut self, path: &str, mtime: DateTime<Utc>) -> io::Result<()> {
        let path = normalize_path(path)?;
        let node = self.nodes.get_mut(&path).ok_or_else(|| not_found(&path))?;
        node.mtime = mtime;
        Ok(())
    }

    /// Contents of a regular file.
    pub fn read_file(&self, path: &str) -> io::Result<&[u8]> {
        let path = normalize_path(path)?;
        match self.nodes.get(&path) {
            Some(Node {
                content: Content::File(data),
                ..
            }) => Ok(data),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {path}"),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn insert_leaf(&mut self, path: String, content: Content, mode: u32) -> io::Result<()> {
        if let Some(Node {
            content: Content::Directory,
            ..
        }) = self.nodes.get(&path)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("is a directory: {path}"),
            ));
        }
        self.nodes.insert(
            path,
            Node {
                content,
                mode: mode & 0o7777,
                mtime: self.mtime,
            },
        );
        Ok(())
    }

    fn entry(path: &str, node: &Node) -> TreeEntry {
        let (kind, size) = match &node.content {
            Content::File(data) => (EntryKind::File, data.len() as u64),
            Content::Directory => (EntryKind::Directory, 0),
            Content::Symlink(target) => (EntryKind::Symlink, target.len() as u64),
        };
        TreeEntry {
            path: path.to_string(),
            kind,
            size,
            mtime: node.mtime,
            mode: node.mode,
            uid: 0,
            gid: 0,
        }
    }
}

impl Vfs for MemFs {
    fn stat(&self, path: &str) -> io::Result<TreeEntry> {
        let path = normalize_path(path)?;
        self.nodes
            .get(&path)
            .map(|node| Self::entry(&path, node))
            .ok_or_else(|| not_found(&path))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<TreeEntry>> {
        let path = normalize_path(path)?;
        match self.nodes.get(&path) {
            Some(Node {
                content: Content::Directory,
                ..
            }) => {}
            Some(_) => return Err(not_a_directory(&path)),
            None => return Err(not_found(&path)),
        }

        let prefix = join_path(&path, "");
        let children = self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| {
                let rest = &key[prefix.len()..];
                !rest.is_empty() && !rest.contains('/')
            })
            .map(|(key, node)| Self::entry(key, node))
            .collect();
        Ok(children)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let data = self.read_file(path)?;
        Ok(Box::new(data))
    }

    fn create(&mut self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let path = normalize_path(path)?;
        let parent = parent_path(&path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot create the root")
        })?;
        match self.nodes.get(parent) {
            Some(Node {
                content: Content::Directory,
                ..
            }) => {}
            Some(_) => return Err(not_a_directory(parent)),
            None => return Err(not_found(parent)),
        }

        let mode = match self.nodes.get(&path) {
            Some(Node {
                content: Content::File(_),
                mode,
                ..
            }) => *mode,
            _ => 0o644,
        };
        self.insert_leaf(path.clone(), Content::File(Vec::new()), mode)?;

        match self.nodes.get_mut(&path) {
            Some(Node {
                content: Content::File(data),
                ..
            }) => Ok(Box::new(data)),
            _ => Err(not_found(&path)),
        }
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {path}"))
}

fn not_a_directory(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("not a directory: {path}"),
    )
}
