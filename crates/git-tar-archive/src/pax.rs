//! PAX extended header records
//!
//! A PAX record is `"<len> <key>=<value>\n"`, where `<len>` is the decimal
//! byte length of the whole record including its own digits. Global records
//! (type `g`) apply to every following entry; local records (type `x`) apply
//! to the next entry only.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io;
use tar::{EntryType, Header};

/// Name of the global extended header entry
pub const GLOBAL_HEADER_NAME: &str = "GlobalHead.0.0";

/// Directory component used for local extended header entries
const LOCAL_HEADER_DIR: &str = "PaxHeaders.0";

/// Key under which the commit hash is recorded
pub const COMMENT_KEY: &str = "comment";

/// Archive-wide PAX attributes, emitted once at the start of the stream.
///
/// Keys are kept sorted so the encoded record is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalAttributes {
    records: BTreeMap<String, String>,
}

impl GlobalAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes carrying `comment=<value>`.
    pub fn with_comment(value: impl Into<String>) -> Self {
        let mut attrs = Self::new();
        attrs.insert(COMMENT_KEY, value);
        attrs
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.records.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode all records in key order.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        for (key, value) in self.iter() {
            data.extend_from_slice(&record(key, value)?);
        }
        Ok(data)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GlobalAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Self::new();
        for (key, value) in iter {
            attrs.insert(key, value);
        }
        attrs
    }
}

/// Encode one PAX record.
pub fn record(key: &str, value: &str) -> io::Result<Vec<u8>> {
    if key.is_empty() || key.contains('=') || key.contains('\0') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid PAX key: {key:?}"),
        ));
    }

    // " " + "=" + "\n"
    let body = key.len() + value.len() + 3;
    let mut total = body + decimal_width(body);
    while body + decimal_width(total) != total {
        total = body + decimal_width(total);
    }

    Ok(format!("{total} {key}={value}\n").into_bytes())
}

fn decimal_width(n: usize) -> usize {
    n.to_string().len()
}

/// Header and payload for the global attribute entry.
pub fn global_header(attrs: &GlobalAttributes, mtime: DateTime<Utc>) -> io::Result<(Header, Vec<u8>)> {
    let data = attrs.encode()?;
    let header = extension_header(EntryType::XGlobalHeader, GLOBAL_HEADER_NAME, data.len(), mtime)?;
    Ok((header, data))
}

/// Header and payload for a local extension carrying a long entry name.
pub fn long_name_header(name: &str, mtime: DateTime<Utc>) -> io::Result<(Header, Vec<u8>)> {
    let data = record("path", name)?;
    let base = name.trim_end_matches('/').rsplit('/').next().unwrap_or(name);
    let header_name = format!(
        "{LOCAL_HEADER_DIR}/{}",
        truncate_on_char_boundary(base, 99 - LOCAL_HEADER_DIR.len() - 1)
    );
    let header = extension_header(EntryType::XHeader, &header_name, data.len(), mtime)?;
    Ok((header, data))
}

fn extension_header(kind: EntryType, name: &str, size: usize, mtime: DateTime<Utc>) -> io::Result<Header> {
    let mut header = Header::new_ustar();
    header.set_entry_type(kind);
    header.set_path(name)?;
    header.set_size(size as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(unix_seconds(mtime));
    header.set_cksum();
    Ok(header)
}

/// Seconds since the epoch, clamped at zero.
pub(crate) fn unix_seconds(time: DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp()).unwrap_or(0)
}

pub(crate) fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
