//! Resolved torrent metadata.

use crate::{InfoHash, MetainfoError};
use serde::{Deserialize, Serialize};
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

const PIECE_LENGTH: i64 = 256 * 1024;

/// A file described by a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the torrent root.
    pub path: PathBuf,
    /// Length in bytes.
    pub length: u64,
}

/// Metadata of a job whose content has been resolved.
///
/// The bencoded info dictionary is kept verbatim so the torrent can be
/// written back out with an unchanged info hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metainfo {
    /// SHA-1 of the info dictionary.
    pub info_hash: InfoHash,
    /// Display name, also the name of the on-disk data root.
    pub name: String,
    /// Sum of all file lengths.
    pub total_length: u64,
    /// Files in the torrent, in declaration order.
    pub files: Vec<FileEntry>,
    /// Announce URLs.
    #[serde(default)]
    pub trackers: Vec<String>,
    #[serde(with = "hex")]
    info: Vec<u8>,
}

#[derive(Deserialize)]
struct RawTorrent {
    announce: Option<String>,
    #[serde(rename = "announce-list")]
    announce_list: Option<Vec<Vec<String>>>,
    info: Value,
}

#[derive(Deserialize)]
struct RawInfo {
    name: String,
    length: Option<u64>,
    files: Option<Vec<RawFile>>,
}

#[derive(Deserialize)]
struct RawFile {
    length: u64,
    path: Vec<String>,
}

impl Metainfo {
    /// Parses a bencoded `.torrent` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid bencode or lacks the
    /// fields needed to size the content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        let raw: RawTorrent = serde_bencode::from_bytes(bytes)?;

        let mut trackers = Vec::new();
        for url in raw
            .announce
            .into_iter()
            .chain(raw.announce_list.into_iter().flatten().flatten())
        {
            if !trackers.contains(&url) {
                trackers.push(url);
            }
        }

        let info = serde_bencode::to_bytes(&raw.info)?;
        Self::from_info(info, trackers)
    }

    /// Reads and parses a `.torrent` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MetainfoError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Builds metadata for a single-file torrent.
    ///
    /// # Errors
    ///
    /// Returns an error if the info dictionary cannot be encoded.
    pub fn single_file(name: &str, length: u64) -> Result<Self, MetainfoError> {
        let mut dict = HashMap::new();
        dict.insert(b"name".to_vec(), Value::Bytes(name.as_bytes().to_vec()));
        dict.insert(
            b"length".to_vec(),
            Value::Int(i64::try_from(length).unwrap_or(i64::MAX)),
        );
        dict.insert(b"piece length".to_vec(), Value::Int(PIECE_LENGTH));
        dict.insert(b"pieces".to_vec(), Value::Bytes(Vec::new()));

        let info = serde_bencode::to_bytes(&Value::Dict(dict))?;
        Self::from_info(info, Vec::new())
    }

    fn from_info(info: Vec<u8>, trackers: Vec<String>) -> Result<Self, MetainfoError> {
        let digest: [u8; 20] = Sha1::digest(&info).into();
        let raw: RawInfo = serde_bencode::from_bytes(&info)?;

        if !is_plain_component(&raw.name) {
            return Err(MetainfoError::UnsafePath(raw.name));
        }

        let files = match (raw.length, raw.files) {
            (Some(length), _) => vec![FileEntry {
                path: PathBuf::from(&raw.name),
                length,
            }],
            (None, Some(files)) => files
                .into_iter()
                .map(|f| {
                    if f.path.is_empty() || !f.path.iter().all(|c| is_plain_component(c)) {
                        return Err(MetainfoError::UnsafePath(f.path.join("/")));
                    }
                    Ok(FileEntry {
                        path: f.path.iter().collect(),
                        length: f.length,
                    })
                })
                .collect::<Result<_, _>>()?,
            (None, None) => return Err(MetainfoError::MissingLength { name: raw.name }),
        };

        let total_length = files
            .iter()
            .try_fold(0u64, |sum, f| sum.checked_add(f.length))
            .ok_or_else(|| MetainfoError::LengthOverflow {
                name: raw.name.clone(),
            })?;

        Ok(Self {
            info_hash: InfoHash::new(digest),
            name: raw.name,
            total_length,
            files,
            trackers,
            info,
        })
    }

    /// Returns true if the name is a single plain path component, safe to
    /// join onto a directory.
    #[must_use]
    pub fn has_safe_name(&self) -> bool {
        is_plain_component(&self.name)
    }

    /// Returns the raw bencoded info dictionary.
    #[must_use]
    pub fn info_bytes(&self) -> &[u8] {
        &self.info
    }

    /// Adds trackers that are not already present.
    pub fn merge_trackers<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            let url = url.into();
            if !self.trackers.contains(&url) {
                self.trackers.push(url);
            }
        }
    }

    /// Encodes the metadata as a `.torrent` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored info dictionary cannot be re-encoded.
    pub fn to_torrent_bytes(&self) -> Result<Vec<u8>, MetainfoError> {
        let info: Value = serde_bencode::from_bytes(&self.info)?;

        let mut dict = HashMap::new();
        if let Some(first) = self.trackers.first() {
            dict.insert(b"announce".to_vec(), Value::Bytes(first.as_bytes().to_vec()));
            let tiers = self
                .trackers
                .iter()
                .map(|url| Value::List(vec![Value::Bytes(url.as_bytes().to_vec())]))
                .collect();
            dict.insert(b"announce-list".to_vec(), Value::List(tiers));
        }
        dict.insert(b"info".to_vec(), info);

        Ok(serde_bencode::to_bytes(&Value::Dict(dict))?)
    }
}

/// Returns true if `name` names exactly one entry inside a directory: not
/// empty, not `.` or `..`, not absolute and free of separators.
pub(crate) fn is_plain_component(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part.to_str() == Some(name)
    )
}
