//! Lazy job descriptors.

use crate::{DescriptorError, InfoHash};
use magnet_url::Magnet;
use std::fmt;
use std::str::FromStr;

const MAGNET_PREFIX: &str = "magnet:";
const INFO_HASH_PREFIX: &str = "infohash:";

/// A reference to content whose metadata is not known yet.
///
/// Accepted forms are a `magnet:` URI, `infohash:<hash>` and a bare
/// 40-character hex or 32-character base32 hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// A magnet URI.
    Magnet {
        /// The URI exactly as supplied.
        uri: String,
        /// Info hash carried by the `xt` parameter.
        info_hash: InfoHash,
        /// Trackers carried by `tr` parameters.
        trackers: Vec<String>,
    },
    /// A bare content identifier.
    InfoHash(InfoHash),
}

impl Descriptor {
    /// Parses a descriptor from user input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not one of the accepted forms or if
    /// the embedded hash is malformed.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let input = input.trim();

        if input.starts_with(MAGNET_PREFIX) {
            let magnet =
                Magnet::new(input).map_err(|e| DescriptorError::Magnet(format!("{e:?}")))?;
            let hash = magnet.hash().ok_or(DescriptorError::MissingHash)?;
            let info_hash = hash.parse::<InfoHash>()?;
            let trackers = magnet.trackers().iter().map(ToString::to_string).collect();
            return Ok(Self::Magnet {
                uri: input.to_string(),
                info_hash,
                trackers,
            });
        }

        if let Some(hash) = input.strip_prefix(INFO_HASH_PREFIX) {
            return Ok(Self::InfoHash(hash.parse()?));
        }

        input
            .parse::<InfoHash>()
            .map(Self::InfoHash)
            .map_err(|_| DescriptorError::Unsupported(input.to_string()))
    }

    /// Returns the identifier the descriptor refers to.
    #[must_use]
    pub const fn info_hash(&self) -> InfoHash {
        match self {
            Self::Magnet { info_hash, .. } => *info_hash,
            Self::InfoHash(info_hash) => *info_hash,
        }
    }

    /// Returns the trackers embedded in the descriptor, if any.
    #[must_use]
    pub fn trackers(&self) -> &[String] {
        match self {
            Self::Magnet { trackers, .. } => trackers,
            Self::InfoHash(_) => &[],
        }
    }

    /// Returns true for magnet URIs.
    #[must_use]
    pub const fn is_magnet(&self) -> bool {
        matches!(self, Self::Magnet { .. })
    }
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magnet { uri, .. } => f.write_str(uri),
            Self::InfoHash(info_hash) => write!(f, "{INFO_HASH_PREFIX}{info_hash}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn test_parse_magnet() {
        let uri = format!(
            "magnet:?xt=urn:btih:{HEX}&dn=Example&tr=http%3A%2F%2Ftracker.example%2Fannounce"
        );
        let descriptor = Descriptor::parse(&uri).unwrap();

        assert!(descriptor.is_magnet());
        assert_eq!(descriptor.info_hash().to_hex(), HEX);
        assert_eq!(descriptor.trackers().len(), 1);
        assert_eq!(descriptor.to_string(), uri);
    }

    #[test]
    fn test_parse_infohash_prefix() {
        let descriptor = Descriptor::parse(&format!("infohash:{HEX}")).unwrap();
        assert_eq!(descriptor, Descriptor::InfoHash(HEX.parse().unwrap()));
        assert!(descriptor.trackers().is_empty());
    }

    #[test]
    fn test_parse_bare_hash() {
        let descriptor = Descriptor::parse(HEX).unwrap();
        assert_eq!(descriptor.info_hash().to_hex(), HEX);
        assert_eq!(descriptor.to_string(), format!("infohash:{HEX}"));
    }

    #[test]
    fn test_reject_unsupported() {
        let result = Descriptor::parse("https://example.com/file.iso");
        assert!(matches!(result, Err(DescriptorError::Unsupported(_))));
    }

    #[test]
    fn test_reject_bad_infohash() {
        let result = Descriptor::parse("infohash:1234");
        assert!(matches!(result, Err(DescriptorError::InfoHash(_))));
    }
}
