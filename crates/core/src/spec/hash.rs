use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

use super::{BlockError, VIDEO_HASH_HEX_LEN};

/// SHA-256 digest of the essence of a video, written as lowercase hex
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VideoHash([u8; 32]);

impl VideoHash {
    pub const fn new(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for VideoHash {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl FromStr for VideoHash {
    type Err = BlockError;

    /// Only the exact wire form is accepted: 64 lowercase hex characters
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != VIDEO_HASH_HEX_LEN {
            return Err(BlockError::invalid(
                "video_hash",
                format!("expected {VIDEO_HASH_HEX_LEN} hex characters, got {}", s.len()),
            ));
        }

        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(BlockError::invalid("video_hash", "must be lowercase hex"));
        }

        let mut digest = [0u8; 32];
        hex::decode_to_slice(s, &mut digest)
            .map_err(|e| BlockError::invalid("video_hash", e.to_string()))?;

        Ok(Self(digest))
    }
}

impl Display for VideoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for VideoHash {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VideoHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn parses_and_displays() {
        let hash: VideoHash = EMPTY_SHA256.parse().expect("Valid hash");
        assert_eq!(hash.to_string(), EMPTY_SHA256);
    }

    #[test]
    fn rejects_uppercase_and_bad_lengths() {
        assert!(EMPTY_SHA256.to_uppercase().parse::<VideoHash>().is_err());
        assert!(EMPTY_SHA256[..60].parse::<VideoHash>().is_err());
        assert!("z".repeat(64).parse::<VideoHash>().is_err());
    }
}
