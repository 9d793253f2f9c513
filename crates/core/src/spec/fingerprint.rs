use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

use super::{BlockError, FINGERPRINT_LENGTHS};

/// The fingerprint of an OpenPGP key.
///
/// Any spacing or casing is accepted when parsing, however it is always
/// written in the canonical form: uppercase hex in blocks of four characters
/// separated by a single space, e.g.
/// `D4C9 D8F2 E1A1 D8BB 2F09 768A 5FBE 8F7B 07B4 328D`.
///
/// ```
/// use avcf::spec::Fingerprint;
///
/// let a: Fingerprint = "d4c9d8f2e1a1d8bb2f09768a5fbe8f7b07b4328d".parse().unwrap();
/// let b: Fingerprint = "D4C9 D8F2 E1A1 D8BB 2F09 768A 5FBE 8F7B 07B4 328D".parse().unwrap();
///
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "D4C9 D8F2 E1A1 D8BB 2F09 768A 5FBE 8F7B 07B4 328D");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        if !FINGERPRINT_LENGTHS.contains(&bytes.len()) {
            return Err(BlockError::invalid(
                "pubkey_fingerprint",
                format!("a fingerprint cannot be {} bytes long", bytes.len()),
            ));
        }

        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The fingerprint as a contiguous uppercase hex string, which is how
    /// keyrings normally index their keys
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact = s.split_whitespace().collect::<String>();
        let bytes = hex::decode(&compact)
            .map_err(|e| BlockError::invalid("pubkey_fingerprint", e.to_string()))?;

        Self::from_bytes(&bytes)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.to_hex();
        let grouped = hex
            .as_bytes()
            .chunks(4)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");

        f.write_str(&grouped)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
