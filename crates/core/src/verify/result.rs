use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    keys::KeyOrigin,
    spec::{MetadataRecord, TIMESTAMP_FORMAT, timestamp},
};

/// The verdict on a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// The essence is unchanged and the signature verifies with the declared
    /// key
    Valid,
    /// The essence is unchanged but the signature or key does not hold up
    Invalid,
    /// The essence no longer matches the signed hash
    Tampered,
    /// The file has no block
    Missing,
    /// No key could be found to check the signature with
    KeyUnavailable,
    /// The file or its block could not be read
    Malformed,
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VerificationStatus::Valid => "VALID",
            VerificationStatus::Invalid => "INVALID",
            VerificationStatus::Tampered => "TAMPERED",
            VerificationStatus::Missing => "MISSING",
            VerificationStatus::KeyUnavailable => "KEY_UNAVAILABLE",
            VerificationStatus::Malformed => "MALFORMED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// The record of the block, whenever one could be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataRecord>,
    pub detail: String,
    #[serde(with = "timestamp")]
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_origin: Option<KeyOrigin>,
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        self.status == VerificationStatus::Valid
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.detail)?;

        if let Some(metadata) = &self.metadata {
            write!(f, " (signed by {}", metadata.author_name)?;
            if let Some(email) = &metadata.author_email {
                write!(f, " <{email}>")?;
            }
            write!(f, " at {})", metadata.timestamp.format(TIMESTAMP_FORMAT))?;
        }

        Ok(())
    }
}
