use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{BlockError, Fingerprint, TOOL_NAME, TOOL_VERSION, VideoHash, timestamp};

/// Identifies who is vouching for a video
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
}

impl Author {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_organization<S: Into<String>>(mut self, organization: S) -> Self {
        self.organization = Some(organization.into());
        self
    }
}

/// The information which is signed and embedded alongside the signature in
/// a video container.
///
/// The order of the fields here is only the order used when displaying the
/// block, the bytes which are signed are produced by
/// [crate::canonical::to_canonical].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataRecord {
    /// Digest of the essence, see [crate::essence]
    pub video_hash: VideoHash,

    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_organization: Option<String>,

    /// Fingerprint of the key which created the signature, the key used to
    /// verify must always have this fingerprint
    pub pubkey_fingerprint: Fingerprint,
    /// Where the public key can be downloaded from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey_url: Option<String>,
    /// ASCII-armored public key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_pubkey: Option<String>,

    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub tool_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MetadataRecord {
    /// Creates a record stamped with the current time and this tool's
    /// provenance
    pub fn new(video_hash: VideoHash, author: Author, pubkey_fingerprint: Fingerprint) -> Self {
        Self {
            video_hash,
            author_name: author.name,
            author_email: author.email,
            author_organization: author.organization,
            pubkey_fingerprint,
            pubkey_url: None,
            embedded_pubkey: None,
            timestamp: timestamp::now(),
            tool_name: TOOL_NAME.to_owned(),
            tool_version: TOOL_VERSION.to_owned(),
            tags: None,
            notes: None,
        }
    }

    pub fn with_pubkey_url(mut self, url: Option<String>) -> Self {
        self.pubkey_url = url;
        self
    }

    pub fn with_embedded_pubkey(mut self, key: Option<String>) -> Self {
        self.embedded_pubkey = key;
        self
    }

    /// Sets the tags, an empty list is stored as no tags at all
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = (!tags.is_empty()).then_some(tags);
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Checks the constraints on the fields which the types themselves do
    /// not already guarantee
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.author_name.trim().is_empty() {
            return Err(BlockError::invalid("author_name", "must not be empty"));
        }

        if let Some(url) = &self.pubkey_url {
            let parsed =
                Url::parse(url).map_err(|e| BlockError::invalid("pubkey_url", e.to_string()))?;

            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(BlockError::invalid(
                    "pubkey_url",
                    format!("unsupported scheme `{}`", parsed.scheme()),
                ));
            }
        }

        if matches!(&self.embedded_pubkey, Some(k) if k.trim().is_empty()) {
            return Err(BlockError::invalid("embedded_pubkey", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MetadataRecord {
        MetadataRecord::new(
            VideoHash::new([7; 32]),
            Author::new("Jane Doe"),
            "D4C9D8F2E1A1D8BB2F09768A5FBE8F7B07B4328D"
                .parse()
                .expect("Valid fingerprint"),
        )
    }

    #[test]
    fn absent_options_are_omitted() {
        let json = serde_json::to_value(record()).expect("Serialises");
        let obj = json.as_object().expect("Is an object");

        for key in [
            "author_email",
            "author_organization",
            "pubkey_url",
            "embedded_pubkey",
            "tags",
            "notes",
        ] {
            assert!(!obj.contains_key(key), "{key} is omitted when absent");
        }
    }

    #[test]
    fn empty_tags_are_absent() {
        assert_eq!(record().with_tags(vec![]).tags, None);
        assert_eq!(
            record().with_tags(vec!["news".into()]).tags,
            Some(vec!["news".to_owned()])
        );
    }

    #[test]
    fn validates_fields() {
        assert!(record().validate().is_ok());

        let mut blank = record();
        blank.author_name = "   ".into();
        assert!(blank.validate().is_err(), "Blank author is rejected");

        let ftp = record().with_pubkey_url(Some("ftp://example.com/key.asc".into()));
        assert!(ftp.validate().is_err(), "Only http(s) urls are allowed");

        let https = record().with_pubkey_url(Some("https://example.com/key.asc".into()));
        assert!(https.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut json = serde_json::to_value(record()).expect("Serialises");
        json["extra"] = serde_json::json!("unsigned");

        let res = serde_json::from_value::<MetadataRecord>(json);
        assert!(res.is_err(), "Unknown fields are not silently dropped");
    }

    #[test]
    fn timestamp_has_second_precision() {
        let json = serde_json::to_value(record()).expect("Serialises");
        let ts = json["timestamp"].as_str().expect("Timestamp is a string");

        assert_eq!(ts.len(), "2025-06-16T03:12:59Z".len());
        assert!(ts.ends_with('Z'));
    }
}
