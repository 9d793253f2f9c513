//! Produces the exact bytes which get signed for a [MetadataRecord].
//!
//! This is the JSON Canonicalization Scheme (RFC 8785): object keys sorted
//! lexicographically, no insignificant whitespace and absent optional fields
//! left out entirely. As every field of the record is a string or a list of
//! strings, the output only depends on the record's values.

use crate::spec::{BlockError, MetadataRecord};

/// Canonicalises the record, this must be used for both signing and
/// verifying, never the JSON stored in the container
pub fn to_canonical(record: &MetadataRecord) -> Result<Vec<u8>, BlockError> {
    Ok(serde_jcs::to_vec(record)?)
}
