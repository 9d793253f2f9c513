use serde::{Deserialize, Serialize};

use super::{BlockError, MetadataRecord, SIGNATURE_ARMOR_BEGIN, SIGNATURE_ARMOR_END};

/// What is actually embedded inside of a container: the signed metadata and
/// the ASCII-armored detached signature over its canonical form.
///
/// There is only ever one block per container, writing a new one replaces
/// whatever was there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthBlock {
    pub metadata: MetadataRecord,
    pub signature: String,
}

impl AuthBlock {
    pub fn new(metadata: MetadataRecord, signature: String) -> Self {
        Self {
            metadata,
            signature,
        }
    }

    /// The JSON written into the container tag
    pub fn to_bytes(&self) -> Result<Vec<u8>, BlockError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a tag payload, making sure it is well formed before any of it
    /// is trusted
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        let block: Self = serde_json::from_slice(bytes)?;

        block.metadata.validate()?;
        block.check_armor()?;

        Ok(block)
    }

    /// Only the framing is checked, the contents are left for the signature
    /// backend to judge
    fn check_armor(&self) -> Result<(), BlockError> {
        let sig = self.signature.trim();

        if !sig.starts_with(SIGNATURE_ARMOR_BEGIN) || !sig.ends_with(SIGNATURE_ARMOR_END) {
            return Err(BlockError::invalid(
                "signature",
                "not an ASCII-armored PGP signature",
            ));
        }

        Ok(())
    }
}
