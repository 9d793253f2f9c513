//! The detached signature primitive that blocks are signed with.
//!
//! Everything goes through [SignatureBackend] so the engines never depend on
//! a particular OpenPGP implementation, [PgpBackend] is the one used by
//! default.

mod error;
mod key;
mod openpgp;

pub use error::*;
pub use key::*;
pub use openpgp::*;

use crate::spec::Fingerprint;

pub trait SignatureBackend: Send + Sync {
    /// Creates an ASCII-armored detached signature over `data`
    fn sign(&self, data: &[u8], key: &SigningKey) -> Result<String, SignatureError>;

    /// Checks a detached signature over `data` against an armored public key.
    ///
    /// `Ok(false)` is only returned when the signature was checked and does
    /// not match, any failure to get that far is an error.
    fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> Result<bool, SignatureError>;

    /// The fingerprint of an armored public key
    fn fingerprint(&self, public_key: &str) -> Result<Fingerprint, SignatureError>;

    /// The fingerprint of the key a [SigningKey] signs with
    fn signer_fingerprint(&self, key: &SigningKey) -> Result<Fingerprint, SignatureError>;

    /// The armored public half of a [SigningKey]
    fn export_public_key(&self, key: &SigningKey) -> Result<String, SignatureError>;
}
