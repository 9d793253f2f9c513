use thiserror::Error;

/// Normalised failures of a [super::SignatureBackend]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The secret key could not be used to produce a signature, e.g. it
    /// could not be parsed, was the wrong kind of key or the passphrase was
    /// wrong
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// The signature could not be checked at all, as opposed to being
    /// checked and found to be wrong
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    /// The material given does not hold a usable public key
    #[error("key not found: {0}")]
    KeyNotFound(String),
}
