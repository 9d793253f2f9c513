use thiserror::Error;

use crate::spec::Fingerprint;

use super::KeyOrigin;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Every permitted source was tried without finding a key, with the
    /// reason each one gave
    #[error("no key available ({})", .0.join("; "))]
    KeyNotFound(Vec<String>),
    /// A key was found but it is not the one the block claims to be signed
    /// with
    #[error("{origin} key has fingerprint {actual} but the block declares {expected}")]
    KeyMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
        origin: KeyOrigin,
    },
}
