use std::io;

use thiserror::Error;

#[cfg(feature = "verifying")]
use crate::{config::ConfigError, keys::ResolveError};
#[cfg(feature = "signing")]
use crate::sign::SignError;
use crate::{container::ContainerError, crypto::SignatureError, spec::BlockError};

/// All the errors this library can give.
///
/// Nothing returns it directly, but it is useful as a catch all when doing
/// everything in one function.
#[derive(Error, Debug)]
pub enum AvcfError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[cfg(feature = "verifying")]
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[cfg(feature = "verifying")]
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[cfg(feature = "signing")]
    #[error("output {} is the same file as the input", .0.display())]
    SameFile(std::path::PathBuf),
}

#[cfg(feature = "signing")]
impl From<SignError> for AvcfError {
    fn from(value: SignError) -> Self {
        match value {
            SignError::Container(e) => e.into(),
            SignError::Signature(e) => e.into(),
            SignError::Block(e) => e.into(),
            SignError::SameFile(p) => Self::SameFile(p),
        }
    }
}
