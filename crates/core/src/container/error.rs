use std::io;

use thiserror::Error;

/// Stores the errors that may arise while reading or rewriting a container
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The file is not in a format which can be handled, or uses a feature
    /// of the format which has no essence extraction path
    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),
    /// The file claims to be a supported format but its structure is broken
    #[error("corrupt media: {0}")]
    CorruptMedia(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ContainerError {
    pub(crate) fn corrupt<S: Into<String>>(reason: S) -> Self {
        Self::CorruptMedia(reason.into())
    }

    pub(crate) fn unsupported<S: Into<String>>(reason: S) -> Self {
        Self::UnsupportedContainer(reason.into())
    }
}
