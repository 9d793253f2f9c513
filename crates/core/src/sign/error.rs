use std::path::PathBuf;

use thiserror::Error;

use crate::{container::ContainerError, crypto::SignatureError, spec::BlockError};

/// Anything which stops a video being signed, in which case no output is
/// written
#[derive(Error, Debug)]
pub enum SignError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("output {} is the same file as the input", .0.display())]
    SameFile(PathBuf),
}
