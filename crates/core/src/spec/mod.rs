//! The data model of an authentication block, along with the exact text
//! formats each of its fields use on the wire.
//!
//! For how a record turns into the bytes which are signed see
//! [crate::canonical].

mod block;
mod constants;
mod error;
mod fingerprint;
mod hash;
mod metadata;
pub mod timestamp;

pub use block::*;
pub use constants::*;
pub use error::*;
pub use fingerprint::*;
pub use hash::*;
pub use metadata::*;
