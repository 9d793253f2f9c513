//! Tamper-evident authentication blocks for video files.
//!
//! A block holds a [spec::MetadataRecord] describing who signed a video,
//! including a SHA-256 digest of its audio and video samples, and a detached
//! OpenPGP signature over the canonical form of that record. The block is
//! stored as a single tag inside the container, so it survives edits to the
//! rest of the container's metadata while any change to the essence shows up
//! as [verify::VerificationStatus::Tampered].
//!
//! ```no_run
//! use avcf::{crypto::SigningKey, sign::SignOptions, spec::Author};
//!
//! let key = SigningKey::from_file("jane.sec.asc")?;
//! avcf::sign_video(
//!     "clip.mp4",
//!     "clip.signed.mp4",
//!     &key,
//!     Author::new("Jane Doe"),
//!     &SignOptions::default().with_embedded_pubkey(),
//! )?;
//!
//! let result = avcf::verify_video("clip.signed.mp4");
//! println!("{result}");
//! # Ok::<(), avcf::AvcfError>(())
//! ```

pub mod canonical;
#[cfg(feature = "verifying")]
pub mod config;
pub mod container;
pub mod crypto;
pub mod essence;
#[cfg(feature = "verifying")]
pub mod keys;
#[cfg(feature = "signing")]
pub mod sign;
pub mod spec;
#[cfg(feature = "verifying")]
pub mod verify;

mod error;

pub use error::*;

#[cfg(feature = "signing")]
use std::path::Path;

/// Signs a video with the default backend, see [sign::VideoSigner]
#[cfg(feature = "signing")]
pub fn sign_video<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    key: &crypto::SigningKey,
    author: spec::Author,
    options: &sign::SignOptions,
) -> Result<spec::AuthBlock, sign::SignError> {
    sign::VideoSigner::default().sign_video(input, output, key, author, options)
}

/// Verifies a video using only its embedded key, see [verify::VideoVerifier]
/// for other key sources
#[cfg(feature = "verifying")]
pub fn verify_video<P: AsRef<std::path::Path>>(path: P) -> verify::VerificationResult {
    verify::VideoVerifier::default().verify_video(path)
}
