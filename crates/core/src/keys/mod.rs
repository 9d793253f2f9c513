//! Finding the public key a block was signed with.
//!
//! Keys can come from the block itself, a local [Keyring] or a URL, tried in
//! the order given by a [ResolutionPolicy]. Whichever source produces a key
//! first decides the outcome, so a key with the wrong fingerprint is a
//! [ResolveError::KeyMismatch] rather than a reason to try the next source.

mod error;
mod fetch;
mod keyring;
mod resolver;

pub use error::*;
pub use fetch::*;
pub use keyring::*;
pub use resolver::*;

use std::{fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};

use crate::spec::{DEFAULT_FETCH_TIMEOUT, Fingerprint, MAX_FETCH_TIMEOUT};

/// Where a key can be looked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// The `embedded_pubkey` of the record
    Embedded,
    /// The local keyring, by `pubkey_fingerprint`
    Keyring,
    /// The `pubkey_url` of the record
    Fetch,
}

impl KeySource {
    pub const ALL: [KeySource; 3] = [KeySource::Embedded, KeySource::Keyring, KeySource::Fetch];
}

impl Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeySource::Embedded => "embedded",
            KeySource::Keyring => "keyring",
            KeySource::Fetch => "fetch",
        })
    }
}

/// Where the key used for a verification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrigin {
    Embedded,
    Fetched,
    LocalKeyring,
}

impl Display for KeyOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeyOrigin::Embedded => "embedded",
            KeyOrigin::Fetched => "fetched",
            KeyOrigin::LocalKeyring => "local keyring",
        })
    }
}

/// A public key which matches the fingerprint declared by a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub fingerprint: Fingerprint,
    /// ASCII-armored public key
    pub material: String,
    pub origin: KeyOrigin,
}

/// Which sources to try and in what order.
///
/// Fetching has to be allowed explicitly even when [KeySource::Fetch] is
/// listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub sources: Vec<KeySource>,
    pub allow_fetch: bool,
    pub fetch_timeout: Duration,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            sources: KeySource::ALL.to_vec(),
            allow_fetch: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl ResolutionPolicy {
    pub fn with_sources<I: IntoIterator<Item = KeySource>>(mut self, sources: I) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn with_fetch(mut self, allow: bool) -> Self {
        self.allow_fetch = allow;
        self
    }

    /// Sets the fetch timeout, clamped between one second and
    /// [MAX_FETCH_TIMEOUT]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout.clamp(Duration::from_secs(1), MAX_FETCH_TIMEOUT);
        self
    }
}
