//! Verification settings, read from TOML or built in code:
//!
//! ```toml
//! keyring = "/home/alice/.avcf/keys"
//! sources = ["embedded", "keyring", "fetch"]
//!
//! [fetch]
//! enabled = true
//! timeout_secs = 5
//! ```

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    crypto::SignatureBackend,
    keys::{DirectoryKeyring, KeyResolver, KeySource, ResolutionPolicy},
    spec::{DEFAULT_FETCH_TIMEOUT, MAX_FETCH_TIMEOUT},
    verify::VideoVerifier,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("key source `{0}` is listed more than once")]
    DuplicateSource(KeySource),
    #[error("no key sources are listed")]
    NoSources,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AvcfConfig {
    /// Directory of ASCII-armored public keys
    pub keyring: Option<PathBuf>,
    pub fetch: FetchConfig,
    /// The order key sources are tried in
    pub sources: Vec<KeySource>,
}

impl Default for AvcfConfig {
    fn default() -> Self {
        Self {
            keyring: None,
            fetch: FetchConfig::default(),
            sources: KeySource::ALL.to_vec(),
        }
    }
}

impl AvcfConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.check()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn with_keyring<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.keyring = Some(dir.into());
        self
    }

    pub fn with_fetch(mut self, enabled: bool) -> Self {
        self.fetch.enabled = enabled;
        self
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut seen = HashSet::new();
        match self.sources.iter().find(|s| !seen.insert(**s)) {
            Some(dup) => Err(ConfigError::DuplicateSource(*dup)),
            None => Ok(()),
        }
    }

    /// The fetch timeout, clamped between one and sixty seconds
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
            .clamp(Duration::from_secs(1), MAX_FETCH_TIMEOUT)
    }

    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::default()
            .with_sources(self.sources.iter().copied())
            .with_fetch(self.fetch.enabled)
            .with_fetch_timeout(self.fetch_timeout())
    }

    /// The keyring directory, if there is one
    pub fn open_keyring(
        &self,
        backend: &dyn SignatureBackend,
    ) -> Result<Option<DirectoryKeyring>, ConfigError> {
        self.keyring
            .as_ref()
            .map(|dir| DirectoryKeyring::open(dir, backend))
            .transpose()
            .map_err(ConfigError::from)
    }

    /// A verifier using the default backend along with the keyring and
    /// policy of this configuration
    pub fn verifier(&self) -> Result<VideoVerifier, ConfigError> {
        let mut resolver = KeyResolver::default();
        if let Some(keyring) = self.open_keyring(resolver.backend())? {
            resolver = resolver.with_keyring(Arc::new(keyring));
        }

        Ok(VideoVerifier::new(resolver, self.policy()))
    }
}
