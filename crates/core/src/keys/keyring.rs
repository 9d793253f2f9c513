use std::{collections::HashMap, fs, io, path::Path};

use tracing::{debug, warn};

use crate::{
    crypto::{SignatureBackend, SignatureError},
    spec::Fingerprint,
};

/// Read-only storage of public keys
pub trait Keyring: Send + Sync {
    /// The armored public key with the given fingerprint
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<String>;
}

/// Keys held in memory, indexed by the fingerprint they were added with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryKeyring(HashMap<Fingerprint, String>);

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key<S: Into<String>>(mut self, fingerprint: Fingerprint, material: S) -> Self {
        self.0.insert(fingerprint, material.into());
        self
    }

    /// Adds a key under the fingerprint the backend computes for it
    pub fn import<S: Into<String>>(
        &mut self,
        backend: &dyn SignatureBackend,
        material: S,
    ) -> Result<Fingerprint, SignatureError> {
        let material = material.into();
        let fingerprint = backend.fingerprint(&material)?;
        self.0.entry(fingerprint.clone()).or_insert(material);
        Ok(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Keyring for MemoryKeyring {
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<String> {
        self.0.get(fingerprint).cloned()
    }
}

/// Every `*.asc` file of a directory, loaded once when opened.
///
/// Files which cannot be read or do not hold a public key are skipped. When
/// two files hold the same key the first one by file name is used.
#[derive(Debug, Clone)]
pub struct DirectoryKeyring {
    keys: MemoryKeyring,
}

impl DirectoryKeyring {
    pub fn open<P: AsRef<Path>>(dir: P, backend: &dyn SignatureBackend) -> io::Result<Self> {
        let dir = dir.as_ref();

        let mut paths = fs::read_dir(dir)?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Could not read keyring entry");
                    None
                }
            })
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("asc"))
            })
            .collect::<Vec<_>>();
        paths.sort();

        let mut keys = MemoryKeyring::new();
        for path in paths {
            let material = match fs::read_to_string(&path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable key file");
                    continue;
                }
            };

            match keys.import(backend, material) {
                Ok(fingerprint) => {
                    debug!(path = %path.display(), %fingerprint, "Loaded key")
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid key file"),
            }
        }

        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Keyring for DirectoryKeyring {
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<String> {
        self.keys.lookup(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use testlibs::keys::{ALICE, BOB, MALLORY};

    use super::*;
    use crate::crypto::PgpBackend;

    #[test]
    fn memory_keyring_imports_by_fingerprint() {
        let mut keyring = MemoryKeyring::new();
        let fingerprint = keyring
            .import(&PgpBackend, ALICE.public)
            .expect("Valid key");

        assert_eq!(fingerprint.to_hex(), ALICE.fingerprint);
        assert_eq!(keyring.lookup(&fingerprint).as_deref(), Some(ALICE.public));

        let mallory: Fingerprint = MALLORY.fingerprint.parse().expect("Valid fingerprint");
        assert_eq!(keyring.lookup(&mallory), None);
    }

    #[test]
    fn directory_keyring_skips_bad_files() {
        let dir = tempfile::tempdir().expect("Can create temp dir");
        fs::write(dir.path().join("alice.asc"), ALICE.public).expect("Can write");
        fs::write(dir.path().join("BOB.ASC"), BOB.public).expect("Can write");
        fs::write(dir.path().join("garbage.asc"), "not a key").expect("Can write");
        fs::write(dir.path().join("mallory.txt"), MALLORY.public).expect("Can write");

        let keyring = DirectoryKeyring::open(dir.path(), &PgpBackend).expect("Can open");

        assert_eq!(keyring.len(), 2, "Only the valid .asc files are loaded");
        for (key, present) in [(ALICE, true), (BOB, true), (MALLORY, false)] {
            let fingerprint: Fingerprint = key.fingerprint.parse().expect("Valid fingerprint");
            assert_eq!(
                keyring.lookup(&fingerprint).is_some(),
                present,
                "Whether {}'s key is in the keyring",
                key.name
            );
        }
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("Can create temp dir");
        assert!(DirectoryKeyring::open(dir.path().join("nope"), &PgpBackend).is_err());
    }
}
