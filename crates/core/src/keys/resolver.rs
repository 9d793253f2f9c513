use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    crypto::{PgpBackend, SignatureBackend},
    spec::MetadataRecord,
};

use super::{
    KeyFetcher, KeyOrigin, KeySource, Keyring, ResolutionPolicy, ResolveError, ResolvedKey,
};

/// Produces the public key for a record from the sources it has been given
#[derive(Clone)]
pub struct KeyResolver {
    backend: Arc<dyn SignatureBackend>,
    keyring: Option<Arc<dyn Keyring>>,
    fetcher: Option<Arc<dyn KeyFetcher>>,
}

impl Default for KeyResolver {
    /// Uses [PgpBackend] without a keyring, fetching over HTTP when the
    /// `fetch` feature is enabled
    fn default() -> Self {
        let resolver = Self::new(Arc::new(PgpBackend));

        #[cfg(feature = "fetch")]
        let resolver = resolver.with_fetcher(Arc::new(super::HttpKeyFetcher));

        resolver
    }
}

impl KeyResolver {
    pub fn new(backend: Arc<dyn SignatureBackend>) -> Self {
        Self {
            backend,
            keyring: None,
            fetcher: None,
        }
    }

    pub fn with_keyring(mut self, keyring: Arc<dyn Keyring>) -> Self {
        self.keyring = Some(keyring);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn KeyFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn backend(&self) -> &dyn SignatureBackend {
        self.backend.as_ref()
    }

    /// Tries each source of the policy in turn until one gives a key.
    ///
    /// Sources which have nothing, or whose key cannot be read, are passed
    /// over. The first key found must have the fingerprint of the record.
    pub fn resolve(
        &self,
        record: &MetadataRecord,
        policy: &ResolutionPolicy,
    ) -> Result<ResolvedKey, ResolveError> {
        let expected = &record.pubkey_fingerprint;
        let mut reasons = Vec::new();

        for source in &policy.sources {
            let (origin, material) = match self.attempt(*source, record, policy) {
                Ok(found) => found,
                Err(reason) => {
                    debug!(%source, %reason, "Key source has no key");
                    reasons.push(format!("{source}: {reason}"));
                    continue;
                }
            };

            let actual = match self.backend.fingerprint(&material) {
                Ok(fp) => fp,
                Err(e) => {
                    debug!(%source, error = %e, "Key source gave unusable key");
                    reasons.push(format!("{source}: {e}"));
                    continue;
                }
            };

            if actual != *expected {
                warn!(%source, %expected, %actual, "Key does not match the declared fingerprint");
                return Err(ResolveError::KeyMismatch {
                    expected: expected.clone(),
                    actual,
                    origin,
                });
            }

            debug!(%source, fingerprint = %actual, "Resolved key");
            return Ok(ResolvedKey {
                fingerprint: actual,
                material,
                origin,
            });
        }

        Err(ResolveError::KeyNotFound(reasons))
    }

    fn attempt(
        &self,
        source: KeySource,
        record: &MetadataRecord,
        policy: &ResolutionPolicy,
    ) -> Result<(KeyOrigin, String), String> {
        match source {
            KeySource::Embedded => record
                .embedded_pubkey
                .clone()
                .map(|k| (KeyOrigin::Embedded, k))
                .ok_or_else(|| "no embedded key".to_string()),
            KeySource::Keyring => {
                let keyring = self.keyring.as_ref().ok_or("no keyring configured")?;
                keyring
                    .lookup(&record.pubkey_fingerprint)
                    .map(|k| (KeyOrigin::LocalKeyring, k))
                    .ok_or_else(|| "not in keyring".to_string())
            }
            KeySource::Fetch => {
                if !policy.allow_fetch {
                    return Err("fetching is disabled".to_string());
                }
                let url = record.pubkey_url.as_deref().ok_or("no key URL")?;
                let fetcher = self.fetcher.as_ref().ok_or("no fetcher available")?;

                debug!(url, timeout = ?policy.fetch_timeout, "Fetching key");
                fetcher
                    .fetch(url, policy.fetch_timeout)
                    .map(|k| (KeyOrigin::Fetched, k))
                    .map_err(|e| {
                        warn!(url, error = %e, "Could not fetch key");
                        e.to_string()
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        time::Duration,
    };

    use testlibs::keys::{ALICE, MALLORY};

    use super::*;
    use crate::{
        keys::{FetchError, MemoryKeyring},
        spec::{Author, Fingerprint, VideoHash},
    };

    /// Serves one key for every URL and remembers what was asked for
    #[derive(Default)]
    struct StubFetcher {
        key: Option<&'static str>,
        requested: Mutex<Vec<String>>,
    }

    impl KeyFetcher for StubFetcher {
        fn fetch(&self, url: &str, _: Duration) -> Result<String, FetchError> {
            self.requested
                .lock()
                .expect("Not poisoned")
                .push(url.to_string());
            self.key
                .map(str::to_string)
                .ok_or(FetchError::Status(404))
        }
    }

    fn alice_record() -> MetadataRecord {
        let fingerprint: Fingerprint = ALICE.fingerprint.parse().expect("Valid fingerprint");
        MetadataRecord::new(VideoHash::new([7; 32]), Author::new("Alice"), fingerprint)
    }

    fn allow_fetch() -> ResolutionPolicy {
        ResolutionPolicy::default().with_fetch(true)
    }

    #[test]
    fn embedded_key_wins() {
        let fetcher = Arc::new(StubFetcher {
            key: Some(ALICE.public),
            ..Default::default()
        });
        let keyring = MemoryKeyring::new().with_key(
            ALICE.fingerprint.parse().expect("Valid fingerprint"),
            MALLORY.public,
        );
        let resolver = KeyResolver::new(Arc::new(PgpBackend))
            .with_keyring(Arc::new(keyring))
            .with_fetcher(fetcher.clone());

        let record = alice_record()
            .with_embedded_pubkey(Some(ALICE.public.to_string()))
            .with_pubkey_url(Some("https://example.org/alice.asc".to_string()));

        let key = resolver.resolve(&record, &allow_fetch()).expect("Resolves");

        assert_eq!(key.origin, KeyOrigin::Embedded);
        assert!(
            fetcher.requested.lock().expect("Not poisoned").is_empty(),
            "No fetch is attempted once a key is found"
        );
    }

    #[test]
    fn falls_through_to_keyring() {
        let mut keyring = MemoryKeyring::new();
        keyring.import(&PgpBackend, ALICE.public).expect("Valid key");
        let resolver = KeyResolver::new(Arc::new(PgpBackend)).with_keyring(Arc::new(keyring));

        let key = resolver
            .resolve(&alice_record(), &ResolutionPolicy::default())
            .expect("Resolves");

        assert_eq!(key.origin, KeyOrigin::LocalKeyring);
        assert_eq!(key.material, ALICE.public);
    }

    #[test]
    fn unreadable_embedded_key_falls_through() {
        let fetcher = Arc::new(StubFetcher {
            key: Some(ALICE.public),
            ..Default::default()
        });
        let resolver = KeyResolver::new(Arc::new(PgpBackend)).with_fetcher(fetcher);

        let record = alice_record()
            .with_embedded_pubkey(Some("garbage".to_string()))
            .with_pubkey_url(Some("https://example.org/alice.asc".to_string()));

        let key = resolver.resolve(&record, &allow_fetch()).expect("Resolves");
        assert_eq!(key.origin, KeyOrigin::Fetched);
    }

    #[test]
    fn fetch_needs_permission() {
        let fetcher = Arc::new(StubFetcher {
            key: Some(ALICE.public),
            ..Default::default()
        });
        let resolver = KeyResolver::new(Arc::new(PgpBackend)).with_fetcher(fetcher.clone());
        let record = alice_record().with_pubkey_url(Some("https://example.org/a.asc".to_string()));

        let result = resolver.resolve(&record, &ResolutionPolicy::default());

        assert!(matches!(result, Err(ResolveError::KeyNotFound(_))));
        assert!(fetcher.requested.lock().expect("Not poisoned").is_empty());
    }

    #[test]
    fn fetched_key_must_match() {
        let fetcher = Arc::new(StubFetcher {
            key: Some(MALLORY.public),
            ..Default::default()
        });
        let resolver = KeyResolver::new(Arc::new(PgpBackend)).with_fetcher(fetcher);
        let record = alice_record().with_pubkey_url(Some("https://example.org/a.asc".to_string()));

        match resolver.resolve(&record, &allow_fetch()) {
            Err(ResolveError::KeyMismatch {
                expected,
                actual,
                origin,
            }) => {
                assert_eq!(expected.to_hex(), ALICE.fingerprint);
                assert_eq!(actual.to_hex(), MALLORY.fingerprint);
                assert_eq!(origin, KeyOrigin::Fetched);
            }
            other => panic!("Expected a key mismatch, got {other:?}"),
        }
    }

    #[test]
    fn mismatch_stops_resolution() {
        let mut keyring = MemoryKeyring::new();
        keyring.import(&PgpBackend, ALICE.public).expect("Valid key");
        let resolver = KeyResolver::new(Arc::new(PgpBackend)).with_keyring(Arc::new(keyring));

        let record = alice_record().with_embedded_pubkey(Some(MALLORY.public.to_string()));

        assert!(matches!(
            resolver.resolve(&record, &ResolutionPolicy::default()),
            Err(ResolveError::KeyMismatch {
                origin: KeyOrigin::Embedded,
                ..
            })
        ));
    }

    #[test]
    fn policy_order_is_respected() {
        let mut keyring = MemoryKeyring::new();
        keyring.import(&PgpBackend, ALICE.public).expect("Valid key");
        let resolver = KeyResolver::new(Arc::new(PgpBackend)).with_keyring(Arc::new(keyring));

        let record = alice_record().with_embedded_pubkey(Some(ALICE.public.to_string()));
        let policy = ResolutionPolicy::default().with_sources([KeySource::Keyring, KeySource::Embedded]);

        let key = resolver.resolve(&record, &policy).expect("Resolves");
        assert_eq!(key.origin, KeyOrigin::LocalKeyring);

        let policy = ResolutionPolicy::default().with_sources([KeySource::Fetch]);
        assert!(resolver.resolve(&record, &policy).is_err(), "Disabled sources are never used");
    }

    #[test]
    fn reports_every_reason() {
        let resolver = KeyResolver::new(Arc::new(PgpBackend));

        match resolver.resolve(&alice_record(), &allow_fetch()) {
            Err(ResolveError::KeyNotFound(reasons)) => assert_eq!(
                reasons,
                vec![
                    "embedded: no embedded key",
                    "keyring: no keyring configured",
                    "fetch: no key URL"
                ]
            ),
            other => panic!("Expected no key, got {other:?}"),
        }
    }
}
