//! Checking the block of a video.
//!
//! Verification is a fixed sequence of stages, each of which either hands
//! over to the next or settles the outcome:
//!
//! ```text
//! START -> EXTRACTED -> HASH_CHECKED -> KEY_RESOLVED -> SIGNATURE_CHECKED
//! ```
//!
//! The essence hash is compared before any key is looked for, so a modified
//! video is always reported as [VerificationStatus::Tampered] no matter what
//! happened to its signature. Nothing here returns an error, every failure
//! ends up as a status in the [VerificationResult].

mod result;

pub use result::*;

use std::path::Path;

use tracing::{debug, info};

use crate::{
    canonical,
    container::{ContainerAdapter, ContainerError, adapter_for},
    crypto::SignatureError,
    essence,
    keys::{KeyOrigin, KeyResolver, ResolutionPolicy, ResolveError, ResolvedKey},
    spec::{AuthBlock, MetadataRecord, timestamp},
};

enum Stage {
    Start,
    Extracted {
        adapter: &'static dyn ContainerAdapter,
        block: AuthBlock,
    },
    HashChecked {
        block: AuthBlock,
    },
    KeyResolved {
        block: AuthBlock,
        key: ResolvedKey,
    },
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Start => "START",
            Stage::Extracted { .. } => "EXTRACTED",
            Stage::HashChecked { .. } => "HASH_CHECKED",
            Stage::KeyResolved { .. } => "KEY_RESOLVED",
        }
    }
}

struct Verdict {
    status: VerificationStatus,
    detail: String,
    metadata: Option<MetadataRecord>,
    key_origin: Option<KeyOrigin>,
}

impl Verdict {
    fn new<S: Into<String>>(status: VerificationStatus, detail: S) -> Self {
        Self {
            status,
            detail: detail.into(),
            metadata: None,
            key_origin: None,
        }
    }

    fn with_metadata(mut self, block: AuthBlock) -> Self {
        self.metadata = Some(block.metadata);
        self
    }

    fn into_result(self) -> VerificationResult {
        VerificationResult {
            status: self.status,
            metadata: self.metadata,
            detail: self.detail,
            checked_at: timestamp::now(),
            key_origin: self.key_origin,
        }
    }
}

enum Step {
    Next(Stage),
    Done(Verdict),
}

/// Verifies videos against the keys its [KeyResolver] can find
#[derive(Clone, Default)]
pub struct VideoVerifier {
    resolver: KeyResolver,
    policy: ResolutionPolicy,
}

impl VideoVerifier {
    pub fn new(resolver: KeyResolver, policy: ResolutionPolicy) -> Self {
        Self { resolver, policy }
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    pub fn verify_video<P: AsRef<Path>>(&self, path: P) -> VerificationResult {
        let path = path.as_ref();

        let mut stage = Stage::Start;
        let verdict = loop {
            match self.step(path, stage) {
                Step::Next(next) => {
                    debug!(path = %path.display(), stage = next.name(), "Verification advanced");
                    stage = next;
                }
                Step::Done(verdict) => break verdict,
            }
        };

        info!(
            path = %path.display(),
            status = %verdict.status,
            detail = %verdict.detail,
            "Verified video"
        );
        verdict.into_result()
    }

    fn step(&self, path: &Path, stage: Stage) -> Step {
        match stage {
            Stage::Start => self.extract(path),
            Stage::Extracted { adapter, block } => self.check_hash(path, adapter, block),
            Stage::HashChecked { block } => self.resolve_key(block),
            Stage::KeyResolved { block, key } => self.check_signature(block, key),
        }
    }

    fn extract(&self, path: &Path) -> Step {
        let read = adapter_for(path).and_then(|a| Ok((a, a.read_block(path)?)));

        let (adapter, bytes) = match read {
            Ok((adapter, Some(bytes))) => (adapter, bytes),
            Ok((_, None)) => {
                return Step::Done(Verdict::new(
                    VerificationStatus::Missing,
                    "file has no authentication block",
                ));
            }
            Err(e) => {
                return Step::Done(Verdict::new(
                    VerificationStatus::Malformed,
                    format!("could not read container: {e}"),
                ));
            }
        };

        match AuthBlock::from_bytes(&bytes) {
            Ok(block) => Step::Next(Stage::Extracted { adapter, block }),
            Err(e) => Step::Done(Verdict::new(
                VerificationStatus::Malformed,
                format!("malformed block: {e}"),
            )),
        }
    }

    fn check_hash(&self, path: &Path, adapter: &dyn ContainerAdapter, block: AuthBlock) -> Step {
        let hash = adapter
            .essence_stream(path)
            .and_then(|s| essence::hash(s).map_err(ContainerError::from));

        match hash {
            Ok(actual) if actual == block.metadata.video_hash => {
                Step::Next(Stage::HashChecked { block })
            }
            Ok(actual) => {
                let detail = format!(
                    "essence hash {actual} does not match signed hash {}",
                    block.metadata.video_hash
                );
                Step::Done(Verdict::new(VerificationStatus::Tampered, detail).with_metadata(block))
            }
            Err(e) => Step::Done(
                Verdict::new(
                    VerificationStatus::Malformed,
                    format!("could not read essence: {e}"),
                )
                .with_metadata(block),
            ),
        }
    }

    fn resolve_key(&self, block: AuthBlock) -> Step {
        match self.resolver.resolve(&block.metadata, &self.policy) {
            Ok(key) => Step::Next(Stage::KeyResolved { block, key }),
            Err(e @ ResolveError::KeyNotFound(_)) => Step::Done(
                Verdict::new(VerificationStatus::KeyUnavailable, e.to_string()).with_metadata(block),
            ),
            Err(e @ ResolveError::KeyMismatch { .. }) => Step::Done(
                Verdict::new(VerificationStatus::Invalid, e.to_string()).with_metadata(block),
            ),
        }
    }

    fn check_signature(&self, block: AuthBlock, key: ResolvedKey) -> Step {
        let canonical = match canonical::to_canonical(&block.metadata) {
            Ok(c) => c,
            Err(e) => {
                return Step::Done(
                    Verdict::new(VerificationStatus::Malformed, e.to_string()).with_metadata(block),
                );
            }
        };

        let checked = self
            .resolver
            .backend()
            .verify(&canonical, &block.signature, &key.material);

        let mut verdict = match checked {
            Ok(true) => Verdict::new(
                VerificationStatus::Valid,
                format!("signature verified with {} key {}", key.origin, key.fingerprint),
            ),
            Ok(false) => Verdict::new(
                VerificationStatus::Invalid,
                format!("signature does not verify with key {}", key.fingerprint),
            ),
            Err(e @ SignatureError::KeyNotFound(_)) => {
                Verdict::new(VerificationStatus::KeyUnavailable, e.to_string())
            }
            Err(e) => Verdict::new(VerificationStatus::Invalid, e.to_string()),
        };

        verdict.key_origin = Some(key.origin);
        debug!(stage = "SIGNATURE_CHECKED", status = %verdict.status, "Verification advanced");
        Step::Done(verdict.with_metadata(block))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn status_rendering() {
        let json = serde_json::to_string(&VerificationStatus::KeyUnavailable).expect("Serializes");
        assert_eq!(json, "\"key_unavailable\"");
        assert_eq!(VerificationStatus::KeyUnavailable.to_string(), "KEY_UNAVAILABLE");
    }

    #[test]
    fn unreadable_file_is_malformed() {
        let dir = tempfile::tempdir().expect("Can create temp dir");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "just some text, definitely not a video").expect("Can write");

        let result = VideoVerifier::default().verify_video(&path);

        assert_eq!(result.status, VerificationStatus::Malformed);
        assert!(result.metadata.is_none());
        assert!(result.key_origin.is_none());
    }

    #[test]
    fn missing_file_is_malformed() {
        let dir = tempfile::tempdir().expect("Can create temp dir");

        let result = VideoVerifier::default().verify_video(dir.path().join("absent.mp4"));

        assert_eq!(result.status, VerificationStatus::Malformed);
    }
}
