//! Producing signed copies of videos

mod error;

pub use error::*;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    canonical,
    container::{ContainerError, adapter_for},
    crypto::{PgpBackend, SignatureBackend, SigningKey},
    essence,
    spec::{AuthBlock, Author, MetadataRecord},
};

/// The optional parts of a block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Include the armored public key in the block, so the file can be
    /// verified without any other key source
    pub embed_pubkey: bool,
    pub pubkey_url: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

impl SignOptions {
    pub fn with_embedded_pubkey(mut self) -> Self {
        self.embed_pubkey = true;
        self
    }

    pub fn with_pubkey_url<S: Into<String>>(mut self, url: S) -> Self {
        self.pubkey_url = Some(url.into());
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Signs videos using a [SignatureBackend]
#[derive(Clone)]
pub struct VideoSigner {
    backend: Arc<dyn SignatureBackend>,
}

impl Default for VideoSigner {
    fn default() -> Self {
        Self::new(Arc::new(PgpBackend))
    }
}

impl VideoSigner {
    pub fn new(backend: Arc<dyn SignatureBackend>) -> Self {
        Self { backend }
    }

    /// Builds the record for a video without signing it, the essence hash
    /// is always computed from the file
    pub fn record<P: AsRef<Path>>(
        &self,
        input: P,
        key: &SigningKey,
        author: Author,
        options: &SignOptions,
    ) -> Result<MetadataRecord, SignError> {
        let input = input.as_ref();
        let adapter = adapter_for(input)?;

        let video_hash =
            essence::hash(adapter.essence_stream(input)?).map_err(ContainerError::from)?;
        debug!(%video_hash, format = ?adapter.format(), "Hashed essence");

        let fingerprint = self.backend.signer_fingerprint(key)?;
        let embedded = match options.embed_pubkey {
            true => Some(self.backend.export_public_key(key)?),
            false => None,
        };

        let record = MetadataRecord::new(video_hash, author, fingerprint)
            .with_pubkey_url(options.pubkey_url.clone())
            .with_embedded_pubkey(embedded)
            .with_tags(options.tags.clone())
            .with_notes(options.notes.clone());
        record.validate()?;

        Ok(record)
    }

    /// Writes a copy of `input` to `output` with a freshly signed block,
    /// replacing any block the input already had.
    ///
    /// The input is never modified and on failure `output` is left as it
    /// was.
    pub fn sign_video<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        key: &SigningKey,
        author: Author,
        options: &SignOptions,
    ) -> Result<AuthBlock, SignError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        if same_file(input, output) {
            return Err(SignError::SameFile(output.to_path_buf()));
        }

        let record = self.record(input, key, author, options)?;

        let canonical = canonical::to_canonical(&record)?;
        let signature = self.backend.sign(&canonical, key)?;
        let block = AuthBlock::new(record, signature);

        let adapter = adapter_for(input)?;
        adapter.write_block(input, output, &block.to_bytes()?)?;

        info!(
            input = %input.display(),
            output = %output.display(),
            fingerprint = %block.metadata.pubkey_fingerprint,
            "Signed video"
        );
        Ok(block)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| -> Option<PathBuf> { fs::canonicalize(p).ok() };

    match (canonical(a), canonical(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}
