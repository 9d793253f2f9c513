#![allow(dead_code)]

use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

use avcf::{
    container::adapter_for,
    crypto::SigningKey,
    sign::{SignError, SignOptions},
    spec::{AuthBlock, Author},
};
use tempfile::TempDir;
use testlibs::keys::TestKey;

pub type TestResult = Result<(), Box<dyn Error>>;

pub fn signing_key(key: &TestKey) -> SigningKey {
    let signing = SigningKey::new(key.secret);
    match key.passphrase {
        Some(p) => signing.with_passphrase(p),
        None => signing,
    }
}

pub fn author(key: &TestKey) -> Author {
    Author::new(key.name).with_email(key.email)
}

pub fn embedded() -> SignOptions {
    SignOptions::default().with_embedded_pubkey()
}

pub fn sign(
    input: &Path,
    output: &Path,
    key: &TestKey,
    options: &SignOptions,
) -> Result<AuthBlock, SignError> {
    avcf::sign_video(input, output, &signing_key(key), author(key), options)
}

/// A scratch directory which is removed at the end of the test
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        testlibs::init_logging();
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path<S: AsRef<str>>(&self, name: S) -> PathBuf {
        self.dir.path().join(name.as_ref())
    }

    pub fn write<S: AsRef<str>>(&self, name: S, bytes: &[u8]) -> Result<PathBuf, Box<dyn Error>> {
        let path = self.path(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

pub fn read_block(path: &Path) -> Result<AuthBlock, Box<dyn Error>> {
    let bytes = adapter_for(path)?
        .read_block(path)?
        .ok_or("file has no block")?;
    Ok(AuthBlock::from_bytes(&bytes)?)
}

/// Copies `src` to `dst` with its block changed by `edit`, without signing
/// it again
pub fn rewrite_block<F>(src: &Path, dst: &Path, edit: F) -> TestResult
where
    F: FnOnce(&mut AuthBlock),
{
    let mut block = read_block(src)?;
    edit(&mut block);
    adapter_for(src)?.write_block(src, dst, &block.to_bytes()?)?;
    Ok(())
}

/// Changes one character in the middle of the base64 body of an armored
/// signature
pub fn corrupt_signature(signature: &str) -> String {
    let mut lines: Vec<String> = signature.lines().map(str::to_string).collect();

    if let Some(line) = lines
        .iter_mut()
        .find(|l| !l.is_empty() && !l.starts_with("-----") && !l.contains(": "))
    {
        let mut chars: Vec<char> = line.chars().collect();
        let idx = 10.min(chars.len() - 1);
        chars[idx] = if chars[idx] == 'A' { 'B' } else { 'A' };
        *line = chars.into_iter().collect();
    }

    lines.join("\n")
}

/// A path next to `path` with a prefix added to its file name
pub fn renamed(path: &Path, prefix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{prefix}.{name}"))
}

pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
