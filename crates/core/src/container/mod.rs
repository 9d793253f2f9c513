//! Everything to do with reading and writing the authentication block inside
//! of a media container, along with locating the essence of the file.
//!
//! Each supported family of containers has one [ContainerAdapter]. Which one
//! to use is decided by [ContainerFormat::detect], which looks at the first
//! bytes of the file rather than trusting the extension.

mod error;
pub mod mkv;
pub mod mp4;
mod splice;

pub use error::*;
pub(crate) use splice::*;

use std::{
    fs::File,
    io::Read,
    path::Path,
};

use tracing::debug;

use crate::essence::{EssenceLayout, EssenceReader};

/// Number of bytes needed to recognise any supported format
const SNIFF_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// ISO base media files: mp4, mov, m4v...
    Mp4,
    /// Matroska and WebM
    Matroska,
}

impl ContainerFormat {
    /// Works out the format of the file at the given path from its contents
    pub fn detect<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let mut file = File::open(path.as_ref())?;

        let mut head = Vec::with_capacity(SNIFF_LEN);
        file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head)?;

        let format = Self::detect_bytes(&head)?;
        debug!(path = %path.as_ref().display(), ?format, "Detected container");
        Ok(format)
    }

    /// Works out the format from the start of a file
    pub fn detect_bytes(head: &[u8]) -> Result<Self, ContainerError> {
        if head.get(4..8) == Some(&b"ftyp"[..]) {
            return Ok(Self::Mp4);
        }

        if head.starts_with(&mkv::EBML_MAGIC) {
            return match mkv::doc_type(head) {
                Some("matroska" | "webm") => Ok(Self::Matroska),
                Some(other) => Err(ContainerError::unsupported(format!(
                    "EBML document type `{other}`"
                ))),
                None => Err(ContainerError::corrupt("unreadable EBML header")),
            };
        }

        Err(ContainerError::unsupported("unrecognised file signature"))
    }

    /// The adapter which handles this format
    pub fn adapter(&self) -> &'static dyn ContainerAdapter {
        match self {
            Self::Mp4 => &mp4::Mp4Adapter,
            Self::Matroska => &mkv::MatroskaAdapter,
        }
    }
}

/// The capabilities needed from a container to hold an authentication block.
///
/// Writing always produces a new file at `dst` (which may be the same path
/// as `src`); it is written to a temporary file first and moved into place
/// once complete.
pub trait ContainerAdapter: Send + Sync {
    fn format(&self) -> ContainerFormat;

    /// The name the authentication block is stored under in this family
    fn tag_name(&self) -> &'static str;

    /// Reads the value of the named tag, if it exists
    fn read_tag(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, ContainerError>;

    /// Produces a copy of `src` at `dst` where the named tag holds `value`,
    /// replacing any previous value
    fn write_tag(
        &self,
        src: &Path,
        dst: &Path,
        name: &str,
        value: &[u8],
    ) -> Result<(), ContainerError>;

    /// Produces a copy of `src` at `dst` without the named tag
    fn remove_tag(&self, src: &Path, dst: &Path, name: &str) -> Result<(), ContainerError>;

    /// Locates every audio and video sample of the file
    fn essence(&self, path: &Path) -> Result<EssenceLayout, ContainerError>;

    fn read_block(&self, path: &Path) -> Result<Option<Vec<u8>>, ContainerError> {
        self.read_tag(path, self.tag_name())
    }

    fn write_block(&self, src: &Path, dst: &Path, block: &[u8]) -> Result<(), ContainerError> {
        self.write_tag(src, dst, self.tag_name(), block)
    }

    fn remove_block(&self, src: &Path, dst: &Path) -> Result<(), ContainerError> {
        self.remove_tag(src, dst, self.tag_name())
    }

    /// The framed essence byte stream, ready to be hashed
    fn essence_stream(&self, path: &Path) -> Result<EssenceReader<File>, ContainerError> {
        let layout = self.essence(path)?;
        if layout.is_empty() {
            return Err(ContainerError::corrupt("no audio or video tracks"));
        }

        let file = File::open(path)?;
        if !layout.fits_within(file.metadata()?.len()) {
            return Err(ContainerError::corrupt("samples extend past the end of the file"));
        }

        Ok(EssenceReader::new(file, layout))
    }
}

/// Detects the format of the file and returns the adapter for it
pub fn adapter_for<P: AsRef<Path>>(path: P) -> Result<&'static dyn ContainerAdapter, ContainerError> {
    Ok(ContainerFormat::detect(path)?.adapter())
}
