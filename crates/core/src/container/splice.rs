//! Rewriting of a container as a list of pieces: ranges copied from the
//! source and new bytes spliced in between them.
//!
//! The output is always built in a temporary file next to the destination
//! and only renamed over it once everything has been written, so a failure
//! at any point leaves the destination untouched.

use std::{
    fs::File,
    io::{self, BufWriter, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::Path,
};

use tempfile::NamedTempFile;
use tracing::debug;

use super::ContainerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Copy(Range<u64>),
    Bytes(Vec<u8>),
}

/// An ordered description of the new file
#[derive(Debug, Default)]
pub(crate) struct Splice {
    pieces: Vec<Piece>,
}

impl Splice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy(&mut self, range: Range<u64>) -> &mut Self {
        if !range.is_empty() {
            self.pieces.push(Piece::Copy(range));
        }
        self
    }

    pub fn insert(&mut self, bytes: Vec<u8>) -> &mut Self {
        if !bytes.is_empty() {
            self.pieces.push(Piece::Bytes(bytes));
        }
        self
    }

    /// Copies the source from `start` to `end`, replacing the given
    /// (sorted, non overlapping) ranges with new bytes on the way
    pub fn copy_replacing(
        &mut self,
        start: u64,
        end: u64,
        replacements: Vec<(Range<u64>, Vec<u8>)>,
    ) -> &mut Self {
        let mut pos = start;
        for (range, bytes) in replacements {
            self.copy(pos..range.start);
            self.insert(bytes);
            pos = range.end;
        }
        self.copy(pos..end)
    }

    /// Writes the spliced file to `dst` atomically
    pub fn write(&self, src: &Path, dst: &Path) -> Result<(), ContainerError> {
        let dir = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut source = File::open(src)?;
        let mut tmp = NamedTempFile::new_in(dir)?;

        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for piece in &self.pieces {
                match piece {
                    Piece::Copy(range) => {
                        source.seek(SeekFrom::Start(range.start))?;
                        let want = range.end - range.start;
                        let copied = io::copy(&mut (&mut source).take(want), &mut out)?;
                        if copied != want {
                            return Err(ContainerError::corrupt(format!(
                                "file ended {} bytes early",
                                want - copied
                            )));
                        }
                    }
                    Piece::Bytes(bytes) => out.write_all(bytes)?,
                }
            }
            out.flush()?;
        }

        tmp.as_file().sync_all()?;
        tmp.persist(dst).map_err(|e| ContainerError::Io(e.error))?;

        debug!(dst = %dst.display(), pieces = self.pieces.len(), "Rewrote container");
        Ok(())
    }
}
