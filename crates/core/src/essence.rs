//! Hashing of the essence of a video: the raw audio and video samples,
//! without any of the container metadata around them.
//!
//! Adapters describe where each sample lives with an [EssenceLayout], which
//! is turned into a single framed byte stream by [EssenceReader]:
//!
//! ```text
//! stream  = "AVCF-ESSENCE-1" track*
//! track   = kind:u8 ('V' | 'A') sample_count:u64 sample*
//! sample  = length:u64 bytes[length]
//! ```
//!
//! All integers are big-endian. Video tracks come first, then audio tracks,
//! each ordered by their track number in the container, and the samples of a
//! track are kept in decode order. Only the position of a track is part of
//! the stream, so renumbering tracks when remuxing does not change the hash.

use std::io::{self, BufReader, Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};

use crate::spec::{ESSENCE_STREAM_MAGIC, VideoHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// The byte written before every track in the essence stream
    pub const fn marker(&self) -> u8 {
        match self {
            TrackKind::Video => b'V',
            TrackKind::Audio => b'A',
        }
    }
}

/// A byte range in the file which holds one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub len: u64,
}

impl Extent {
    pub const fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EssenceTrack {
    pub kind: TrackKind,
    /// The number the container gives the track, only used for ordering
    pub number: u64,
    pub samples: Vec<Extent>,
}

impl EssenceTrack {
    pub fn new(kind: TrackKind, number: u64) -> Self {
        Self {
            kind,
            number,
            samples: Vec::new(),
        }
    }
}

/// Where all the audio and video samples of a file are
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EssenceLayout {
    tracks: Vec<EssenceTrack>,
}

impl EssenceLayout {
    /// Puts the tracks into the order they are hashed in
    pub fn new(mut tracks: Vec<EssenceTrack>) -> Self {
        tracks.sort_by_key(|t| (t.kind, t.number));
        Self { tracks }
    }

    pub fn tracks(&self) -> &[EssenceTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Whether every sample is inside a file of the given length
    pub fn fits_within(&self, file_len: u64) -> bool {
        self.tracks
            .iter()
            .flat_map(|t| t.samples.iter())
            .all(|s| s.offset.checked_add(s.len).is_some_and(|end| end <= file_len))
    }
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Magic,
    Track(usize),
    Sample(usize, usize),
    Done,
}

/// Reads the framed essence stream of a file, pulling each sample from the
/// underlying source as it is needed
pub struct EssenceReader<R: Read + Seek> {
    source: BufReader<R>,
    layout: EssenceLayout,
    cursor: Cursor,
    /// Framing bytes waiting to be handed out
    header: Vec<u8>,
    header_pos: usize,
    /// Bytes of the current sample still to read
    remaining: u64,
    position: u64,
}

impl<R: Read + Seek> EssenceReader<R> {
    pub fn new(source: R, layout: EssenceLayout) -> Self {
        Self {
            source: BufReader::new(source),
            layout,
            cursor: Cursor::Magic,
            header: Vec::new(),
            header_pos: 0,
            remaining: 0,
            position: 0,
        }
    }

    /// Moves onto the next piece of framing, returns false once everything
    /// has been produced
    fn advance(&mut self) -> io::Result<bool> {
        loop {
            self.header.clear();
            self.header_pos = 0;

            match self.cursor {
                Cursor::Magic => {
                    self.header.extend_from_slice(ESSENCE_STREAM_MAGIC);
                    self.cursor = Cursor::Track(0);
                    return Ok(true);
                }
                Cursor::Track(t) => {
                    let Some(track) = self.layout.tracks.get(t) else {
                        self.cursor = Cursor::Done;
                        continue;
                    };

                    self.header.push(track.kind.marker());
                    self.header
                        .extend_from_slice(&(track.samples.len() as u64).to_be_bytes());
                    self.cursor = Cursor::Sample(t, 0);
                    return Ok(true);
                }
                Cursor::Sample(t, s) => {
                    let Some(sample) = self.layout.tracks[t].samples.get(s).copied() else {
                        self.cursor = Cursor::Track(t + 1);
                        continue;
                    };

                    if sample.offset != self.position {
                        self.source.seek(SeekFrom::Start(sample.offset))?;
                        self.position = sample.offset;
                    }

                    self.header.extend_from_slice(&sample.len.to_be_bytes());
                    self.remaining = sample.len;
                    self.cursor = Cursor::Sample(t, s + 1);
                    return Ok(true);
                }
                Cursor::Done => return Ok(false),
            }
        }
    }
}

impl<R: Read + Seek> Read for EssenceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.header_pos < self.header.len() {
                let pending = &self.header[self.header_pos..];
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                self.header_pos += n;
                return Ok(n);
            }

            if self.remaining > 0 {
                let want = self.remaining.min(buf.len() as u64) as usize;
                let n = self.source.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "sample extends past the end of the file",
                    ));
                }

                self.remaining -= n as u64;
                self.position += n as u64;
                return Ok(n);
            }

            if !self.advance()? {
                return Ok(0);
            }
        }
    }
}

/// Computes the SHA-256 digest of an essence stream
pub fn hash<R: Read>(mut stream: R) -> io::Result<VideoHash> {
    let mut hasher = Sha256::new();
    io::copy(&mut stream, &mut hasher)?;

    Ok(VideoHash::new(hasher.finalize().into()))
}
