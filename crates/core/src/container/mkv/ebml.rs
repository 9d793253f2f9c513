//! The small subset of EBML needed to walk a Matroska file: variable length
//! integers, element headers, and iterating over the children of a master
//! element held in memory.

use std::io::{self, Read};

use crate::container::ContainerError;

pub const EBML: u32 = 0x1A45_DFA3;
pub const DOC_TYPE: u32 = 0x4282;
pub const SEGMENT: u32 = 0x1853_8067;
pub const SEEK_HEAD: u32 = 0x114D_9B74;
pub const INFO: u32 = 0x1549_A966;
pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_TYPE: u32 = 0x83;
pub const CLUSTER: u32 = 0x1F43_B675;
pub const SIMPLE_BLOCK: u32 = 0xA3;
pub const BLOCK_GROUP: u32 = 0xA0;
pub const BLOCK: u32 = 0xA1;
pub const CUES: u32 = 0x1C53_BB6B;
pub const CHAPTERS: u32 = 0x1043_A770;
pub const ATTACHMENTS: u32 = 0x1941_A469;
pub const TAGS: u32 = 0x1254_C367;
pub const TAG: u32 = 0x7373;
pub const TARGETS: u32 = 0x63C0;
pub const SIMPLE_TAG: u32 = 0x67C8;
pub const TAG_NAME: u32 = 0x45A3;
pub const TAG_STRING: u32 = 0x4487;
pub const TAG_BINARY: u32 = 0x4485;
pub const VOID: u32 = 0xEC;

/// Elements which may appear straight inside of a segment, used to find the
/// end of a cluster with an unknown size
pub const SEGMENT_CHILDREN: [u32; 8] = [
    SEEK_HEAD,
    INFO,
    TRACKS,
    CLUSTER,
    CUES,
    CHAPTERS,
    ATTACHMENTS,
    TAGS,
];

/// The largest value an 8 byte size can hold, all ones means unknown
pub const MAX_SIZE: u64 = (1 << 56) - 2;

/// Total length of a variable length integer from its first byte
pub fn vint_len(first: u8) -> Option<usize> {
    match first.leading_zeros() {
        n @ 0..=7 => Some(n as usize + 1),
        _ => None,
    }
}

/// Reads an element ID, which keeps its length marker
pub fn parse_id(buf: &[u8]) -> Result<(u32, usize), ContainerError> {
    let first = *buf
        .first()
        .ok_or_else(|| ContainerError::corrupt("missing element id"))?;
    let len = vint_len(first)
        .filter(|l| *l <= 4)
        .ok_or_else(|| ContainerError::corrupt("invalid element id"))?;

    let bytes = buf
        .get(..len)
        .ok_or_else(|| ContainerError::corrupt("truncated element id"))?;
    let id = bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);

    Ok((id, len))
}

/// Reads an element size, [None] being an unknown size
pub fn parse_size(buf: &[u8]) -> Result<(Option<u64>, usize), ContainerError> {
    let (value, len) = parse_vint(buf)?;
    let unknown = (1u64 << (7 * len)) - 1;

    Ok(((value != unknown).then_some(value), len))
}

/// Reads an unsigned variable length integer without its marker
pub fn parse_vint(buf: &[u8]) -> Result<(u64, usize), ContainerError> {
    let first = *buf
        .first()
        .ok_or_else(|| ContainerError::corrupt("missing variable length integer"))?;
    let len = vint_len(first).ok_or_else(|| ContainerError::corrupt("invalid variable length integer"))?;

    let bytes = buf
        .get(..len)
        .ok_or_else(|| ContainerError::corrupt("truncated variable length integer"))?;

    let marker_mask = (0xFFu16 >> len) as u8;
    let value = bytes[1..]
        .iter()
        .fold((first & marker_mask) as u64, |acc, b| (acc << 8) | *b as u64);

    Ok((value, len))
}

/// Reads a signed variable length integer, as used by EBML lacing
pub fn parse_signed_vint(buf: &[u8]) -> Result<(i64, usize), ContainerError> {
    let (value, len) = parse_vint(buf)?;
    let bias = (1i64 << (7 * len - 1)) - 1;

    Ok((value as i64 - bias, len))
}

pub fn encode_id(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(3);
    bytes[skip..].to_vec()
}

/// Encodes a size using exactly `len` bytes
pub fn encode_size_with_len(value: u64, len: usize) -> Vec<u8> {
    let mut out = value.to_be_bytes()[8 - len..].to_vec();
    out[0] |= 0x80 >> (len - 1);
    out
}

/// Encodes a size with the fewest bytes possible
pub fn encode_size(value: u64) -> Vec<u8> {
    let len = (1..=8)
        .find(|l| value < (1u64 << (7 * l)) - 1)
        .unwrap_or(8);
    encode_size_with_len(value, len)
}

pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = encode_id(id);
    out.extend(encode_size(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn master(id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    element(id, &children.concat())
}

/// A `Void` element taking up exactly `len` bytes
pub fn void(len: u64) -> Result<Vec<u8>, ContainerError> {
    let size_len = match len {
        0..=1 => return Err(ContainerError::corrupt("cannot void an element this small")),
        2..=128 => 1,
        _ => 8,
    };

    let mut out = encode_id(VOID);
    out.extend(encode_size_with_len(len - 1 - size_len as u64, size_len));
    out.resize(len as usize, 0);
    Ok(out)
}

/// Where an element sits in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u32,
    /// Offset of the first byte of the ID
    pub start: u64,
    /// Offset of the first byte of the payload
    pub data_start: u64,
    pub size: Option<u64>,
}

impl Header {
    /// Offset of the size field
    pub fn size_start(&self) -> u64 {
        self.start + encode_id(self.id).len() as u64
    }

    pub fn data_end(&self) -> Option<u64> {
        self.size.map(|s| self.data_start + s)
    }
}

/// Reads an element header at `start` from a reader positioned there, [None]
/// if the reader is already at its end
pub fn read_header<R: Read>(r: &mut R, start: u64) -> Result<Option<Header>, ContainerError> {
    let mut buf = [0u8; 12];

    if read_one(r, &mut buf[0])? == 0 {
        return Ok(None);
    }
    let id_len = vint_len(buf[0])
        .filter(|l| *l <= 4)
        .ok_or_else(|| ContainerError::corrupt(format!("invalid element id at {start}")))?;
    r.read_exact(&mut buf[1..id_len])?;

    r.read_exact(&mut buf[id_len..id_len + 1])?;
    let size_len = vint_len(buf[id_len])
        .ok_or_else(|| ContainerError::corrupt(format!("invalid element size at {start}")))?;
    r.read_exact(&mut buf[id_len + 1..id_len + size_len])?;

    let (id, _) = parse_id(&buf)?;
    let (size, _) = parse_size(&buf[id_len..])?;

    Ok(Some(Header {
        id,
        start,
        data_start: start + (id_len + size_len) as u64,
        size,
    }))
}

fn read_one<R: Read>(r: &mut R, byte: &mut u8) -> io::Result<usize> {
    loop {
        match r.read(std::slice::from_mut(byte)) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            res => return res,
        }
    }
}

/// An element inside of a buffer
#[derive(Debug, Clone, Copy)]
pub struct Child<'a> {
    pub id: u32,
    /// Offset of the element from the start of the parent's payload
    pub start: usize,
    /// Total length including the header
    pub len: usize,
    pub data: &'a [u8],
}

impl<'a> Child<'a> {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Offset of the payload from the start of the parent's payload
    pub fn data_start(&self) -> usize {
        self.end() - self.data.len()
    }

    pub fn as_str(&self) -> &'a str {
        let trimmed = match self.data.iter().position(|b| *b == 0) {
            Some(end) => &self.data[..end],
            None => self.data,
        };
        std::str::from_utf8(trimmed).unwrap_or_default()
    }

    pub fn as_uint(&self) -> u64 {
        self.data
            .iter()
            .take(8)
            .fold(0u64, |acc, b| (acc << 8) | *b as u64)
    }

    pub fn children(&self) -> Children<'a> {
        Children::new(self.data)
    }
}

/// Iterates over the elements in a buffer, stopping at the first error
pub struct Children<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Children<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    fn next_child(&mut self) -> Result<(Child<'a>, usize), ContainerError> {
        let rest = &self.buf[self.pos..];
        let (id, id_len) = parse_id(rest)?;
        let (size, size_len) = parse_size(&rest[id_len..])?;

        let header_len = id_len + size_len;
        let size = match size {
            Some(s) => usize::try_from(s)
                .map_err(|_| ContainerError::corrupt("element size too large"))?,
            None => rest.len() - header_len,
        };

        let data = rest
            .get(header_len..header_len.saturating_add(size))
            .ok_or_else(|| ContainerError::corrupt(format!("element {id:#X} is truncated")))?;

        Ok((
            Child {
                id,
                start: self.pos,
                len: header_len + size,
                data,
            },
            header_len + size,
        ))
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<Child<'a>, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }

        match self.next_child() {
            Ok((child, len)) => {
                self.pos += len;
                Some(Ok(child))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
