use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use crate::container::ContainerError;

pub type FourCc = [u8; 4];

/// Boxes which are only made up of other boxes, and which we may need to
/// look inside of
const CONTAINERS: [&FourCc; 11] = [
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta", b"edts", b"dinf", b"mvex", b"ilst",
    b"----",
];

/// How deeply boxes may be nested before a file is treated as corrupt
pub const MAX_DEPTH: usize = 32;

/// A box held in memory, with only the parts needed being broken down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub kind: FourCc,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Raw(Vec<u8>),
    /// `prefix` holds the version and flags of full boxes such as `meta`
    Container { prefix: Vec<u8>, children: Vec<Atom> },
}

impl Atom {
    pub fn raw(kind: &FourCc, data: Vec<u8>) -> Self {
        Self {
            kind: *kind,
            body: Body::Raw(data),
        }
    }

    pub fn container(kind: &FourCc, prefix: Vec<u8>, children: Vec<Atom>) -> Self {
        Self {
            kind: *kind,
            body: Body::Container { prefix, children },
        }
    }

    /// Parses the payload of a box of the given kind
    pub fn parse(kind: FourCc, payload: &[u8]) -> Result<Self, ContainerError> {
        Self::parse_at(kind, payload, 0)
    }

    fn parse_at(kind: FourCc, payload: &[u8], depth: usize) -> Result<Self, ContainerError> {
        let prefix_len = match &kind {
            k if CONTAINERS.contains(&k) => 0,
            // ISO `meta` is a full box, QuickTime's is not
            b"meta" if payload.get(4..8) == Some(&b"hdlr"[..]) => 0,
            b"meta" => 4,
            _ => return Ok(Self::raw(&kind, payload.to_vec())),
        };

        let prefix = payload
            .get(..prefix_len)
            .ok_or_else(|| ContainerError::corrupt("truncated meta box"))?
            .to_vec();

        if depth >= MAX_DEPTH {
            return Err(ContainerError::corrupt(format!(
                "boxes are nested more than {MAX_DEPTH} deep"
            )));
        }

        let mut children = Vec::new();
        let mut pos = prefix_len;
        while pos < payload.len() {
            let rest = &payload[pos..];
            // QuickTime allows a zero terminator at the end of `udta`
            if rest.len() < 8 && rest.iter().all(|b| *b == 0) {
                break;
            }

            let (child_kind, header_len, size) = parse_header(rest)?;
            let size = size.unwrap_or(payload.len() - pos);

            let past_parent = || ContainerError::corrupt("box extends past its parent");
            let end = pos.checked_add(size).ok_or_else(past_parent)?;
            let body = payload.get(pos + header_len..end).ok_or_else(past_parent)?;
            children.push(Self::parse_at(child_kind, body, depth + 1)?);

            pos = end;
        }

        Ok(Self::container(&kind, prefix, children))
    }

    pub fn children(&self) -> &[Atom] {
        match &self.body {
            Body::Container { children, .. } => children,
            Body::Raw(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Atom>> {
        match &mut self.body {
            Body::Container { children, .. } => Some(children),
            Body::Raw(_) => None,
        }
    }

    pub fn data(&self) -> &[u8] {
        match &self.body {
            Body::Raw(data) => data,
            Body::Container { .. } => &[],
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.body {
            Body::Raw(data) => Some(data),
            Body::Container { .. } => None,
        }
    }

    pub fn child(&self, kind: &FourCc) -> Option<&Atom> {
        self.children().iter().find(|c| &c.kind == kind)
    }

    pub fn child_mut(&mut self, kind: &FourCc) -> Option<&mut Atom> {
        self.children_mut()?.iter_mut().find(|c| &c.kind == kind)
    }

    /// Follows a path of child kinds
    pub fn find(&self, path: &[&FourCc]) -> Option<&Atom> {
        path.iter().try_fold(self, |atom, kind| atom.child(kind))
    }

    pub fn children_of<'a>(&'a self, kind: &'a FourCc) -> impl Iterator<Item = &'a Atom> + 'a {
        self.children().iter().filter(move |c| &c.kind == kind)
    }

    fn payload_len(&self) -> u64 {
        match &self.body {
            Body::Raw(data) => data.len() as u64,
            Body::Container { prefix, children } => {
                prefix.len() as u64 + children.iter().map(Atom::encoded_len).sum::<u64>()
            }
        }
    }

    /// The full length of the box once written, including its header
    pub fn encoded_len(&self) -> u64 {
        let payload = self.payload_len();
        match u32::try_from(payload + 8) {
            Ok(_) => payload + 8,
            Err(_) => payload + 16,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len() as usize);
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        let len = self.encoded_len();
        match u32::try_from(len) {
            Ok(small) if len == self.payload_len() + 8 => {
                out.extend_from_slice(&small.to_be_bytes());
                out.extend_from_slice(&self.kind);
            }
            _ => {
                out.extend_from_slice(&1u32.to_be_bytes());
                out.extend_from_slice(&self.kind);
                out.extend_from_slice(&len.to_be_bytes());
            }
        }

        match &self.body {
            Body::Raw(data) => out.extend_from_slice(data),
            Body::Container { prefix, children } => {
                out.extend_from_slice(prefix);
                for child in children {
                    child.encode_into(out);
                }
            }
        }
    }
}

/// Reads a box header from a buffer: the kind, the header length and the
/// total size ([None] when the box runs to the end)
pub fn parse_header(buf: &[u8]) -> Result<(FourCc, usize, Option<usize>), ContainerError> {
    let short = buf
        .get(..8)
        .ok_or_else(|| ContainerError::corrupt("truncated box header"))?;
    let size = u32::from_be_bytes([short[0], short[1], short[2], short[3]]);
    let kind = [short[4], short[5], short[6], short[7]];

    let (header_len, size) = match size {
        0 => (8, None),
        1 => {
            let large = buf
                .get(8..16)
                .ok_or_else(|| ContainerError::corrupt("truncated box header"))?;
            let large = u64::from_be_bytes(large.try_into().unwrap_or_default());
            let large = usize::try_from(large)
                .map_err(|_| ContainerError::corrupt("box is too large"))?;
            (16, Some(large))
        }
        n => (8, Some(n as usize)),
    };

    if size.is_some_and(|s| s < header_len) {
        return Err(ContainerError::corrupt(format!(
            "box `{}` is smaller than its header",
            String::from_utf8_lossy(&kind)
        )));
    }

    Ok((kind, header_len, size))
}

/// Where a top level box is in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevel {
    pub kind: FourCc,
    pub start: u64,
    pub header_len: u64,
    pub end: u64,
}

/// Lists the top level boxes of a file without reading their contents
pub fn top_level(path: &Path) -> Result<(Vec<TopLevel>, File), ContainerError> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut boxes = Vec::new();
    let mut pos = 0u64;
    while pos < len {
        reader.seek(SeekFrom::Start(pos))?;

        let mut header = [0u8; 16];
        let available = (len - pos).min(16) as usize;
        reader.read_exact(&mut header[..available])?;

        let (kind, header_len, size) = parse_header(&header[..available])?;
        let end = match size {
            Some(size) => pos.checked_add(size as u64),
            None => Some(len),
        };

        let Some(end) = end.filter(|end| *end <= len) else {
            return Err(ContainerError::corrupt(format!(
                "box `{}` runs past the end of the file",
                String::from_utf8_lossy(&kind)
            )));
        };

        boxes.push(TopLevel {
            kind,
            start: pos,
            header_len: header_len as u64,
            end,
        });
        pos = end;
    }

    Ok((boxes, reader.into_inner()))
}

/// Reads a top level box into memory
pub fn load(file: &mut File, top: &TopLevel) -> Result<Atom, ContainerError> {
    file.seek(SeekFrom::Start(top.start + top.header_len))?;

    let mut payload = vec![0u8; (top.end - top.start - top.header_len) as usize];
    file.read_exact(&mut payload)?;

    Atom::parse(top.kind, &payload)
}

pub fn u32_at(data: &[u8], pos: usize) -> Result<u32, ContainerError> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ContainerError::corrupt("box is truncated"))
}

pub fn u64_at(data: &[u8], pos: usize) -> Result<u64, ContainerError> {
    let hi = u32_at(data, pos)? as u64;
    let lo = u32_at(data, pos + 4)? as u64;
    Ok((hi << 32) | lo)
}
