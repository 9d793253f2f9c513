//! Matroska and WebM support.
//!
//! The block is stored as a `SimpleTag` named [TAG_NAME] in a `Tags` element
//! with a global target. When a new block is written every old `SimpleTag`
//! with the same name is blanked out with `Void` elements of the same length
//! and a fresh `Tags` element is added to the end of the first segment. This
//! leaves every other element where it was relative to the segment, so the
//! `SeekHead` and `Cues` stay correct.

pub mod ebml;
mod lacing;

pub use lacing::*;

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    ops::Range,
    path::Path,
};

use tracing::{debug, trace};

use crate::essence::{EssenceLayout, EssenceTrack, Extent, TrackKind};

use super::{ContainerAdapter, ContainerError, ContainerFormat, Splice};
use ebml::Header;

pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

pub const TAG_NAME: &str = "AVCF_AUTH";

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

/// Reads the `DocType` from the start of a file, the buffer does not need to
/// hold the whole EBML header
pub fn doc_type(head: &[u8]) -> Option<&str> {
    let (id, id_len) = ebml::parse_id(head).ok()?;
    if id != ebml::EBML {
        return None;
    }

    let (size, size_len) = ebml::parse_size(head.get(id_len..)?).ok()?;
    let start = id_len + size_len;
    let end = size.map_or(head.len(), |s| {
        start.saturating_add(s as usize).min(head.len())
    });

    ebml::Children::new(head.get(start..end)?)
        .map_while(Result::ok)
        .find(|c| c.id == ebml::DOC_TYPE)
        .map(|c| c.as_str())
}

/// Reads elements from a file while keeping track of where it is, so that
/// skipping forward does not throw away the read buffer
struct Walker {
    reader: BufReader<File>,
    pos: u64,
    len: u64,
}

impl Walker {
    fn open(path: &Path) -> Result<Self, ContainerError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            pos: 0,
            len,
        })
    }

    fn goto(&mut self, pos: u64) -> Result<(), ContainerError> {
        if pos != self.pos {
            match i64::try_from(pos as i128 - self.pos as i128) {
                Ok(diff) => self.reader.seek_relative(diff)?,
                Err(_) => {
                    self.reader.seek(SeekFrom::Start(pos))?;
                }
            }
            self.pos = pos;
        }
        Ok(())
    }

    fn header(&mut self, pos: u64) -> Result<Option<Header>, ContainerError> {
        if pos >= self.len {
            return Ok(None);
        }

        self.goto(pos)?;
        let header = ebml::read_header(&mut self.reader, pos)?;
        if let Some(h) = &header {
            self.pos = h.data_start;
        }

        Ok(header)
    }

    fn payload(&mut self, header: &Header) -> Result<Vec<u8>, ContainerError> {
        let end = self.end_of(header)?;

        self.goto(header.data_start)?;
        let mut buf = vec![0; (end - header.data_start) as usize];
        self.reader.read_exact(&mut buf)?;
        self.pos = end;

        Ok(buf)
    }

    /// Where the element ends, it must have a known size within the file
    fn end_of(&self, header: &Header) -> Result<u64, ContainerError> {
        header
            .data_end()
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                ContainerError::corrupt(format!(
                    "element {:#X} at {} has an invalid size",
                    header.id, header.start
                ))
            })
    }
}

/// A `Tags` element, kept in memory
struct TagsElement {
    header: Header,
    payload: Vec<u8>,
}

/// What was found in the first segment of a file
struct Scan {
    segment: Header,
    /// The end of the segment's payload
    segment_end: u64,
    file_len: u64,
    tracks: Option<Vec<u8>>,
    tags: Vec<TagsElement>,
    /// The frames of every track, keyed by track number
    frames: BTreeMap<u64, Vec<Extent>>,
}

impl Scan {
    /// Walks the first segment of the file, the frames of the clusters are
    /// only collected when `with_frames` is set
    fn run(path: &Path, with_frames: bool) -> Result<Self, ContainerError> {
        let mut w = Walker::open(path)?;

        let head = w
            .header(0)?
            .filter(|h| h.id == ebml::EBML)
            .ok_or_else(|| ContainerError::corrupt("missing EBML header"))?;

        let mut pos = w.end_of(&head)?;
        let segment = loop {
            let h = w
                .header(pos)?
                .ok_or_else(|| ContainerError::corrupt("no segment in file"))?;
            if h.id == ebml::SEGMENT {
                break h;
            }
            pos = w.end_of(&h)?;
        };

        let segment_end = match segment.size {
            Some(_) => w.end_of(&segment)?,
            None => w.len,
        };

        let mut scan = Self {
            segment,
            segment_end,
            file_len: w.len,
            tracks: None,
            tags: Vec::new(),
            frames: BTreeMap::new(),
        };

        let mut pos = segment.data_start;
        while pos < segment_end {
            let Some(h) = w.header(pos)? else { break };

            pos = match h.id {
                ebml::CLUSTER => scan.cluster(&mut w, h, with_frames)?,
                ebml::TRACKS => {
                    scan.tracks = Some(w.payload(&h)?);
                    w.pos
                }
                ebml::TAGS => {
                    let payload = w.payload(&h)?;
                    scan.tags.push(TagsElement { header: h, payload });
                    w.pos
                }
                _ => w.end_of(&h)?,
            };
        }

        debug!(
            tags = scan.tags.len(),
            tracks = scan.tracks.is_some(),
            "Scanned matroska segment"
        );
        Ok(scan)
    }

    /// Reads through a cluster, returning where the next element starts
    fn cluster(
        &mut self,
        w: &mut Walker,
        cluster: Header,
        with_frames: bool,
    ) -> Result<u64, ContainerError> {
        let end = match cluster.size {
            Some(_) => {
                let end = w.end_of(&cluster)?;
                if !with_frames {
                    return Ok(end);
                }
                end
            }
            None => self.segment_end,
        };

        let mut pos = cluster.data_start;
        while pos < end {
            let Some(h) = w.header(pos)? else { break };

            // An unknown sized cluster finishes when the next top level
            // element starts
            if cluster.size.is_none() && ebml::SEGMENT_CHILDREN.contains(&h.id) {
                return Ok(pos);
            }

            match h.id {
                ebml::SIMPLE_BLOCK if with_frames => {
                    let payload = w.payload(&h)?;
                    self.add_frames(h.data_start, &payload)?;
                }
                ebml::BLOCK_GROUP if with_frames => {
                    let payload = w.payload(&h)?;
                    for child in ebml::Children::new(&payload) {
                        let child = child?;
                        if child.id == ebml::BLOCK {
                            let offset = h.data_start + child.data_start() as u64;
                            self.add_frames(offset, child.data)?;
                        }
                    }
                }
                _ => {}
            }

            pos = w.end_of(&h)?;
        }

        Ok(end)
    }

    fn add_frames(&mut self, offset: u64, block: &[u8]) -> Result<(), ContainerError> {
        let parsed = parse_block(block)?;
        trace!(track = parsed.track, frames = parsed.frames.len(), "Read block");

        let frames = self.frames.entry(parsed.track).or_default();
        frames.extend(
            parsed
                .frames
                .into_iter()
                .map(|r| Extent::new(offset + r.start as u64, r.len() as u64)),
        );

        Ok(())
    }

    /// The audio and video tracks declared in the `Tracks` element
    fn track_kinds(&self) -> Result<BTreeMap<u64, TrackKind>, ContainerError> {
        let tracks = self
            .tracks
            .as_deref()
            .ok_or_else(|| ContainerError::corrupt("no Tracks element"))?;

        let mut kinds = BTreeMap::new();
        for entry in ebml::Children::new(tracks) {
            let entry = entry?;
            if entry.id != ebml::TRACK_ENTRY {
                continue;
            }

            let mut number = None;
            let mut kind = None;
            for field in entry.children() {
                let field = field?;
                match field.id {
                    ebml::TRACK_NUMBER => number = Some(field.as_uint()),
                    ebml::TRACK_TYPE => kind = Some(field.as_uint()),
                    _ => {}
                }
            }

            let kind = match kind {
                Some(TRACK_TYPE_VIDEO) => TrackKind::Video,
                Some(TRACK_TYPE_AUDIO) => TrackKind::Audio,
                _ => continue,
            };
            let number =
                number.ok_or_else(|| ContainerError::corrupt("track entry without a number"))?;

            kinds.insert(number, kind);
        }

        Ok(kinds)
    }

    fn find_tag(&self, name: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        for tags in &self.tags {
            for tag in ebml::Children::new(&tags.payload) {
                let tag = tag?;
                if tag.id != ebml::TAG {
                    continue;
                }

                for simple in tag.children() {
                    let simple = simple?;
                    if simple.id != ebml::SIMPLE_TAG {
                        continue;
                    }

                    if let Some(value) = simple_tag_value(simple.data, name)? {
                        return Ok(Some(value.to_vec()));
                    }
                }
            }
        }

        Ok(None)
    }

    /// The ranges of the file which need to be voided to get rid of every
    /// `SimpleTag` with the given name, using the largest element that only
    /// holds those tags
    fn tag_ranges(&self, name: &str) -> Result<Vec<Range<u64>>, ContainerError> {
        let mut ranges = Vec::new();

        for tags in &self.tags {
            let base = tags.header.data_start;
            let mut found = Vec::new();
            let mut whole_element = true;

            for tag in ebml::Children::new(&tags.payload) {
                let tag = tag?;
                match tag.id {
                    ebml::TAG => {}
                    ebml::VOID => continue,
                    _ => {
                        whole_element = false;
                        continue;
                    }
                }

                let tag_base = base + tag.data_start() as u64;
                let mut ours = Vec::new();
                let mut others = false;

                for simple in tag.children() {
                    let simple = simple?;
                    match simple.id {
                        ebml::SIMPLE_TAG if simple_tag_value(simple.data, name)?.is_some() => {
                            let start = tag_base + simple.start as u64;
                            ours.push(start..start + simple.len as u64);
                        }
                        ebml::SIMPLE_TAG => others = true,
                        _ => {}
                    }
                }

                if ours.is_empty() {
                    whole_element = false;
                } else if others {
                    whole_element = false;
                    found.extend(ours);
                } else {
                    let start = base + tag.start as u64;
                    found.push(start..start + tag.len as u64);
                }
            }

            if found.is_empty() {
                continue;
            }

            if whole_element {
                let end = base + tags.payload.len() as u64;
                ranges.push(tags.header.start..end);
            } else {
                ranges.extend(found);
            }
        }

        ranges.sort_by_key(|r| r.start);
        Ok(ranges)
    }

    /// The edits needed to blank out the named tag
    fn voids(&self, name: &str) -> Result<Vec<(Range<u64>, Vec<u8>)>, ContainerError> {
        self.tag_ranges(name)?
            .into_iter()
            .map(|r| ebml::void(r.end - r.start).map(|void| (r, void)))
            .collect()
    }
}

/// The value of a `SimpleTag` if its name matches
fn simple_tag_value<'a>(simple: &'a [u8], name: &str) -> Result<Option<&'a [u8]>, ContainerError> {
    let mut matched = false;
    let mut value = None;

    for field in ebml::Children::new(simple) {
        let field = field?;
        match field.id {
            ebml::TAG_NAME => matched = field.as_str() == name,
            ebml::TAG_STRING | ebml::TAG_BINARY => value = Some(field.data),
            _ => {}
        }
    }

    Ok(if matched { value } else { None })
}

/// A `Tags` element with a single global `Tag` holding the value
fn tags_element(name: &str, value: &[u8]) -> Vec<u8> {
    let value_id = match std::str::from_utf8(value) {
        Ok(_) => ebml::TAG_STRING,
        Err(_) => ebml::TAG_BINARY,
    };

    let simple = ebml::master(
        ebml::SIMPLE_TAG,
        &[
            ebml::element(ebml::TAG_NAME, name.as_bytes()),
            ebml::element(value_id, value),
        ],
    );
    let tag = ebml::master(ebml::TAG, &[ebml::element(ebml::TARGETS, &[]), simple]);

    ebml::master(ebml::TAGS, &[tag])
}

/// Handles the Matroska family of containers
#[derive(Debug, Clone, Copy, Default)]
pub struct MatroskaAdapter;

impl ContainerAdapter for MatroskaAdapter {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Matroska
    }

    fn tag_name(&self) -> &'static str {
        TAG_NAME
    }

    fn read_tag(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        Scan::run(path, false)?.find_tag(name)
    }

    fn write_tag(
        &self,
        src: &Path,
        dst: &Path,
        name: &str,
        value: &[u8],
    ) -> Result<(), ContainerError> {
        let scan = Scan::run(src, false)?;
        let voids = scan.voids(name)?;
        let tags = tags_element(name, value);
        let segment = &scan.segment;

        let mut splice = Splice::new();
        match segment.size {
            Some(size) => {
                let new_size = size + tags.len() as u64;
                if new_size > ebml::MAX_SIZE {
                    return Err(ContainerError::unsupported("segment would be too large"));
                }

                splice
                    .copy(0..segment.size_start())
                    .insert(ebml::encode_size_with_len(new_size, 8));
            }
            None => {
                splice.copy(0..segment.data_start);
            }
        }

        splice
            .copy_replacing(segment.data_start, scan.segment_end, voids)
            .insert(tags)
            .copy(scan.segment_end..scan.file_len);

        splice.write(src, dst)
    }

    fn remove_tag(&self, src: &Path, dst: &Path, name: &str) -> Result<(), ContainerError> {
        let scan = Scan::run(src, false)?;
        let voids = scan.voids(name)?;

        let mut splice = Splice::new();
        splice.copy_replacing(0, scan.file_len, voids);
        splice.write(src, dst)
    }

    fn essence(&self, path: &Path) -> Result<EssenceLayout, ContainerError> {
        let mut scan = Scan::run(path, true)?;
        let kinds = scan.track_kinds()?;

        let tracks = kinds
            .into_iter()
            .map(|(number, kind)| EssenceTrack {
                kind,
                number,
                samples: scan.frames.remove(&number).unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        Ok(EssenceLayout::new(tracks))
    }
}
