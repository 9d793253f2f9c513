//! MP4 family support (ISO base media and QuickTime).
//!
//! The block is stored as an iTunes style freeform item in
//! `moov/udta/meta/ilst`: a `----` box holding a `mean` of [TAG_MEAN], a
//! `name` of [TAG_NAME] and a UTF-8 `data` box with the value. Only the
//! `moov` box is ever rewritten; if it grows or shrinks any chunk offsets
//! pointing past it are moved to match.

mod atom;
mod sample_table;

use std::path::Path;

use tracing::debug;

use crate::essence::EssenceLayout;

use super::{ContainerAdapter, ContainerError, ContainerFormat, Splice};
use atom::{Atom, FourCc, TopLevel};

pub const TAG_NAME: &str = "avcf_auth";
/// The reverse DNS namespace of the freeform item
pub const TAG_MEAN: &str = "org.avcf";

const FREEFORM: &FourCc = b"----";
/// `data` type indicator for UTF-8 text
const DATA_TYPE_UTF8: u32 = 1;

/// Version and flags of a full box
const FULL_BOX: [u8; 4] = [0; 4];

fn full_box(kind: &FourCc, payload: &[u8]) -> Atom {
    Atom::raw(kind, [&FULL_BOX[..], payload].concat())
}

fn freeform_item(name: &str, value: &[u8]) -> Atom {
    let mut data = DATA_TYPE_UTF8.to_be_bytes().to_vec();
    // Locale
    data.extend_from_slice(&[0; 4]);
    data.extend_from_slice(value);

    Atom::container(
        FREEFORM,
        Vec::new(),
        vec![
            full_box(b"mean", TAG_MEAN.as_bytes()),
            full_box(b"name", name.as_bytes()),
            Atom::raw(b"data", data),
        ],
    )
}

/// Whether the item is one of our freeform items with the given name
fn is_item(item: &Atom, name: &str) -> bool {
    let text = |kind: &FourCc| item.child(kind).and_then(|c| c.data().get(4..));

    item.kind == *FREEFORM
        && text(b"mean") == Some(TAG_MEAN.as_bytes())
        && text(b"name") == Some(name.as_bytes())
}

fn item_value(item: &Atom) -> Option<&[u8]> {
    item.child(b"data")?.data().get(8..)
}

/// An ISO `meta` box with the handler iTunes metadata needs
fn empty_meta() -> Atom {
    let mut hdlr = vec![0; 4];
    hdlr.extend_from_slice(b"mdir");
    hdlr.extend_from_slice(b"appl");
    hdlr.extend_from_slice(&[0; 9]);

    Atom::container(
        b"meta",
        FULL_BOX.to_vec(),
        vec![
            full_box(b"hdlr", &hdlr),
            Atom::container(b"ilst", Vec::new(), Vec::new()),
        ],
    )
}

/// Finds the child of the given kind, adding it if it does not exist
fn child_or_insert<'a, F>(
    parent: &'a mut Atom,
    kind: &FourCc,
    make: F,
) -> Result<&'a mut Atom, ContainerError>
where
    F: FnOnce() -> Atom,
{
    let name = String::from_utf8_lossy(&parent.kind).into_owned();
    let children = parent
        .children_mut()
        .ok_or_else(|| ContainerError::corrupt(format!("`{name}` should hold other boxes")))?;

    let idx = match children.iter().position(|c| &c.kind == kind) {
        Some(idx) => idx,
        None => {
            children.push(make());
            children.len() - 1
        }
    };

    Ok(&mut children[idx])
}

/// Removes all freeform items with the given name, returning how many
fn remove_items(moov: &mut Atom, name: &str) -> usize {
    let Some(ilst) = moov
        .child_mut(b"udta")
        .and_then(|u| u.child_mut(b"meta"))
        .and_then(|m| m.child_mut(b"ilst"))
        .and_then(Atom::children_mut)
    else {
        return 0;
    };

    let before = ilst.len();
    ilst.retain(|item| !is_item(item, name));
    before - ilst.len()
}

/// The `moov` box of a file, along with where it is
struct Movie {
    boxes: Vec<TopLevel>,
    top: TopLevel,
    moov: Atom,
    file_len: u64,
}

impl Movie {
    fn load(path: &Path) -> Result<Self, ContainerError> {
        let (boxes, mut file) = atom::top_level(path)?;
        let file_len = file.metadata()?.len();

        let top = *boxes
            .iter()
            .find(|b| &b.kind == b"moov")
            .ok_or_else(|| ContainerError::corrupt("no moov box"))?;
        let moov = atom::load(&mut file, &top)?;

        Ok(Self {
            boxes,
            top,
            moov,
            file_len,
        })
    }

    fn is_fragmented(&self) -> bool {
        self.boxes.iter().any(|b| &b.kind == b"moof") || self.moov.child(b"mvex").is_some()
    }

    /// Writes the file back out with the current `moov` box
    fn write(mut self, src: &Path, dst: &Path) -> Result<(), ContainerError> {
        let old_len = self.top.end - self.top.start;
        let new_len = self.moov.encoded_len();
        let delta = new_len as i64 - old_len as i64;

        sample_table::shift_chunk_offsets(&mut self.moov, self.top.end, delta)?;

        debug!(old_len, new_len, "Rewriting moov box");

        let mut splice = Splice::new();
        splice
            .copy(0..self.top.start)
            .insert(self.moov.encode())
            .copy(self.top.end..self.file_len);
        splice.write(src, dst)
    }
}

/// Handles the MP4 family of containers
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4Adapter;

impl ContainerAdapter for Mp4Adapter {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Mp4
    }

    fn tag_name(&self) -> &'static str {
        TAG_NAME
    }

    fn read_tag(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        let movie = Movie::load(path)?;

        let Some(ilst) = movie.moov.find(&[b"udta", b"meta", b"ilst"]) else {
            return Ok(None);
        };

        Ok(ilst
            .children()
            .iter()
            .filter(|item| is_item(item, name))
            .find_map(item_value)
            .map(<[u8]>::to_vec))
    }

    fn write_tag(
        &self,
        src: &Path,
        dst: &Path,
        name: &str,
        value: &[u8],
    ) -> Result<(), ContainerError> {
        let mut movie = Movie::load(src)?;

        let removed = remove_items(&mut movie.moov, name);
        debug!(removed, "Replacing freeform item");

        let udta = child_or_insert(&mut movie.moov, b"udta", || {
            Atom::container(b"udta", Vec::new(), Vec::new())
        })?;
        let meta = child_or_insert(udta, b"meta", empty_meta)?;
        let ilst = child_or_insert(meta, b"ilst", || {
            Atom::container(b"ilst", Vec::new(), Vec::new())
        })?;

        ilst.children_mut()
            .ok_or_else(|| ContainerError::corrupt("`ilst` should hold other boxes"))?
            .push(freeform_item(name, value));

        movie.write(src, dst)
    }

    fn remove_tag(&self, src: &Path, dst: &Path, name: &str) -> Result<(), ContainerError> {
        let mut movie = Movie::load(src)?;

        let removed = remove_items(&mut movie.moov, name);
        debug!(removed, "Removing freeform item");

        movie.write(src, dst)
    }

    fn essence(&self, path: &Path) -> Result<EssenceLayout, ContainerError> {
        let movie = Movie::load(path)?;
        if movie.is_fragmented() {
            return Err(ContainerError::unsupported("fragmented mp4"));
        }

        let tracks = sample_table::tracks(&movie.moov, movie.file_len)?;
        Ok(EssenceLayout::new(tracks))
    }
}
