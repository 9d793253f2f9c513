//! Working out where every sample of a track is from its sample table, and
//! keeping chunk offsets correct when the `moov` box changes size.

use crate::{
    container::ContainerError,
    essence::{EssenceTrack, Extent, TrackKind},
};

use super::atom::{Atom, u32_at, u64_at};

/// `stbl` boxes of every track
fn sample_tables_mut(moov: &mut Atom) -> impl Iterator<Item = &mut Atom> {
    moov.children_mut()
        .into_iter()
        .flatten()
        .filter(|t| &t.kind == b"trak")
        .filter_map(|trak| {
            trak.child_mut(b"mdia")?
                .child_mut(b"minf")?
                .child_mut(b"stbl")
        })
}

/// The kind of track from the handler of its media
fn track_kind(trak: &Atom) -> Result<Option<TrackKind>, ContainerError> {
    let Some(hdlr) = trak.find(&[b"mdia", b"hdlr"]) else {
        return Err(ContainerError::corrupt("track without a handler"));
    };

    let handler = hdlr
        .data()
        .get(8..12)
        .ok_or_else(|| ContainerError::corrupt("truncated handler box"))?;

    Ok(match handler {
        b"vide" => Some(TrackKind::Video),
        b"soun" => Some(TrackKind::Audio),
        _ => None,
    })
}

fn track_id(trak: &Atom) -> Result<u64, ContainerError> {
    let tkhd = trak
        .child(b"tkhd")
        .ok_or_else(|| ContainerError::corrupt("track without a header"))?
        .data();

    let id = match tkhd.first() {
        Some(1) => u32_at(tkhd, 20)?,
        _ => u32_at(tkhd, 12)?,
    };

    Ok(id as u64)
}

/// The size of every sample, which together can never be more than the
/// `file_len` bytes of the file holding them
fn sample_sizes(stbl: &Atom, file_len: u64) -> Result<Vec<u64>, ContainerError> {
    if let Some(stsz) = stbl.child(b"stsz") {
        let data = stsz.data();
        let uniform = u32_at(data, 4)?;
        let count = u32_at(data, 8)? as usize;

        if uniform != 0 {
            if uniform as u64 * count as u64 > file_len {
                return Err(ContainerError::corrupt(format!(
                    "{count} samples of {uniform} bytes do not fit in the file"
                )));
            }
            return Ok(vec![uniform as u64; count]);
        }

        if data.len().saturating_sub(12) / 4 < count {
            return Err(ContainerError::corrupt("truncated stsz box"));
        }

        return (0..count)
            .map(|i| u32_at(data, 12 + i * 4).map(u64::from))
            .collect();
    }

    if let Some(stz2) = stbl.child(b"stz2") {
        let data = stz2.data();
        let field_size = *data
            .get(7)
            .ok_or_else(|| ContainerError::corrupt("truncated stz2 box"))?;
        let count = u32_at(data, 8)? as usize;
        let entries = data.get(12..).unwrap_or_default();

        return (0..count)
            .map(|i| {
                let size = match field_size {
                    4 => entries
                        .get(i / 2)
                        .map(|b| u64::from(if i % 2 == 0 { b >> 4 } else { b & 0x0F })),
                    8 => entries.get(i).map(|b| u64::from(*b)),
                    16 => entries
                        .get(i * 2..i * 2 + 2)
                        .map(|b| u64::from(u16::from_be_bytes([b[0], b[1]]))),
                    _ => None,
                };
                size.ok_or_else(|| ContainerError::corrupt("invalid stz2 box"))
            })
            .collect();
    }

    Err(ContainerError::corrupt("sample table without sample sizes"))
}

fn chunk_offsets(stbl: &Atom) -> Result<Vec<u64>, ContainerError> {
    if let Some(stco) = stbl.child(b"stco") {
        let data = stco.data();
        let count = u32_at(data, 4)? as usize;
        return (0..count)
            .map(|i| u32_at(data, 8 + i * 4).map(u64::from))
            .collect();
    }

    if let Some(co64) = stbl.child(b"co64") {
        let data = co64.data();
        let count = u32_at(data, 4)? as usize;
        return (0..count).map(|i| u64_at(data, 8 + i * 8)).collect();
    }

    Err(ContainerError::corrupt("sample table without chunk offsets"))
}

/// `(first_chunk, samples_per_chunk)` runs
fn sample_to_chunk(stbl: &Atom) -> Result<Vec<(u32, u32)>, ContainerError> {
    let data = stbl
        .child(b"stsc")
        .ok_or_else(|| ContainerError::corrupt("sample table without stsc"))?
        .data();

    let count = u32_at(data, 4)? as usize;
    (0..count)
        .map(|i| {
            let at = 8 + i * 12;
            Ok((u32_at(data, at)?, u32_at(data, at + 4)?))
        })
        .collect()
}

/// Lays out the samples of a track in storage order
pub fn extents(stbl: &Atom, file_len: u64) -> Result<Vec<Extent>, ContainerError> {
    let sizes = sample_sizes(stbl, file_len)?;
    let offsets = chunk_offsets(stbl)?;
    let runs = sample_to_chunk(stbl)?;

    let mut extents = Vec::with_capacity(sizes.len());
    let mut sizes_iter = sizes.iter();

    for (idx, run) in runs.iter().enumerate() {
        let (first_chunk, per_chunk) = *run;
        let next_first = runs
            .get(idx + 1)
            .map_or(offsets.len() as u64 + 1, |r| r.0 as u64);

        if first_chunk == 0 || (first_chunk as u64) > next_first {
            return Err(ContainerError::corrupt("invalid stsc entries"));
        }

        for chunk in first_chunk as u64..next_first {
            let Some(mut offset) = offsets.get(chunk as usize - 1).copied() else {
                return Err(ContainerError::corrupt("stsc refers to a missing chunk"));
            };

            for _ in 0..per_chunk {
                let Some(size) = sizes_iter.next() else {
                    break;
                };
                extents.push(Extent::new(offset, *size));
                offset = offset.saturating_add(*size);
            }
        }
    }

    if extents.len() != sizes.len() {
        return Err(ContainerError::corrupt(format!(
            "sample table describes {} samples but places {}",
            sizes.len(),
            extents.len()
        )));
    }

    Ok(extents)
}

/// The audio and video tracks of a `moov` box in a file of `file_len` bytes
pub fn tracks(moov: &Atom, file_len: u64) -> Result<Vec<EssenceTrack>, ContainerError> {
    let mut tracks = Vec::new();

    for trak in moov.children_of(b"trak") {
        let Some(kind) = track_kind(trak)? else {
            continue;
        };

        let stbl = trak
            .find(&[b"mdia", b"minf", b"stbl"])
            .ok_or_else(|| ContainerError::corrupt("track without a sample table"))?;

        tracks.push(EssenceTrack {
            kind,
            number: track_id(trak)?,
            samples: extents(stbl, file_len)?,
        });
    }

    Ok(tracks)
}

/// Moves every chunk offset at or after `from` by `delta` bytes
pub fn shift_chunk_offsets(moov: &mut Atom, from: u64, delta: i64) -> Result<(), ContainerError> {
    if delta == 0 {
        return Ok(());
    }

    let shift = |offset: u64| -> Result<u64, ContainerError> {
        if offset < from {
            return Ok(offset);
        }
        offset
            .checked_add_signed(delta)
            .ok_or_else(|| ContainerError::corrupt("chunk offset out of range"))
    };

    for stbl in sample_tables_mut(moov) {
        if let Some(data) = stbl.child_mut(b"stco").and_then(Atom::data_mut) {
            let count = u32_at(data, 4)? as usize;
            for i in 0..count {
                let at = 8 + i * 4;
                let moved = shift(u32_at(data, at)? as u64)?;
                let moved = u32::try_from(moved).map_err(|_| {
                    ContainerError::unsupported("chunk offset no longer fits in stco")
                })?;
                data[at..at + 4].copy_from_slice(&moved.to_be_bytes());
            }
        }

        if let Some(data) = stbl.child_mut(b"co64").and_then(Atom::data_mut) {
            let count = u32_at(data, 4)? as usize;
            for i in 0..count {
                let at = 8 + i * 8;
                let moved = shift(u64_at(data, at)?)?;
                data[at..at + 8].copy_from_slice(&moved.to_be_bytes());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_LEN: u64 = 4096;

    fn full(entries: &[u32]) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 0];
        for e in entries {
            out.extend_from_slice(&e.to_be_bytes());
        }
        out
    }

    fn stbl(stsz: &[u32], stsc: &[u32], stco: &[u32]) -> Atom {
        Atom::container(
            b"stbl",
            Vec::new(),
            vec![
                Atom::raw(b"stsz", full(stsz)),
                Atom::raw(b"stsc", full(stsc)),
                Atom::raw(b"stco", full(stco)),
            ],
        )
    }

    #[test]
    fn walks_chunks() {
        // sizes 10, 20, 30, 40; two samples in chunk 1, then one per chunk
        let table = stbl(
            &[0, 4, 10, 20, 30, 40],
            &[2, 1, 2, 1, 2, 1, 1],
            &[3, 100, 500, 900],
        );

        let extents = extents(&table, FILE_LEN).expect("Valid table");
        assert_eq!(
            extents,
            vec![
                Extent::new(100, 10),
                Extent::new(110, 20),
                Extent::new(500, 30),
                Extent::new(900, 40)
            ]
        );
    }

    #[test]
    fn uniform_sizes() {
        let table = stbl(&[8, 3], &[1, 1, 3, 1], &[1, 64]);

        let extents = extents(&table, FILE_LEN).expect("Valid table");
        assert_eq!(
            extents,
            vec![Extent::new(64, 8), Extent::new(72, 8), Extent::new(80, 8)]
        );
    }

    #[test]
    fn detects_missing_samples() {
        let table = stbl(&[8, 5], &[1, 1, 2, 1], &[1, 64]);
        assert!(extents(&table, FILE_LEN).is_err(), "Only 2 of 5 samples are placed");
    }

    #[test]
    fn sample_count_is_bounded_by_the_file() {
        let table = stbl(&[1, u32::MAX], &[1, 1, 1, 1], &[1, 64]);
        let res = extents(&table, 150);
        assert!(
            matches!(res, Err(ContainerError::CorruptMedia(_))),
            "More uniform samples than bytes in the file: {res:?}"
        );

        let table = stbl(&[0, u32::MAX, 8], &[1, 1, 1, 1], &[1, 64]);
        assert!(
            matches!(extents(&table, FILE_LEN), Err(ContainerError::CorruptMedia(_))),
            "More sizes claimed than the stsz box holds"
        );
    }

    #[test]
    fn shifts_offsets_after_point() {
        let table = stbl(&[8, 2], &[1, 1, 1, 1], &[2, 10, 1000]);
        let trak = Atom::container(
            b"trak",
            Vec::new(),
            vec![Atom::container(
                b"mdia",
                Vec::new(),
                vec![Atom::container(b"minf", Vec::new(), vec![table])],
            )],
        );
        let mut moov = Atom::container(b"moov", Vec::new(), vec![trak]);

        shift_chunk_offsets(&mut moov, 500, 24).expect("Can shift");

        let stbl = moov
            .find(&[b"trak", b"mdia", b"minf", b"stbl"])
            .expect("Has sample table");
        assert_eq!(
            chunk_offsets(stbl).expect("Has offsets"),
            vec![10, 1024],
            "Only offsets after the moov box move"
        );
    }
}
