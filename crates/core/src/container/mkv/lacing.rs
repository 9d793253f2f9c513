//! Splitting the payload of a `SimpleBlock` or `Block` into its frames.
//!
//! A block starts with the track number, a 16 bit relative timecode and a
//! flags byte. Bits 1 and 2 of the flags select the lacing, when lacing is
//! used the frame count and sizes follow before the frame data itself.

use std::ops::Range;

use crate::container::ContainerError;

use super::ebml::{parse_signed_vint, parse_vint};

const LACING_MASK: u8 = 0x06;
const LACING_XIPH: u8 = 0x02;
const LACING_FIXED: u8 = 0x04;
const LACING_EBML: u8 = 0x06;

/// The frames held in a single block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFrames {
    pub track: u64,
    /// Where each frame is, relative to the start of the block payload
    pub frames: Vec<Range<usize>>,
}

fn truncated() -> ContainerError {
    ContainerError::corrupt("block is truncated")
}

pub fn parse_block(block: &[u8]) -> Result<BlockFrames, ContainerError> {
    let (track, track_len) = parse_vint(block)?;

    let flags_at = track_len + 2;
    let flags = *block.get(flags_at).ok_or_else(truncated)?;
    let mut pos = flags_at + 1;

    let lacing = flags & LACING_MASK;
    if lacing == 0 {
        return Ok(BlockFrames {
            track,
            frames: vec![pos..block.len()],
        });
    }

    let count = *block.get(pos).ok_or_else(truncated)? as usize + 1;
    pos += 1;

    let mut sizes = Vec::with_capacity(count);
    match lacing {
        LACING_XIPH => {
            for _ in 0..count - 1 {
                let mut size = 0usize;
                loop {
                    let b = *block.get(pos).ok_or_else(truncated)?;
                    pos += 1;
                    size += b as usize;
                    if b != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        // A single laced frame has no coded sizes
        LACING_EBML if count > 1 => {
            let (first, len) = parse_vint(block.get(pos..).ok_or_else(truncated)?)?;
            pos += len;

            let mut size = first as i64;
            sizes.push(first as usize);
            for _ in 1..count - 1 {
                let (diff, len) = parse_signed_vint(block.get(pos..).ok_or_else(truncated)?)?;
                pos += len;

                size += diff;
                if size < 0 {
                    return Err(ContainerError::corrupt("negative laced frame size"));
                }
                sizes.push(size as usize);
            }
        }
        LACING_EBML => {}
        LACING_FIXED => {
            let data = block.len().checked_sub(pos).ok_or_else(truncated)?;
            if data % count != 0 {
                return Err(ContainerError::corrupt(
                    "fixed lacing does not divide the block evenly",
                ));
            }
            sizes.resize(count - 1, data / count);
        }
        _ => unreachable!("lacing is masked to two bits"),
    }

    let mut frames = Vec::with_capacity(count);
    for size in sizes {
        let end = pos.checked_add(size).ok_or_else(truncated)?;
        if end > block.len() {
            return Err(truncated());
        }
        frames.push(pos..end);
        pos = end;
    }
    // The final frame takes whatever is left
    frames.push(pos..block.len());

    Ok(BlockFrames { track, frames })
}
