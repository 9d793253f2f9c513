//! Builds small but structurally real MP4 and Matroska files, the samples
//! are arbitrary bytes rather than decodable media

use std::{fs, io, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub number: u32,
    pub kind: TrackKind,
    pub samples: Vec<Vec<u8>>,
}

impl Track {
    pub fn new<I, S>(number: u32, kind: TrackKind, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            number,
            kind,
            samples: samples.into_iter().map(|s| s.as_ref().to_vec()).collect(),
        }
    }

    pub fn video<I, S>(number: u32, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::new(number, TrackKind::Video, samples)
    }

    pub fn audio<I, S>(number: u32, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::new(number, TrackKind::Audio, samples)
    }
}

/// A video and an audio track, used when the content does not matter
pub fn sample_tracks() -> Vec<Track> {
    vec![
        Track::video(1, ["frame-one", "frame-two", "frame-three"]),
        Track::audio(2, ["chirp", "tweet"]),
    ]
}

/// Interleaves the samples of every track one at a time, returning the
/// payload and where each sample of each track starts within it
fn interleave(tracks: &[Track]) -> (Vec<u8>, Vec<Vec<u64>>) {
    let mut payload = Vec::new();
    let mut positions = vec![Vec::new(); tracks.len()];

    let longest = tracks.iter().map(|t| t.samples.len()).max().unwrap_or(0);
    for i in 0..longest {
        for (t, track) in tracks.iter().enumerate() {
            if let Some(sample) = track.samples.get(i) {
                positions[t].push(payload.len() as u64);
                payload.extend_from_slice(sample);
            }
        }
    }

    (payload, positions)
}

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn full_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    mp4_box(kind, &[&[0; 4][..], payload].concat())
}

fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

#[derive(Debug, Clone)]
pub struct Mp4Builder {
    tracks: Vec<Track>,
    moov_last: bool,
    co64: bool,
    fragmented: bool,
    udta: Vec<Vec<u8>>,
}

impl Default for Mp4Builder {
    fn default() -> Self {
        Self::new(sample_tracks())
    }
}

impl Mp4Builder {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            moov_last: false,
            co64: false,
            fragmented: false,
            udta: Vec::new(),
        }
    }

    /// Puts `moov` after `mdat`, as most recorders do
    pub fn with_moov_last(mut self) -> Self {
        self.moov_last = true;
        self
    }

    /// Uses 64-bit chunk offsets
    pub fn with_co64(mut self) -> Self {
        self.co64 = true;
        self
    }

    /// Adds an `mvex` box, marking the file as fragmented
    pub fn with_fragments(mut self) -> Self {
        self.fragmented = true;
        self
    }

    /// Adds a raw box to `moov/udta`
    pub fn with_udta_box(mut self, raw: Vec<u8>) -> Self {
        self.udta.push(raw);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ftyp = mp4_box(b"ftyp", &[&b"isom"[..], &[0, 0, 2, 0], b"isomiso2mp41"].concat());

        let (payload, positions) = interleave(&self.tracks);
        let mdat = mp4_box(b"mdat", &payload);

        // Only the values of the offsets depend on where the data ends up
        let moov_len = self.moov(&positions, 0).len() as u64;
        let data_start = ftyp.len() as u64 + if self.moov_last { 0 } else { moov_len } + 8;
        let moov = self.moov(&positions, data_start);

        if self.moov_last {
            [ftyp, mdat, moov].concat()
        } else {
            [ftyp, moov, mdat].concat()
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.build())
    }

    fn moov(&self, positions: &[Vec<u64>], base: u64) -> Vec<u8> {
        let mut children = full_box(b"mvhd", &[0; 96]);

        for (track, offsets) in self.tracks.iter().zip(positions) {
            let offsets: Vec<u64> = offsets.iter().map(|o| o + base).collect();
            children.extend(self.trak(track, &offsets));
        }

        if !self.udta.is_empty() {
            children.extend(mp4_box(b"udta", &self.udta.concat()));
        }

        if self.fragmented {
            children.extend(mp4_box(b"mvex", &[]));
        }

        mp4_box(b"moov", &children)
    }

    fn trak(&self, track: &Track, offsets: &[u64]) -> Vec<u8> {
        // Version 0, the track ID follows the creation and modification times
        let mut tkhd = vec![0; 80];
        tkhd[8..12].copy_from_slice(&track.number.to_be_bytes());

        let handler = match track.kind {
            TrackKind::Video => b"vide",
            TrackKind::Audio => b"soun",
            TrackKind::Subtitle => b"sbtl",
        };
        let hdlr = full_box(b"hdlr", &[&[0; 4][..], handler, &[0; 13]].concat());

        let count = track.samples.len() as u32;
        let stsc = if count == 0 {
            full_box(b"stsc", &u32s(&[0]))
        } else {
            full_box(b"stsc", &u32s(&[1, 1, 1, 1]))
        };

        let sizes: Vec<u32> = track.samples.iter().map(|s| s.len() as u32).collect();
        let stsz = full_box(b"stsz", &[u32s(&[0, count]), u32s(&sizes)].concat());

        let stco = if self.co64 {
            let entries: Vec<u8> = offsets.iter().flat_map(|o| o.to_be_bytes()).collect();
            full_box(b"co64", &[u32s(&[count]), entries].concat())
        } else {
            let entries: Vec<u32> = offsets.iter().map(|o| *o as u32).collect();
            full_box(b"stco", &[u32s(&[count]), u32s(&entries)].concat())
        };

        let stbl = mp4_box(
            b"stbl",
            &[
                full_box(b"stsd", &u32s(&[0])),
                full_box(b"stts", &u32s(&[0])),
                stsc,
                stsz,
                stco,
            ]
            .concat(),
        );
        let minf = mp4_box(b"minf", &stbl);
        let mdia = mp4_box(
            b"mdia",
            &[full_box(b"mdhd", &[0; 20]), hdlr, minf].concat(),
        );

        mp4_box(b"trak", &[full_box(b"tkhd", &tkhd), mdia].concat())
    }
}

pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const SEGMENT: u32 = 0x1853_8067;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const TAGS: u32 = 0x1254_C367;
    pub const TAG: u32 = 0x7373;
    pub const TARGETS: u32 = 0x63C0;
    pub const SIMPLE_TAG: u32 = 0x67C8;
    pub const TAG_NAME: u32 = 0x45A3;
    pub const TAG_STRING: u32 = 0x4487;
}

/// Size field used for elements of an unknown size
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

fn id_bytes(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// An EBML element using an eight byte size
pub fn ebml_element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id_bytes(id);
    let mut size = (payload.len() as u64).to_be_bytes();
    size[0] = 0x01;
    out.extend_from_slice(&size);
    out.extend_from_slice(payload);
    out
}

fn ebml_uint(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    ebml_element(id, &bytes[skip..])
}

/// A `Tags` element holding one `SimpleTag` with a string value
pub fn mkv_tags(name: &str, value: &str) -> Vec<u8> {
    let simple = ebml_element(
        ids::SIMPLE_TAG,
        &[
            ebml_element(ids::TAG_NAME, name.as_bytes()),
            ebml_element(ids::TAG_STRING, value.as_bytes()),
        ]
        .concat(),
    );
    let tag = ebml_element(ids::TAG, &[ebml_element(ids::TARGETS, &[]), simple].concat());

    ebml_element(ids::TAGS, &tag)
}

/// How frames are packed into blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocks {
    /// One `SimpleBlock` per frame
    Simple,
    /// One `Block` in a `BlockGroup` per frame
    Grouped,
    /// Every frame of a track in one Xiph laced `SimpleBlock`
    Laced,
}

#[derive(Debug, Clone)]
pub struct MkvBuilder {
    tracks: Vec<Track>,
    doc_type: String,
    blocks: Blocks,
    unknown_sizes: bool,
    before_clusters: Vec<Vec<u8>>,
}

impl Default for MkvBuilder {
    fn default() -> Self {
        Self::new(sample_tracks())
    }
}

impl MkvBuilder {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            doc_type: "matroska".to_string(),
            blocks: Blocks::Simple,
            unknown_sizes: false,
            before_clusters: Vec::new(),
        }
    }

    pub fn with_doc_type<S: Into<String>>(mut self, doc_type: S) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    pub fn with_blocks(mut self, blocks: Blocks) -> Self {
        self.blocks = blocks;
        self
    }

    /// Writes the segment and cluster with unknown sizes, as live encoders do
    pub fn with_unknown_sizes(mut self) -> Self {
        self.unknown_sizes = true;
        self
    }

    /// Adds a raw element to the segment before the cluster
    pub fn with_element(mut self, raw: Vec<u8>) -> Self {
        self.before_clusters.push(raw);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let header = ebml_element(ids::EBML, &ebml_element(ids::DOC_TYPE, self.doc_type.as_bytes()));

        let info = ebml_element(ids::INFO, &ebml_uint(ids::TIMECODE_SCALE, 1_000_000));
        let entries: Vec<u8> = self
            .tracks
            .iter()
            .flat_map(|t| {
                let kind = match t.kind {
                    TrackKind::Video => 1,
                    TrackKind::Audio => 2,
                    TrackKind::Subtitle => 17,
                };
                ebml_element(
                    ids::TRACK_ENTRY,
                    &[
                        ebml_uint(ids::TRACK_NUMBER, t.number.into()),
                        ebml_uint(ids::TRACK_TYPE, kind),
                    ]
                    .concat(),
                )
            })
            .collect();
        let tracks = ebml_element(ids::TRACKS, &entries);

        let cluster_payload = [ebml_uint(ids::TIMECODE, 0), self.blocks()].concat();
        let cluster = if self.unknown_sizes {
            [id_bytes(ids::CLUSTER), UNKNOWN_SIZE.to_vec(), cluster_payload].concat()
        } else {
            ebml_element(ids::CLUSTER, &cluster_payload)
        };

        let segment_payload = [info, tracks, self.before_clusters.concat(), cluster].concat();
        let segment = if self.unknown_sizes {
            [id_bytes(ids::SEGMENT), UNKNOWN_SIZE.to_vec(), segment_payload].concat()
        } else {
            ebml_element(ids::SEGMENT, &segment_payload)
        };

        [header, segment].concat()
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.build())
    }

    fn blocks(&self) -> Vec<u8> {
        let block_header = |track: u32, flags: u8| vec![0x80 | track as u8, 0, 0, flags];

        match self.blocks {
            Blocks::Laced => self
                .tracks
                .iter()
                .filter(|t| !t.samples.is_empty())
                .flat_map(|t| {
                    let mut block = block_header(t.number, 0x82);
                    block.push((t.samples.len() - 1) as u8);
                    for sample in &t.samples[..t.samples.len() - 1] {
                        let mut len = sample.len();
                        while len >= 255 {
                            block.push(255);
                            len -= 255;
                        }
                        block.push(len as u8);
                    }
                    block.extend(t.samples.concat());
                    ebml_element(ids::SIMPLE_BLOCK, &block)
                })
                .collect(),
            Blocks::Simple | Blocks::Grouped => {
                let mut out = Vec::new();
                let longest = self.tracks.iter().map(|t| t.samples.len()).max().unwrap_or(0);

                for i in 0..longest {
                    for track in &self.tracks {
                        let Some(sample) = track.samples.get(i) else { continue };

                        if self.blocks == Blocks::Simple {
                            let block = [block_header(track.number, 0x80), sample.clone()].concat();
                            out.extend(ebml_element(ids::SIMPLE_BLOCK, &block));
                        } else {
                            let block = [block_header(track.number, 0), sample.clone()].concat();
                            out.extend(ebml_element(
                                ids::BLOCK_GROUP,
                                &ebml_element(ids::BLOCK, &block),
                            ));
                        }
                    }
                }

                out
            }
        }
    }
}

/// Finds where `needle` first appears in a file
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Flips the lowest bit of the first occurrence of `needle` in the file
pub fn flip_bit_in<P: AsRef<Path>>(path: P, needle: &[u8]) -> io::Result<()> {
    let mut data = fs::read(&path)?;
    let pos = find(&data, needle)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "needle not in file"))?;
    data[pos] ^= 1;
    fs::write(path, data)
}
