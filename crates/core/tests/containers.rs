mod utils;

use std::fs;

use avcf::{
    container::{ContainerError, ContainerFormat, adapter_for},
    essence,
    spec::{ESSENCE_STREAM_MAGIC, VideoHash},
    verify::VerificationStatus,
};
use sha2::{Digest, Sha256};
use testlibs::{
    keys::ALICE,
    media::{
        Blocks, MkvBuilder, Mp4Builder, Track, TrackKind, find, mkv_tags, mp4_box, sample_tracks,
    },
};
use utils::{TestResult, Workspace, embedded, sign};

/// The framed essence stream of the given tracks, worked out by hand
fn expected_hash(tracks: &[Track]) -> VideoHash {
    let mut ordered: Vec<&Track> = tracks
        .iter()
        .filter(|t| t.kind != TrackKind::Subtitle)
        .collect();
    ordered.sort_by_key(|t| (t.kind == TrackKind::Audio, t.number));

    let mut stream = ESSENCE_STREAM_MAGIC.to_vec();
    for track in ordered {
        stream.push(if track.kind == TrackKind::Video { b'V' } else { b'A' });
        stream.extend((track.samples.len() as u64).to_be_bytes());
        for sample in &track.samples {
            stream.extend((sample.len() as u64).to_be_bytes());
            stream.extend(sample);
        }
    }

    VideoHash::new(Sha256::digest(&stream).into())
}

fn hash_of(path: &std::path::Path) -> Result<VideoHash, Box<dyn std::error::Error>> {
    Ok(essence::hash(adapter_for(path)?.essence_stream(path)?)?)
}

#[test]
fn essence_hash_matches_framing() -> TestResult {
    let ws = Workspace::new()?;
    let tracks = sample_tracks();

    let mp4 = ws.write("clip.mp4", &Mp4Builder::new(tracks.clone()).build())?;
    let mkv = ws.write("clip.mkv", &MkvBuilder::new(tracks.clone()).build())?;

    assert_eq!(hash_of(&mp4)?, expected_hash(&tracks));
    assert_eq!(
        hash_of(&mkv)?,
        expected_hash(&tracks),
        "The same essence hashes the same in every container"
    );

    Ok(())
}

#[test]
fn track_order_and_ids() -> TestResult {
    let ws = Workspace::new()?;
    let tracks = vec![
        Track::audio(1, ["a1", "a2"]),
        Track::video(7, ["v7"]),
        Track::video(3, ["v3-1", "v3-2"]),
        Track::new(4, TrackKind::Subtitle, ["hello there"]),
    ];

    for (name, bytes) in [
        ("clip.mp4", Mp4Builder::new(tracks.clone()).build()),
        ("clip.mkv", MkvBuilder::new(tracks.clone()).build()),
    ] {
        let path = ws.write(name, &bytes)?;
        assert_eq!(
            hash_of(&path)?,
            expected_hash(&tracks),
            "{name}: video tracks by number, then audio, no subtitles"
        );
    }

    Ok(())
}

#[test]
fn mp4_layouts() -> TestResult {
    let builders = [
        ("moov first", Mp4Builder::default()),
        ("moov last", Mp4Builder::default().with_moov_last()),
        ("co64", Mp4Builder::default().with_co64()),
        (
            "existing udta",
            Mp4Builder::default().with_udta_box(mp4_box(b"\xA9nam", b"title")),
        ),
    ];

    for (layout, builder) in builders {
        let ws = Workspace::new()?;
        let input = ws.write("clip.mp4", &builder.build())?;
        let output = ws.path("signed.mp4");

        let before = hash_of(&input)?;
        sign(&input, &output, &ALICE, &embedded())?;

        assert_eq!(
            hash_of(&output)?,
            before,
            "{layout}: chunk offsets follow the samples"
        );
        let result = avcf::verify_video(&output);
        assert_eq!(result.status, VerificationStatus::Valid, "{layout}: {result}");
    }

    Ok(())
}

#[test]
fn matroska_layouts() -> TestResult {
    let builders = [
        ("simple blocks", MkvBuilder::default()),
        ("block groups", MkvBuilder::default().with_blocks(Blocks::Grouped)),
        ("laced", MkvBuilder::default().with_blocks(Blocks::Laced)),
        ("unknown sizes", MkvBuilder::default().with_unknown_sizes()),
        ("webm", MkvBuilder::default().with_doc_type("webm")),
        (
            "existing tags",
            MkvBuilder::default().with_element(mkv_tags("TITLE", "Holiday")),
        ),
    ];

    for (layout, builder) in builders {
        let ws = Workspace::new()?;
        let input = ws.write("clip.mkv", &builder.build())?;
        let output = ws.path("signed.mkv");

        assert_eq!(hash_of(&input)?, expected_hash(&sample_tracks()), "{layout}");
        sign(&input, &output, &ALICE, &embedded())?;

        assert_eq!(hash_of(&output)?, expected_hash(&sample_tracks()), "{layout}");
        let result = avcf::verify_video(&output);
        assert_eq!(result.status, VerificationStatus::Valid, "{layout}: {result}");

        assert_eq!(
            adapter_for(&output)?.read_tag(&output, "TITLE")?.is_some(),
            layout == "existing tags",
            "{layout}: other tags are kept"
        );
    }

    Ok(())
}

#[test]
fn detection_ignores_extension() -> TestResult {
    let ws = Workspace::new()?;

    let mkv_named_mp4 = ws.write("clip.mp4", &MkvBuilder::default().build())?;
    assert_eq!(ContainerFormat::detect(&mkv_named_mp4)?, ContainerFormat::Matroska);

    let mp4_named_mkv = ws.write("clip.mkv", &Mp4Builder::default().build())?;
    assert_eq!(ContainerFormat::detect(&mp4_named_mkv)?, ContainerFormat::Mp4);

    Ok(())
}

#[test]
fn unsupported_files() -> TestResult {
    let ws = Workspace::new()?;

    let text = ws.write("clip.mp4", b"definitely not a video file at all")?;
    assert!(matches!(
        ContainerFormat::detect(&text),
        Err(ContainerError::UnsupportedContainer(_))
    ));

    let other_ebml = ws.write("doc.mkv", &MkvBuilder::default().with_doc_type("dvb").build())?;
    assert!(matches!(
        ContainerFormat::detect(&other_ebml),
        Err(ContainerError::UnsupportedContainer(_))
    ));

    let fragmented = ws.write("frag.mp4", &Mp4Builder::default().with_fragments().build())?;
    assert!(matches!(
        sign(&fragmented, &ws.path("out.mp4"), &ALICE, &embedded()),
        Err(avcf::sign::SignError::Container(ContainerError::UnsupportedContainer(_)))
    ));
    assert!(!ws.path("out.mp4").exists());

    Ok(())
}

#[test]
fn no_essence_is_corrupt() -> TestResult {
    let ws = Workspace::new()?;
    let subtitles_only = vec![Track::new(1, TrackKind::Subtitle, ["words"])];

    for (name, bytes) in [
        ("subs.mp4", Mp4Builder::new(subtitles_only.clone()).build()),
        ("subs.mkv", MkvBuilder::new(subtitles_only.clone()).build()),
    ] {
        let path = ws.write(name, &bytes)?;
        assert!(
            matches!(
                adapter_for(&path)?.essence_stream(&path),
                Err(ContainerError::CorruptMedia(_))
            ),
            "{name} has nothing to hash"
        );
    }

    Ok(())
}

#[test]
fn truncated_file() -> TestResult {
    let ws = Workspace::new()?;

    for name in ["clip.mp4", "clip.mkv"] {
        let input = ws.write(
            name,
            &if name.ends_with("mp4") {
                Mp4Builder::default().with_moov_last().build()
            } else {
                MkvBuilder::default().build()
            },
        )?;
        let signed = ws.path(format!("signed.{name}"));
        sign(&input, &signed, &ALICE, &embedded())?;

        // The block is at the end of both files
        let bytes = fs::read(&signed)?;
        fs::write(&signed, &bytes[..bytes.len() - 20])?;

        let result = avcf::verify_video(&signed);
        assert_eq!(result.status, VerificationStatus::Malformed, "{name}: {result}");
    }

    Ok(())
}

/// Changes the first `stsz` box to claim `count` samples of `uniform` bytes
fn claim_samples(bytes: &mut [u8], uniform: u32, count: u32) -> Result<(), Box<dyn std::error::Error>> {
    let at = find(bytes, b"stsz").ok_or("file has a stsz box")? + 8;
    bytes[at..at + 4].copy_from_slice(&uniform.to_be_bytes());
    bytes[at + 4..at + 8].copy_from_slice(&count.to_be_bytes());
    Ok(())
}

#[test]
fn hostile_mp4_boxes() -> TestResult {
    let ws = Workspace::new()?;
    let ftyp = mp4_box(b"ftyp", b"isom\0\0\0\0isom");

    let mut huge_box = ftyp.clone();
    huge_box.extend(1u32.to_be_bytes());
    huge_box.extend(b"free");
    huge_box.extend(u64::MAX.to_be_bytes());

    // Each `udta` is the only child of the one before it
    let depth = 200_000;
    let mut nested = Vec::with_capacity(depth * 8);
    for level in 0..depth {
        nested.extend((((depth - level) * 8) as u32).to_be_bytes());
        nested.extend(b"udta");
    }
    let deep_boxes = [ftyp, mp4_box(b"moov", &nested)].concat();

    for (name, bytes) in [("huge.mp4", huge_box), ("deep.mp4", deep_boxes)] {
        let path = ws.write(name, &bytes)?;

        let result = avcf::verify_video(&path);
        assert_eq!(result.status, VerificationStatus::Malformed, "{name}: {result}");
        assert!(
            sign(&path, &ws.path(format!("signed.{name}")), &ALICE, &embedded()).is_err(),
            "{name} cannot be signed"
        );
    }

    Ok(())
}

#[test]
fn impossible_sample_count() -> TestResult {
    let ws = Workspace::new()?;
    let input = ws.write("clip.mp4", &Mp4Builder::default().build())?;
    let signed = ws.path("signed.mp4");
    sign(&input, &signed, &ALICE, &embedded())?;

    let mut bytes = fs::read(&signed)?;
    claim_samples(&mut bytes, 1, u32::MAX)?;
    fs::write(&signed, &bytes)?;

    let result = avcf::verify_video(&signed);
    assert_eq!(result.status, VerificationStatus::Malformed, "{result}");
    assert!(result.metadata.is_some(), "The block itself is still readable");

    let res = sign(&signed, &ws.path("again.mp4"), &ALICE, &embedded());
    assert!(
        matches!(res, Err(avcf::sign::SignError::Container(ContainerError::CorruptMedia(_)))),
        "{res:?}"
    );

    Ok(())
}
