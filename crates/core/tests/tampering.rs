mod utils;

use std::path::PathBuf;

use avcf::{
    container::adapter_for,
    verify::VerificationStatus,
};
use testlibs::{
    keys::{ALICE, MALLORY},
    media::{MkvBuilder, Mp4Builder, Track, flip_bit_in},
};
use utils::{TestResult, Workspace, corrupt_signature, embedded, renamed, rewrite_block, sign};

/// A signed MP4 and a signed Matroska file of the sample tracks
fn signed_files(ws: &Workspace) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut out = Vec::new();

    for (name, bytes) in [
        ("clip.mp4", Mp4Builder::default().build()),
        ("clip.mkv", MkvBuilder::default().build()),
    ] {
        let input = ws.write(name, &bytes)?;
        let output = ws.path(format!("signed.{name}"));
        sign(&input, &output, &ALICE, &embedded())?;
        out.push(output);
    }

    Ok(out)
}

#[test]
fn flipped_essence_byte() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        flip_bit_in(&path, b"frame-two")?;

        let result = avcf::verify_video(&path);
        assert_eq!(result.status, VerificationStatus::Tampered, "{result}");
        assert!(result.metadata.is_some(), "The claimed signer is still reported");
    }

    Ok(())
}

#[test]
fn flipped_audio_byte() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        flip_bit_in(&path, b"tweet")?;
        assert_eq!(
            avcf::verify_video(&path).status,
            VerificationStatus::Tampered
        );
    }

    Ok(())
}

#[test]
fn flipped_signature_byte() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let tampered = renamed(&path, "bad-sig");
        rewrite_block(&path, &tampered, |b| {
            b.signature = corrupt_signature(&b.signature)
        })?;

        let result = avcf::verify_video(&tampered);
        assert_eq!(result.status, VerificationStatus::Invalid, "{result}");
    }

    Ok(())
}

#[test]
fn edited_metadata() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let tampered = renamed(&path, "edited");
        rewrite_block(&path, &tampered, |b| {
            b.metadata.author_name = "Mallory".to_string()
        })?;

        let result = avcf::verify_video(&tampered);
        assert_eq!(result.status, VerificationStatus::Invalid, "{result}");
    }

    Ok(())
}

#[test]
fn swapped_embedded_key() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let tampered = renamed(&path, "swapped");
        rewrite_block(&path, &tampered, |b| {
            b.metadata.embedded_pubkey = Some(MALLORY.public.to_string())
        })?;

        let result = avcf::verify_video(&tampered);
        assert_eq!(
            result.status,
            VerificationStatus::Invalid,
            "A key which contradicts the declared fingerprint is rejected: {result}"
        );
    }

    Ok(())
}

#[test]
fn removed_block() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let stripped = renamed(&path, "stripped");
        adapter_for(&path)?.remove_block(&path, &stripped)?;

        let result = avcf::verify_video(&stripped);
        assert_eq!(result.status, VerificationStatus::Missing, "{result}");
        assert!(result.metadata.is_none());
    }

    Ok(())
}

#[test]
fn garbage_block() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let broken = renamed(&path, "broken");
        adapter_for(&path)?.write_block(&path, &broken, b"{\"metadata\": 12")?;

        assert_eq!(
            avcf::verify_video(&broken).status,
            VerificationStatus::Malformed
        );
    }

    Ok(())
}

#[test]
fn unarmored_signature() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let broken = renamed(&path, "raw-sig");
        rewrite_block(&path, &broken, |b| b.signature = "c2lnbmF0dXJl".to_string())?;

        assert_eq!(
            avcf::verify_video(&broken).status,
            VerificationStatus::Malformed
        );
    }

    Ok(())
}

#[test]
fn reencoded_video() -> TestResult {
    let ws = Workspace::new()?;
    let tracks = vec![
        Track::video(1, ["frame-one", "frame-two", "frame-three"]),
        Track::audio(2, ["chirp", "tweet"]),
    ];
    let reencoded = vec![
        Track::video(1, ["frame-1", "frame-2", "frame-3", "frame-4"]),
        Track::audio(2, ["chirp", "tweet"]),
    ];

    let input = ws.write("clip.mp4", &Mp4Builder::new(tracks).build())?;
    let signed = ws.path("signed.mp4");
    sign(&input, &signed, &ALICE, &embedded())?;

    // Carry the old block over to the new encode without signing again
    let other = ws.write("reencoded.mp4", &Mp4Builder::new(reencoded).build())?;
    let block = adapter_for(&signed)?
        .read_block(&signed)?
        .ok_or("signed file has a block")?;
    let tampered = ws.path("tampered.mp4");
    adapter_for(&other)?.write_block(&other, &tampered, &block)?;

    let result = avcf::verify_video(&tampered);
    assert_eq!(result.status, VerificationStatus::Tampered, "{result}");
    Ok(())
}

#[test]
fn tampered_is_reported_before_signature() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let tampered = renamed(&path, "both");
        rewrite_block(&path, &tampered, |b| {
            b.signature = corrupt_signature(&b.signature)
        })?;
        flip_bit_in(&tampered, b"frame-one")?;

        assert_eq!(
            avcf::verify_video(&tampered).status,
            VerificationStatus::Tampered
        );
    }

    Ok(())
}

#[test]
fn other_tags_do_not_matter() -> TestResult {
    let ws = Workspace::new()?;

    for path in signed_files(&ws)? {
        let retagged = renamed(&path, "retagged");
        adapter_for(&path)?.write_tag(&path, &retagged, "title", b"Holiday footage")?;

        let result = avcf::verify_video(&retagged);
        assert_eq!(
            result.status,
            VerificationStatus::Valid,
            "Container metadata edits leave the block valid: {result}"
        );
        assert_eq!(
            adapter_for(&retagged)?.read_tag(&retagged, "title")?,
            Some(b"Holiday footage".to_vec())
        );
    }

    Ok(())
}
