//! A well-formed blob with one bad reference must be rejected whole.

mod common;

use std::mem::offset_of;

use cinder_corpus::format::CorpusHeader;
use cinder_corpus::{relocate_corpus, CorpusBuffer, RelocateError};
use cinder_gen::generate_relocatable_corpus;
use cinder_snapshot::{ArchId, SnapifyOptions, X86_64};

use common::snapified;

fn valid_blob() -> Vec<u8> {
    let opts = SnapifyOptions::for_running(ArchId::X86_64);
    let normalized = snapified(&opts);
    generate_relocatable_corpus::<X86_64>(std::slice::from_ref(&normalized), &opts).unwrap()
}

fn patch_u64(blob: &mut [u8], offset: usize, value: u64) {
    blob[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn the_unpatched_blob_relocates() {
    let corpus = relocate_corpus::<X86_64>(CorpusBuffer::from_bytes(&valid_blob()).unwrap());
    assert_eq!(corpus.unwrap().snap_count(), 1);
}

#[test]
fn out_of_bounds_reference_is_rejected() {
    let mut blob = valid_blob();
    // Point the top-level snap array past the end of the blob, keeping the
    // offset 8-aligned so the bounds check is what fires.
    let bad = (blob.len() as u64).next_multiple_of(8) + 8;
    patch_u64(&mut blob, offset_of!(CorpusHeader, snaps), bad);

    let err = relocate_corpus::<X86_64>(CorpusBuffer::from_bytes(&blob).unwrap()).unwrap_err();
    assert_eq!(err, RelocateError::OutOfBoundsOffset { offset: bad });
}

#[test]
fn misaligned_reference_is_rejected() {
    let mut blob = valid_blob();
    patch_u64(&mut blob, offset_of!(CorpusHeader, snaps), 41);

    let err = relocate_corpus::<X86_64>(CorpusBuffer::from_bytes(&blob).unwrap()).unwrap_err();
    assert_eq!(err, RelocateError::MisalignedOffset { offset: 41 });
}

#[test]
fn truncated_blob_is_rejected() {
    let blob = valid_blob();
    // Chop the tail off but leave the header intact; the header length
    // check catches the mismatch before any reference walk.
    let truncated = &blob[..blob.len() - 64];
    let err =
        relocate_corpus::<X86_64>(CorpusBuffer::from_bytes(truncated).unwrap()).unwrap_err();
    assert!(matches!(err, RelocateError::LengthMismatch { .. }));
}
