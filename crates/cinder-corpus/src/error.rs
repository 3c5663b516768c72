use std::io;

use thiserror::Error;

use cinder_snapshot::ArchId;

/// Relocation failures. All of these are terminal for the blob: a corpus
/// with even one bad reference cannot be trusted for any snap.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RelocateError {
    #[error("corpus blob too short")]
    TruncatedBlob,

    #[error("bad corpus magic")]
    BadMagic,

    #[error("unsupported corpus version {0}")]
    IncompatibleVersion(u32),

    #[error("corpus architecture tag {found} does not match expected {expected:?}")]
    IncompatibleArch { expected: ArchId, found: u32 },

    #[error("header length {header} does not match blob length {actual}")]
    LengthMismatch { header: u64, actual: u64 },

    #[error("reference offset {offset:#x} is out of bounds")]
    OutOfBoundsOffset { offset: u64 },

    #[error("reference offset {offset:#x} is misaligned")]
    MisalignedOffset { offset: u64 },
}

/// Corpus-loading failures. A missing or unreadable file is expected
/// (reported as `Io`); a blob that fails relocation is corruption.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error(transparent)]
    Relocate(#[from] RelocateError),
}
