use thiserror::Error;

use crate::arch::ArchId;
use crate::platform::PlatformId;

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Structural errors raised by the checked [`Snapshot`](crate::Snapshot)
/// mutators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("mapping {start:#x}+{len:#x} overlaps an existing mapping")]
    OverlappingMapping { start: u64, len: u64 },

    #[error("mapping {start:#x}+{len:#x} has zero or overflowing length")]
    BadMappingRange { start: u64, len: u64 },

    #[error("memory bytes {start:#x}+{len:#x} are not contained in any mapping")]
    UnmappedBytes { start: u64, len: u64 },

    #[error("memory bytes at {start:#x} overlap an existing byte record")]
    OverlappingBytes { start: u64 },

    #[error("end-state memory bytes {start:#x}+{len:#x} are not contained in a writable mapping")]
    EndStateBytesNotWritable { start: u64, len: u64 },

    #[error("{what} register block has {found} bytes, architecture requires {expected}")]
    BadRegisterSize {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Errors raised by [`snapify`](crate::snapify). `NoEndStateForPlatform` is an
/// expected, recoverable condition: callers use it to filter snapshots out of
/// a platform's corpus rather than abort generation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapifyError {
    #[error("snapshot {snapshot_id:?} has no end state for platform {platform:?}")]
    NoEndStateForPlatform {
        snapshot_id: String,
        platform: PlatformId,
    },

    #[error(
        "snapshot {snapshot_id:?}: exit sequence at {address:#x} does not fit \
         inside one executable mapping"
    )]
    ExitSequenceOutOfRange { snapshot_id: String, address: u64 },

    #[error("snapshot {snapshot_id:?} is {found:?}, expected {expected:?}")]
    ArchMismatch {
        snapshot_id: String,
        expected: ArchId,
        found: ArchId,
    },

    #[error("snapshot {snapshot_id:?}: {source}")]
    Snapshot {
        snapshot_id: String,
        source: SnapshotError,
    },
}
