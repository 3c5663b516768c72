use thiserror::Error;

use cinder_snapshot::ArchId;

pub type Result<T> = std::result::Result<T, GenError>;

/// Corpus-generation errors. These are call-site mistakes (duplicate or
/// unknown names, wrong architecture), not data errors: normalization has
/// already validated the snapshots themselves.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("snap {0:?} was already generated")]
    DuplicateSnapName(String),

    #[error("unknown snap name {0:?}")]
    UnknownSnapName(String),

    #[error("snapshot {id:?} is {found:?}, builder targets {expected:?}")]
    ArchMismatch {
        id: String,
        expected: ArchId,
        found: ArchId,
    },
}
