//! In-memory CPU-execution snapshots and their normalization.
//!
//! A [`Snapshot`] captures one tiny CPU execution: initial memory mappings
//! and contents, register state, and one or more candidate expected end
//! states. [`snapify`] converts an arbitrary snapshot into the canonical
//! [`NormalizedSnapshot`] shape the binary corpus format requires; the
//! corpus serializer in `cinder-gen` accepts only normalized snapshots.

mod arch;
mod error;
mod perms;
mod platform;
mod snapify;
mod types;

pub use crate::arch::{AArch64, Arch, ArchId, EXIT_TRAMPOLINE_ADDRESS, X86_64};
pub use crate::error::{Result, SnapifyError, SnapshotError};
pub use crate::perms::MemoryPerms;
pub use crate::platform::PlatformId;
pub use crate::snapify::{can_snapify, snapify, NormalizedSnapshot, SnapifyOptions};
pub use crate::types::{EndState, MemoryBytes, MemoryMapping, RegisterState, Snapshot};
