//! On-disk/in-memory corpus record layout.
//!
//! All records are `#[repr(C)]`, little-endian, with every field 8-byte
//! aligned and no implicit padding, so the serializer can emit them with
//! [`bytemuck::bytes_of`] and the relocated reader can cast them back out of
//! the blob. Every internal reference is a [`RawRef`]: a blob-relative byte
//! offset at generation time, rewritten in place to an absolute address by
//! the relocation pass.

use core::marker::PhantomData;

use bytemuck::{Pod, Zeroable};

pub const CORPUS_MAGIC: &[u8; 8] = b"CINDCORP";
pub const CORPUS_VERSION: u32 = 1;

/// Minimum alignment of literal byte arrays in the arena. Copying and
/// comparing are less efficient with narrower alignments.
pub const LITERAL_ALIGN: usize = 8;

/// `RawMemoryBytes::kind` values.
pub const MEMORY_BYTES_LITERAL: u32 = 0;
pub const MEMORY_BYTES_REPEATING: u32 = 1;

/// An address-independent reference to a `T` inside the corpus blob.
///
/// Holds a byte offset relative to the blob base until relocation, and an
/// absolute address afterwards. 0 is the null/empty sentinel: offset 0 is
/// the corpus header, which no reference may target.
#[repr(transparent)]
pub struct RawRef<T: 'static> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> RawRef<T> {
    pub const NULL: RawRef<T> = RawRef {
        raw: 0,
        _marker: PhantomData,
    };

    pub fn from_offset(offset: u64) -> RawRef<T> {
        RawRef {
            raw: offset,
            _marker: PhantomData,
        }
    }

    /// The raw field value: an offset before relocation, an absolute
    /// address after.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw == 0
    }
}

impl<T: 'static> Clone for RawRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for RawRef<T> {}

impl<T: 'static> core::fmt::Debug for RawRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RawRef({:#x})", self.raw)
    }
}

// SAFETY: RawRef is a transparent wrapper around u64; PhantomData is a ZST.
unsafe impl<T: 'static> Zeroable for RawRef<T> {}
// SAFETY: no padding, any bit pattern is a valid (if dangling) reference
// value; dereferencing is gated behind the relocation pass.
unsafe impl<T: 'static> Pod for RawRef<T> {}

/// A counted array of `T` in the arena.
#[repr(C)]
pub struct RawArray<T: 'static> {
    pub items: RawRef<T>,
    pub count: u64,
}

impl<T: 'static> RawArray<T> {
    pub const EMPTY: RawArray<T> = RawArray {
        items: RawRef::NULL,
        count: 0,
    };

    pub fn new(items_offset: u64, count: u64) -> RawArray<T> {
        RawArray {
            items: RawRef::from_offset(items_offset),
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<T: 'static> Clone for RawArray<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for RawArray<T> {}

impl<T: 'static> core::fmt::Debug for RawArray<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RawArray({:#x}, {})", self.items.raw(), self.count)
    }
}

// SAFETY: two u64-sized Pod fields, repr(C), no padding.
unsafe impl<T: 'static> Zeroable for RawArray<T> {}
// SAFETY: see Zeroable; element validity is the relocation pass's problem.
unsafe impl<T: 'static> Pod for RawArray<T> {}

/// Blob header at offset 0.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct CorpusHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub arch: u32,
    /// Whole-blob length in bytes; validated against the loaded buffer.
    pub total_len: u64,
    /// Top-level snap references; array order is corpus iteration order.
    pub snaps: RawArray<RawRef<RawSnap>>,
}

/// One compiled snapshot.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RawSnap {
    /// UTF-8 identifier bytes.
    pub id: RawArray<u8>,
    pub registers: RawRef<RawRegisters>,
    pub memory_mappings: RawArray<RawMemoryMapping>,
    pub end_state: RawEndState,
}

/// The single expected end state of a snap, stored inline in [`RawSnap`].
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RawEndState {
    pub instruction_address: u64,
    pub registers: RawRef<RawRegisters>,
    /// Writable mappings with their full expected contents.
    pub memory_mappings: RawArray<RawMemoryMapping>,
}

/// Opaque architecture-sized register blocks.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RawRegisters {
    pub gregs: RawArray<u8>,
    pub fpregs: RawArray<u8>,
}

/// One memory mapping and its encoded contents.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RawMemoryMapping {
    pub start_address: u64,
    pub num_bytes: u64,
    /// `MemoryPerms` bits.
    pub perms: u32,
    pub _reserved: u32,
    pub memory_bytes: RawArray<RawMemoryBytes>,
}

/// One encoded run of mapping content: either a literal byte array in the
/// arena or a run-length-encoded repeated byte.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RawMemoryBytes {
    pub start_address: u64,
    /// Guest bytes covered by this record. For a direct-mmap literal the
    /// backing array may be longer (page padding); this is the real size.
    pub num_bytes: u64,
    /// [`MEMORY_BYTES_LITERAL`] or [`MEMORY_BYTES_REPEATING`].
    pub kind: u32,
    /// The repeated value for repeating records.
    pub byte_value: u8,
    pub _reserved: [u8; 3],
    /// Backing bytes for literal records; empty for repeating records.
    pub byte_values: RawArray<u8>,
}

impl RawMemoryBytes {
    pub fn is_repeating(&self) -> bool {
        self.kind == MEMORY_BYTES_REPEATING
    }
}
