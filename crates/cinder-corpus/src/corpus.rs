//! Read-only views over a relocated corpus.

use std::borrow::Cow;
use std::marker::PhantomData;

use cinder_snapshot::{
    Arch, EndState, MemoryBytes, MemoryMapping, MemoryPerms, PlatformId, RegisterState, Snapshot,
    SnapshotError,
};

use crate::buffer::CorpusBuffer;
use crate::format::{
    CorpusHeader, RawArray, RawMemoryBytes, RawMemoryMapping, RawRef, RawRegisters, RawSnap,
};
use crate::relocate::HEADER_SIZE;

/// A relocated, immutable corpus.
///
/// Owns the underlying buffer; every reference inside it is an absolute
/// address pointing back into the same allocation, so views borrow from
/// `&self`. There is no mutation path: concurrent reads from any number of
/// threads are safe.
#[derive(Debug)]
pub struct Corpus<A: Arch> {
    buf: CorpusBuffer,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> Corpus<A> {
    /// Wrap a buffer the relocation pass has fully validated and rewritten.
    ///
    /// # Safety
    ///
    /// Every reference field in `buf` must hold an absolute address of a
    /// properly aligned, in-bounds range of `buf` itself.
    pub(crate) unsafe fn from_relocated(buf: CorpusBuffer) -> Corpus<A> {
        Corpus {
            buf,
            _arch: PhantomData,
        }
    }

    fn header(&self) -> &CorpusHeader {
        bytemuck::from_bytes(&self.buf.as_slice()[..HEADER_SIZE])
    }

    /// Total blob size in bytes.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    pub fn snap_count(&self) -> usize {
        self.header().snaps.count as usize
    }

    pub fn snap(&self, index: usize) -> Option<SnapView<'_, A>> {
        // SAFETY: relocated arrays are valid for their full count.
        let refs: &[RawRef<RawSnap>] = unsafe { slice_from_array(&self.header().snaps) };
        let snap_ref = refs.get(index)?;
        // SAFETY: relocated snap references target valid RawSnap records.
        Some(SnapView {
            raw: unsafe { deref(snap_ref) },
            _arch: PhantomData,
        })
    }

    /// Snaps in corpus order.
    pub fn snaps(&self) -> impl Iterator<Item = SnapView<'_, A>> + '_ {
        (0..self.snap_count()).filter_map(move |i| self.snap(i))
    }

    /// Give the corpus a process lifetime. Runners that execute a fixed unit
    /// of work and exit never release the corpus; process exit reclaims it.
    pub fn leak(self) -> &'static Corpus<A> {
        Box::leak(Box::new(self))
    }
}

/// View of one compiled snap.
pub struct SnapView<'c, A: Arch> {
    raw: &'c RawSnap,
    _arch: PhantomData<fn() -> A>,
}

impl<'c, A: Arch> SnapView<'c, A> {
    pub fn id(&self) -> Cow<'c, str> {
        // SAFETY: relocated array.
        String::from_utf8_lossy(unsafe { slice_from_array(&self.raw.id) })
    }

    pub fn registers(&self) -> RegistersView<'c> {
        // SAFETY: relocated register reference.
        RegistersView {
            raw: unsafe { deref(&self.raw.registers) },
        }
    }

    pub fn memory_mappings(&self) -> impl Iterator<Item = MappingView<'c>> {
        // SAFETY: relocated array.
        let raw: &[RawMemoryMapping] = unsafe { slice_from_array(&self.raw.memory_mappings) };
        raw.iter().map(|raw| MappingView { raw })
    }

    pub fn end_state_instruction_address(&self) -> u64 {
        self.raw.end_state.instruction_address
    }

    pub fn end_state_registers(&self) -> RegistersView<'c> {
        // SAFETY: relocated register reference.
        RegistersView {
            raw: unsafe { deref(&self.raw.end_state.registers) },
        }
    }

    pub fn end_state_memory_mappings(&self) -> impl Iterator<Item = MappingView<'c>> {
        // SAFETY: relocated array.
        let raw: &[RawMemoryMapping] =
            unsafe { slice_from_array(&self.raw.end_state.memory_mappings) };
        raw.iter().map(|raw| MappingView { raw })
    }

    /// Convert back to the in-memory snapshot shape. The blob does not store
    /// the end state's platform key, so the caller supplies it (normally the
    /// platform the corpus was generated for).
    pub fn to_snapshot(&self, platform: PlatformId) -> Result<Snapshot, SnapshotError> {
        let mut snapshot = Snapshot::new(A::ID, self.id());
        let registers = self.registers();
        snapshot.set_registers(RegisterState::from_blocks(
            A::ID,
            registers.gregs().to_vec(),
            registers.fpregs().to_vec(),
        )?)?;

        for mapping in self.memory_mappings() {
            snapshot.add_memory_mapping(mapping.to_mapping())?;
            for record in mapping.memory_bytes() {
                snapshot.add_memory_bytes(record.to_memory_bytes())?;
            }
        }

        let end_registers = self.end_state_registers();
        let mut end_memory_bytes = Vec::new();
        for mapping in self.end_state_memory_mappings() {
            for record in mapping.memory_bytes() {
                end_memory_bytes.push(record.to_memory_bytes());
            }
        }
        snapshot.add_end_state(EndState {
            platform,
            instruction_address: self.end_state_instruction_address(),
            registers: RegisterState::from_blocks(
                A::ID,
                end_registers.gregs().to_vec(),
                end_registers.fpregs().to_vec(),
            )?,
            memory_bytes: end_memory_bytes,
        })?;
        Ok(snapshot)
    }
}

/// View of one register record.
pub struct RegistersView<'c> {
    raw: &'c RawRegisters,
}

impl<'c> RegistersView<'c> {
    pub fn gregs(&self) -> &'c [u8] {
        // SAFETY: relocated array.
        unsafe { slice_from_array(&self.raw.gregs) }
    }

    pub fn fpregs(&self) -> &'c [u8] {
        // SAFETY: relocated array.
        unsafe { slice_from_array(&self.raw.fpregs) }
    }
}

/// View of one memory mapping record.
pub struct MappingView<'c> {
    raw: &'c RawMemoryMapping,
}

impl<'c> MappingView<'c> {
    pub fn start_address(&self) -> u64 {
        self.raw.start_address
    }

    pub fn num_bytes(&self) -> u64 {
        self.raw.num_bytes
    }

    pub fn perms(&self) -> MemoryPerms {
        MemoryPerms::from_bits_truncate(self.raw.perms)
    }

    pub fn memory_bytes(&self) -> impl Iterator<Item = MemoryBytesView<'c>> {
        // SAFETY: relocated array.
        let raw: &[RawMemoryBytes] = unsafe { slice_from_array(&self.raw.memory_bytes) };
        raw.iter().map(|raw| MemoryBytesView { raw })
    }

    pub fn to_mapping(&self) -> MemoryMapping {
        MemoryMapping::new(self.start_address(), self.num_bytes(), self.perms())
    }
}

/// View of one encoded memory-byte record.
pub struct MemoryBytesView<'c> {
    raw: &'c RawMemoryBytes,
}

impl<'c> MemoryBytesView<'c> {
    pub fn start_address(&self) -> u64 {
        self.raw.start_address
    }

    /// Guest bytes covered by the record.
    pub fn num_bytes(&self) -> u64 {
        self.raw.num_bytes
    }

    pub fn is_repeating(&self) -> bool {
        self.raw.is_repeating()
    }

    pub fn repeated_byte(&self) -> u8 {
        self.raw.byte_value
    }

    /// Literal content, trimmed of any direct-mmap page padding. Empty for
    /// repeating records.
    pub fn literal(&self) -> &'c [u8] {
        // SAFETY: relocated array.
        let stored: &[u8] = unsafe { slice_from_array(&self.raw.byte_values) };
        let len = (self.raw.num_bytes as usize).min(stored.len());
        &stored[..len]
    }

    /// The full backing array including any page padding, as stored in the
    /// arena.
    pub fn literal_storage(&self) -> &'c [u8] {
        // SAFETY: relocated array.
        unsafe { slice_from_array(&self.raw.byte_values) }
    }

    /// Expand the record into plain bytes at its address.
    pub fn to_memory_bytes(&self) -> MemoryBytes {
        let bytes = if self.is_repeating() {
            vec![self.repeated_byte(); self.num_bytes() as usize]
        } else {
            self.literal().to_vec()
        };
        MemoryBytes::new(self.start_address(), bytes)
    }
}

/// Dereference a relocated array into a slice.
///
/// # Safety
///
/// `array` must come from a relocated blob: its items reference is either
/// null with count 0 or an absolute, aligned address of `count` valid `T`s
/// that outlive `'a`.
unsafe fn slice_from_array<'a, T: bytemuck::Pod>(array: &RawArray<T>) -> &'a [T] {
    if array.is_empty() {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(array.items.raw() as *const T, array.count as usize) }
}

/// Dereference a relocated reference.
///
/// # Safety
///
/// `r` must come from a relocated blob and reference a valid `T` outliving
/// `'a`.
unsafe fn deref<'a, T: bytemuck::Pod>(r: &RawRef<T>) -> &'a T {
    unsafe { &*(r.raw() as *const T) }
}
