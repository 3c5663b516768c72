//! The single-pass, validating relocator.
//!
//! Converts every blob-internal reference from "offset relative to blob
//! base" to "absolute address", in place, visiting each reference field
//! exactly once. The pass is linear in the number of reference fields, not
//! in blob size; shared literal arrays are fine because the *fields*
//! referencing them are distinct even when the targets alias.
//!
//! There is no partially-relocated state a caller can observe: the pass
//! consumes the [`CorpusBuffer`] and either returns a [`Corpus`] handle or
//! an error and nothing else.

use std::mem::{align_of, offset_of, size_of};

use cinder_snapshot::Arch;

use crate::buffer::CorpusBuffer;
use crate::corpus::Corpus;
use crate::error::RelocateError;
use crate::format::{
    CorpusHeader, RawArray, RawEndState, RawMemoryBytes, RawMemoryMapping, RawRef, RawRegisters,
    RawSnap, CORPUS_MAGIC, CORPUS_VERSION,
};

pub(crate) const HEADER_SIZE: usize = size_of::<CorpusHeader>();

/// Relocate `buf` in place and return the immutable corpus handle.
///
/// Validation failures reject the whole blob; the buffer is dropped and no
/// partially-usable handle exists.
pub fn relocate_corpus<A: Arch>(mut buf: CorpusBuffer) -> Result<Corpus<A>, RelocateError> {
    let base = buf.base_address();
    let mut pass = Pass {
        buf: buf.as_mut_slice(),
        base,
    };
    let snap_count = pass.run::<A>()?;
    tracing::debug!(snaps = snap_count, len = buf.len(), "relocated corpus");
    // SAFETY: the pass validated every reference field against the blob
    // bounds and rewrote it to an absolute address inside `buf`.
    Ok(unsafe { Corpus::from_relocated(buf) })
}

struct Pass<'b> {
    buf: &'b mut [u8],
    base: u64,
}

impl Pass<'_> {
    fn run<A: Arch>(&mut self) -> Result<usize, RelocateError> {
        if self.buf.len() < HEADER_SIZE {
            return Err(RelocateError::TruncatedBlob);
        }
        let header: CorpusHeader = *bytemuck::from_bytes(&self.buf[..HEADER_SIZE]);
        if &header.magic != CORPUS_MAGIC {
            return Err(RelocateError::BadMagic);
        }
        if header.version != CORPUS_VERSION {
            return Err(RelocateError::IncompatibleVersion(header.version));
        }
        if header.arch != A::ID as u32 {
            return Err(RelocateError::IncompatibleArch {
                expected: A::ID,
                found: header.arch,
            });
        }
        if header.total_len != self.buf.len() as u64 {
            return Err(RelocateError::LengthMismatch {
                header: header.total_len,
                actual: self.buf.len() as u64,
            });
        }

        let (snap_refs, snap_count) =
            self.relocate_array::<RawRef<RawSnap>>(offset_of!(CorpusHeader, snaps))?;
        for i in 0..snap_count {
            let snap =
                self.relocate_ref::<RawSnap>(snap_refs + i * size_of::<RawRef<RawSnap>>(), 1)?;
            self.relocate_snap(snap)?;
        }
        Ok(snap_count)
    }

    fn relocate_snap(&mut self, snap: usize) -> Result<(), RelocateError> {
        self.relocate_array::<u8>(snap + offset_of!(RawSnap, id))?;

        let registers =
            self.relocate_ref::<RawRegisters>(snap + offset_of!(RawSnap, registers), 1)?;
        self.relocate_registers(registers)?;
        self.relocate_mappings(snap + offset_of!(RawSnap, memory_mappings))?;

        let end_state = snap + offset_of!(RawSnap, end_state);
        let end_registers =
            self.relocate_ref::<RawRegisters>(end_state + offset_of!(RawEndState, registers), 1)?;
        self.relocate_registers(end_registers)?;
        self.relocate_mappings(end_state + offset_of!(RawEndState, memory_mappings))?;
        Ok(())
    }

    fn relocate_registers(&mut self, registers: usize) -> Result<(), RelocateError> {
        self.relocate_array::<u8>(registers + offset_of!(RawRegisters, gregs))?;
        self.relocate_array::<u8>(registers + offset_of!(RawRegisters, fpregs))?;
        Ok(())
    }

    fn relocate_mappings(&mut self, array: usize) -> Result<(), RelocateError> {
        let (mappings, count) = self.relocate_array::<RawMemoryMapping>(array)?;
        for i in 0..count {
            let mapping = mappings + i * size_of::<RawMemoryMapping>();
            let (records, record_count) = self.relocate_array::<RawMemoryBytes>(
                mapping + offset_of!(RawMemoryMapping, memory_bytes),
            )?;
            for j in 0..record_count {
                let record = records + j * size_of::<RawMemoryBytes>();
                self.relocate_array::<u8>(record + offset_of!(RawMemoryBytes, byte_values))?;
            }
        }
        Ok(())
    }

    /// Relocate the `RawArray<T>` whose field sits at blob offset `array`.
    /// Returns the blob-relative offset of the first item and the count.
    fn relocate_array<T>(&mut self, array: usize) -> Result<(usize, usize), RelocateError> {
        let count = self.read_u64(array + offset_of!(RawArray<u8>, count))?;
        let items = self.relocate_ref::<T>(array + offset_of!(RawArray<u8>, items), count)?;
        Ok((items, count as usize))
    }

    /// Validate and rewrite the single `RawRef<T>` field at blob offset
    /// `field`, expected to reference `count` items of `T`. Returns the
    /// blob-relative offset of the target. Empty references stay null.
    fn relocate_ref<T>(&mut self, field: usize, count: u64) -> Result<usize, RelocateError> {
        let offset = self.read_u64(field)?;
        if count == 0 {
            // Canonicalize: empty arrays keep a null items reference.
            self.write_u64(field, 0)?;
            return Ok(0);
        }
        if offset == 0 || offset % align_of::<T>() as u64 != 0 {
            return Err(if offset == 0 {
                RelocateError::OutOfBoundsOffset { offset }
            } else {
                RelocateError::MisalignedOffset { offset }
            });
        }
        let size = count
            .checked_mul(size_of::<T>() as u64)
            .ok_or(RelocateError::OutOfBoundsOffset { offset })?;
        let limit = offset
            .checked_add(size)
            .ok_or(RelocateError::OutOfBoundsOffset { offset })?;
        if limit > self.buf.len() as u64 {
            return Err(RelocateError::OutOfBoundsOffset { offset });
        }
        self.write_u64(field, self.base.wrapping_add(offset))?;
        Ok(offset as usize)
    }

    fn read_u64(&self, offset: usize) -> Result<u64, RelocateError> {
        let bytes = self
            .buf
            .get(offset..offset + 8)
            .ok_or(RelocateError::TruncatedBlob)?;
        let mut le = [0u8; 8];
        le.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(le))
    }

    fn write_u64(&mut self, offset: usize, value: u64) -> Result<(), RelocateError> {
        let bytes = self
            .buf
            .get_mut(offset..offset + 8)
            .ok_or(RelocateError::TruncatedBlob)?;
        bytes.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}
