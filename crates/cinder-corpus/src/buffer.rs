use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::CorpusError;

/// Alignment of corpus buffers. Page alignment of the buffer base is what
/// lets page-aligned arena offsets become page-aligned addresses after
/// relocation, which direct-mmap executable literals rely on.
pub const CORPUS_BUFFER_ALIGN: usize = 4096;

/// An owned, page-aligned byte buffer holding a corpus blob.
///
/// The relocator consumes one of these by value; after relocation the same
/// allocation backs the read-only [`Corpus`](crate::Corpus) handle.
#[derive(Debug)]
pub struct CorpusBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// SAFETY: the buffer uniquely owns its allocation.
unsafe impl Send for CorpusBuffer {}
// SAFETY: shared access only hands out &[u8].
unsafe impl Sync for CorpusBuffer {}

impl CorpusBuffer {
    /// Allocate a zeroed buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Result<CorpusBuffer, CorpusError> {
        let layout = Layout::from_size_align(len.max(1), CORPUS_BUFFER_ALIGN)
            .map_err(|_| CorpusError::OutOfMemory { len })?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(CorpusBuffer { ptr, len, layout }),
            None => Err(CorpusError::OutOfMemory { len }),
        }
    }

    /// Allocate a buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<CorpusBuffer, CorpusError> {
        let mut buf = CorpusBuffer::zeroed(bytes.len())?;
        buf.as_mut_slice().copy_from_slice(bytes);
        Ok(buf)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer's base address; always a multiple of
    /// [`CORPUS_BUFFER_ALIGN`].
    pub fn base_address(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe our live allocation.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr/len describe our live allocation; &mut self gives
        // exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for CorpusBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
