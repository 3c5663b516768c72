//! The relocatable snap corpus: record layout, relocation, and read-only
//! access.
//!
//! A corpus blob is position-independent: every internal reference is a byte
//! offset relative to the blob base. At load time [`relocate_corpus`] (or
//! [`load_corpus`]) performs one validating pass that rewrites each
//! reference field in place to an absolute address, then hands back the
//! immutable [`Corpus`] handle. A blob that fails any validation is rejected
//! whole; there is no partial-corpus fallback.

pub mod format;

mod buffer;
mod corpus;
mod error;
mod load;
mod relocate;

pub use crate::buffer::{CorpusBuffer, CORPUS_BUFFER_ALIGN};
pub use crate::corpus::{Corpus, MappingView, MemoryBytesView, RegistersView, SnapView};
pub use crate::error::{CorpusError, RelocateError};
pub use crate::load::load_corpus;
pub use crate::relocate::relocate_corpus;
