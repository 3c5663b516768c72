//! Corpus generation: encode normalized snapshots into relocatable blobs.
//!
//! The pipeline is `snapify` (in `cinder-snapshot`) → [`CorpusBuilder`] →
//! relocatable blob bytes → relocation (in `cinder-corpus`) at load time.
//! Generation knows nothing about the blob's final load address: every
//! internal reference it emits is a blob-relative offset.

mod arena;
mod encode;
mod error;
mod serialize;

pub use crate::error::{GenError, Result};
pub use crate::serialize::{generate_relocatable_corpus, CorpusBuilder};
