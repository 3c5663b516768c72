//! Corpus file loading.

use std::path::Path;

use cinder_snapshot::Arch;

use crate::buffer::CorpusBuffer;
use crate::corpus::Corpus;
use crate::error::CorpusError;
use crate::relocate::relocate_corpus;

/// Load and relocate a corpus file.
///
/// `None` means "no corpus was configured": the caller proceeds without one,
/// so this is `Ok(None)` rather than an error. A present but missing or
/// unreadable path is reported as [`CorpusError::Io`].
pub fn load_corpus<A: Arch>(path: Option<&Path>) -> Result<Option<Corpus<A>>, CorpusError> {
    let Some(path) = path else {
        tracing::info!("no corpus path configured; continuing without a corpus");
        return Ok(None);
    };
    let bytes = std::fs::read(path)?;
    let buf = CorpusBuffer::from_bytes(&bytes)?;
    let corpus = relocate_corpus::<A>(buf)?;
    tracing::info!(
        snaps = corpus.snap_count(),
        len = corpus.byte_len(),
        "loaded corpus from {}",
        path.display()
    );
    Ok(Some(corpus))
}
