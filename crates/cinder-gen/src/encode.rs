//! Per-mapping content encoding decisions.
//!
//! A mapping's flattened content becomes a sequence of runs: repeated-byte
//! stretches worth run-length encoding, and literal stretches stored in the
//! arena. Executable mappings under direct-mmap options bypass the split
//! entirely: the loader will map their arena bytes straight into an
//! executable page, so the content must stay byte-identical and unsplit.

use cinder_snapshot::{MemoryPerms, SnapifyOptions};

/// One encoded run of a mapping's content, in address order.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Run<'a> {
    Repeating { byte: u8, num_bytes: u64 },
    Literal { bytes: &'a [u8], direct_mmap: bool },
}

impl Run<'_> {
    /// Guest bytes covered by this run.
    pub(crate) fn num_bytes(&self) -> u64 {
        match self {
            Run::Repeating { num_bytes, .. } => *num_bytes,
            Run::Literal { bytes, .. } => bytes.len() as u64,
        }
    }
}

/// Encode one mapping's full content under `opts`.
pub(crate) fn encode_mapping<'a>(
    content: &'a [u8],
    perms: MemoryPerms,
    opts: &SnapifyOptions,
) -> Vec<Run<'a>> {
    if perms.is_executable() && opts.support_direct_mmap {
        // One unsplit literal per executable mapping, even when the content
        // is a single repeated byte: the direct-mapping invariant beats
        // compression.
        return vec![Run::Literal {
            bytes: content,
            direct_mmap: true,
        }];
    }
    if !opts.compress_repeating_bytes {
        return vec![Run::Literal {
            bytes: content,
            direct_mmap: false,
        }];
    }
    split_runs(content)
}

/// Split into maximal repeated-byte runs. Runs of at least two bytes become
/// `Repeating`; everything between them coalesces into `Literal` stretches.
fn split_runs(content: &[u8]) -> Vec<Run<'_>> {
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i < content.len() {
        let byte = content[i];
        let mut j = i + 1;
        while j < content.len() && content[j] == byte {
            j += 1;
        }
        if j - i >= 2 {
            if literal_start < i {
                out.push(Run::Literal {
                    bytes: &content[literal_start..i],
                    direct_mmap: false,
                });
            }
            out.push(Run::Repeating {
                byte,
                num_bytes: (j - i) as u64,
            });
            literal_start = j;
        }
        i = j;
    }
    if literal_start < content.len() {
        out.push(Run::Literal {
            bytes: &content[literal_start..],
            direct_mmap: false,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_snapshot::ArchId;

    fn opts(compress: bool, direct_mmap: bool) -> SnapifyOptions {
        SnapifyOptions {
            compress_repeating_bytes: compress,
            support_direct_mmap: direct_mmap,
            ..SnapifyOptions::for_running(ArchId::X86_64)
        }
    }

    #[test]
    fn splits_literals_around_repeated_runs() {
        let content = [1, 2, 3, 0, 0, 0, 0, 4, 5];
        let runs = encode_mapping(&content, MemoryPerms::RW, &opts(true, false));
        assert_eq!(
            runs,
            vec![
                Run::Literal {
                    bytes: &[1, 2, 3],
                    direct_mmap: false
                },
                Run::Repeating {
                    byte: 0,
                    num_bytes: 4
                },
                Run::Literal {
                    bytes: &[4, 5],
                    direct_mmap: false
                },
            ]
        );
        let covered: u64 = runs.iter().map(Run::num_bytes).sum();
        assert_eq!(covered, content.len() as u64);
    }

    #[test]
    fn all_repeating_content_is_one_run() {
        let content = [0xAA; 4096];
        let runs = encode_mapping(&content, MemoryPerms::RW, &opts(true, false));
        assert_eq!(
            runs,
            vec![Run::Repeating {
                byte: 0xAA,
                num_bytes: 4096
            }]
        );
    }

    #[test]
    fn non_repeating_content_is_one_literal() {
        let content: Vec<u8> = (0..255).collect();
        let runs = encode_mapping(&content, MemoryPerms::RW, &opts(true, false));
        assert_eq!(runs.len(), 1);
        assert!(matches!(
            runs[0],
            Run::Literal {
                direct_mmap: false,
                ..
            }
        ));
    }

    #[test]
    fn compression_disabled_yields_one_literal() {
        let content = [0u8; 64];
        let runs = encode_mapping(&content, MemoryPerms::RW, &opts(false, false));
        assert_eq!(runs.len(), 1);
        assert!(matches!(runs[0], Run::Literal { .. }));
    }

    #[test]
    fn executable_mapping_with_direct_mmap_is_never_split() {
        // Even a fully repeating page stays a single literal.
        let content = [0x90u8; 4096];
        let runs = encode_mapping(&content, MemoryPerms::RX, &opts(true, true));
        assert_eq!(runs.len(), 1);
        assert!(matches!(runs[0], Run::Literal {
            direct_mmap: true,
            ..
        }));
    }

    #[test]
    fn executable_mapping_without_direct_mmap_compresses() {
        let content = [0x90u8; 4096];
        let runs = encode_mapping(&content, MemoryPerms::RX, &opts(true, false));
        assert_eq!(
            runs,
            vec![Run::Repeating {
                byte: 0x90,
                num_bytes: 4096
            }]
        );
    }

    #[test]
    fn writable_mapping_ignores_direct_mmap() {
        let content = [0u8; 128];
        let runs = encode_mapping(&content, MemoryPerms::RW, &opts(true, true));
        assert!(matches!(runs[0], Run::Repeating { .. }));
    }
}
