//! Snapshot normalization ("snapify").
//!
//! The binary corpus format can only represent a restricted shape of
//! snapshot: exactly one end state, an exit transfer at the end-state
//! instruction address, and an end state that explicitly covers every byte
//! of every writable mapping. [`snapify`] converts an arbitrary snapshot
//! into that shape; the serializer only accepts the resulting
//! [`NormalizedSnapshot`], so "snapshot was not normalized first" is a
//! compile error rather than a runtime one.

use crate::arch::{Arch, ArchId};
use crate::error::{SnapifyError, SnapshotError};
use crate::platform::PlatformId;
use crate::types::{realize_mapping, EndState, MemoryBytes, MemoryMapping, RegisterState, Snapshot};

/// Per-snapshot normalization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapifyOptions {
    /// Permit snapshots with no end state at all; an empty end state is
    /// synthesized for them. Used for diagnostic/negative-path corpora only.
    pub allow_undefined_end_state: bool,
    /// Which candidate end state to keep.
    pub platform_id: PlatformId,
    /// Run-length compress repeated-byte memory content.
    pub compress_repeating_bytes: bool,
    /// Keep executable pages uncompressed and page-aligned so the loader can
    /// map them directly for execution.
    pub support_direct_mmap: bool,
}

impl SnapifyOptions {
    /// Options for corpora that will be executed by the runner.
    ///
    /// Executable pages stay uncompressed on aarch64 so they can be mapped
    /// directly; the corpus grows, but the runner avoids a per-execution
    /// decompression pass.
    pub fn for_running(arch: ArchId) -> SnapifyOptions {
        SnapifyOptions {
            allow_undefined_end_state: false,
            platform_id: PlatformId::Any,
            compress_repeating_bytes: true,
            support_direct_mmap: arch == ArchId::AArch64,
        }
    }

    /// Options for the snapshot-making pipeline, which must also accept
    /// snapshots whose end state has not been recorded yet.
    pub fn for_making(arch: ArchId) -> SnapifyOptions {
        SnapifyOptions {
            allow_undefined_end_state: true,
            ..SnapifyOptions::for_running(arch)
        }
    }
}

/// A snapshot in the canonical shape the corpus format requires. Only
/// [`snapify`] constructs these.
///
/// Invariants: exactly one end state; initial byte records cover every
/// mapping fully, one record per mapping, in mapping order; end-state byte
/// records cover every writable mapping fully, one record per writable
/// mapping, in mapping order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSnapshot {
    snapshot: Snapshot,
}

impl NormalizedSnapshot {
    pub fn id(&self) -> &str {
        self.snapshot.id()
    }

    pub fn arch(&self) -> ArchId {
        self.snapshot.arch()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }

    /// The single end state.
    pub fn end_state(&self) -> &EndState {
        &self.snapshot.end_states()[0]
    }

    /// Every mapping paired with its full initial content.
    pub fn mapping_contents(&self) -> impl Iterator<Item = (&MemoryMapping, &[u8])> {
        self.snapshot
            .mappings()
            .iter()
            .zip(self.snapshot.memory_bytes())
            .map(|(m, b)| (m, b.bytes.as_slice()))
    }

    /// Every writable mapping paired with its full end-state content.
    pub fn end_state_contents(&self) -> impl Iterator<Item = (&MemoryMapping, &[u8])> {
        self.snapshot
            .mappings()
            .iter()
            .filter(|m| m.perms.is_writable())
            .zip(&self.end_state().memory_bytes)
            .map(|(m, b)| (m, b.bytes.as_slice()))
    }
}

/// Tests whether `snapshot` can be normalized under `opts` without doing the
/// work. Failure is the expected way of filtering a corpus per platform.
pub fn can_snapify(snapshot: &Snapshot, opts: &SnapifyOptions) -> Result<(), SnapifyError> {
    if select_end_state(snapshot, opts).is_some() {
        return Ok(());
    }
    if opts.allow_undefined_end_state && snapshot.end_states().is_empty() {
        return Ok(());
    }
    Err(SnapifyError::NoEndStateForPlatform {
        snapshot_id: snapshot.id().to_string(),
        platform: opts.platform_id,
    })
}

/// Normalize `snapshot` into the canonical corpus shape.
pub fn snapify<A: Arch>(
    snapshot: &Snapshot,
    opts: &SnapifyOptions,
) -> Result<NormalizedSnapshot, SnapifyError> {
    if snapshot.arch() != A::ID {
        return Err(SnapifyError::ArchMismatch {
            snapshot_id: snapshot.id().to_string(),
            expected: A::ID,
            found: snapshot.arch(),
        });
    }
    can_snapify(snapshot, opts)?;
    let selected = select_end_state(snapshot, opts);
    tracing::debug!(
        snapshot = snapshot.id(),
        end_state = selected.map(|es| format!("{:?}", es.platform)).as_deref(),
        "snapify"
    );

    let wrap = |source: SnapshotError| SnapifyError::Snapshot {
        snapshot_id: snapshot.id().to_string(),
        source,
    };

    let mut out = Snapshot::new(snapshot.arch(), snapshot.id());
    out.set_registers(snapshot.registers().clone()).map_err(wrap)?;
    for mapping in snapshot.mappings() {
        out.add_memory_mapping(*mapping).map_err(wrap)?;
    }

    // Realize every mapping's full initial content, zero-filling gaps.
    let mut contents: Vec<Vec<u8>> = snapshot
        .mappings()
        .iter()
        .map(|m| realize_mapping(m, snapshot.memory_bytes(), None))
        .collect();

    // Overwrite the bytes at the end-state instruction address with the
    // architecture's exit transfer. A synthesized end state has no defined
    // stop address, so nothing is injected for it.
    if let Some(end_state) = selected {
        inject_exit_sequence::<A>(snapshot, &mut contents, end_state.instruction_address)?;
    }

    for (mapping, content) in snapshot.mappings().iter().zip(&contents) {
        out.add_memory_bytes(MemoryBytes::new(mapping.start_address, content.clone()))
            .map_err(wrap)?;
    }

    // Widen the end state so every writable mapping is fully represented:
    // the end state must be self-sufficient without consulting the initial
    // state. Bytes the end state does not override come from the
    // (exit-sequence-adjusted) initial content.
    let deltas: &[MemoryBytes] = selected.map(|es| es.memory_bytes.as_slice()).unwrap_or(&[]);
    let mut end_memory_bytes = Vec::new();
    for (mapping, content) in snapshot.mappings().iter().zip(&contents) {
        if !mapping.perms.is_writable() {
            continue;
        }
        let widened = realize_mapping(mapping, deltas, Some(content));
        end_memory_bytes.push(MemoryBytes::new(mapping.start_address, widened));
    }

    let end_state = match selected {
        Some(es) => EndState {
            platform: es.platform,
            instruction_address: es.instruction_address,
            registers: es.registers.clone(),
            memory_bytes: end_memory_bytes,
        },
        None => EndState {
            platform: PlatformId::Any,
            instruction_address: 0,
            registers: RegisterState::zeroed(snapshot.arch()),
            memory_bytes: end_memory_bytes,
        },
    };
    out.add_end_state(end_state).map_err(wrap)?;

    Ok(NormalizedSnapshot { snapshot: out })
}

fn select_end_state<'s>(snapshot: &'s Snapshot, opts: &SnapifyOptions) -> Option<&'s EndState> {
    snapshot
        .end_states()
        .iter()
        .find(|es| es.platform.matches(opts.platform_id))
}

fn inject_exit_sequence<A: Arch>(
    snapshot: &Snapshot,
    contents: &mut [Vec<u8>],
    address: u64,
) -> Result<(), SnapifyError> {
    let sequence = A::exit_sequence(address);
    let out_of_range = || SnapifyError::ExitSequenceOutOfRange {
        snapshot_id: snapshot.id().to_string(),
        address,
    };
    let index = snapshot
        .mappings()
        .iter()
        .position(|m| m.perms.is_executable() && m.contains_range(address, sequence.len() as u64))
        .ok_or_else(out_of_range)?;
    let mapping = &snapshot.mappings()[index];
    let offset = (address - mapping.start_address) as usize;
    contents[index][offset..offset + sequence.len()].copy_from_slice(&sequence);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::X86_64;
    use crate::perms::MemoryPerms;

    const CODE_ADDR: u64 = 0x1_0000;
    const DATA_ADDR: u64 = 0x2_0000;
    const PAGE: u64 = 4096;

    fn test_snapshot() -> Snapshot {
        let mut s = Snapshot::new(ArchId::X86_64, "ends-as-expected");
        s.add_memory_mapping(MemoryMapping::new(CODE_ADDR, PAGE, MemoryPerms::RX))
            .unwrap();
        s.add_memory_mapping(MemoryMapping::new(DATA_ADDR, PAGE, MemoryPerms::RW))
            .unwrap();
        // A couple of instructions; the rest of the code page stays zero.
        s.add_memory_bytes(MemoryBytes::new(CODE_ADDR, vec![0x90, 0x90, 0xCC]))
            .unwrap();
        s.add_memory_bytes(MemoryBytes::new(DATA_ADDR, vec![0x11; 8]))
            .unwrap();
        s.add_end_state(EndState {
            platform: PlatformId::IntelSkylake,
            instruction_address: CODE_ADDR + 3,
            registers: RegisterState::zeroed(ArchId::X86_64),
            memory_bytes: vec![MemoryBytes::new(DATA_ADDR, vec![0x22; 4])],
        })
        .unwrap();
        s
    }

    #[test]
    fn can_snapify_filters_by_platform() {
        let s = test_snapshot();
        let mut opts = SnapifyOptions::for_running(ArchId::X86_64);
        assert!(can_snapify(&s, &opts).is_ok());

        opts.platform_id = PlatformId::IntelSkylake;
        assert!(can_snapify(&s, &opts).is_ok());

        opts.platform_id = PlatformId::AmdRome;
        let err = can_snapify(&s, &opts).unwrap_err();
        assert!(matches!(err, SnapifyError::NoEndStateForPlatform { .. }));
    }

    #[test]
    fn snapify_injects_the_exit_sequence() {
        let s = test_snapshot();
        let opts = SnapifyOptions::for_running(ArchId::X86_64);
        let normalized = snapify::<X86_64>(&s, &opts).unwrap();

        let sequence = X86_64::exit_sequence(CODE_ADDR + 3);
        let (_, code) = normalized
            .mapping_contents()
            .find(|(m, _)| m.start_address == CODE_ADDR)
            .unwrap();
        assert_eq!(&code[3..3 + sequence.len()], sequence.as_slice());
        assert_eq!(&code[..3], &[0x90, 0x90, 0xCC]);
        assert_eq!(code.len(), PAGE as usize);
    }

    #[test]
    fn snapify_widens_the_end_state_over_writable_mappings() {
        let s = test_snapshot();
        let opts = SnapifyOptions::for_running(ArchId::X86_64);
        let normalized = snapify::<X86_64>(&s, &opts).unwrap();

        let end_state = normalized.end_state();
        assert_eq!(end_state.memory_bytes.len(), 1);
        let widened = &end_state.memory_bytes[0];
        assert_eq!(widened.start_address, DATA_ADDR);
        assert_eq!(widened.num_bytes(), PAGE);
        // Delta overrides the first four bytes; the rest comes from the
        // initial state.
        assert_eq!(&widened.bytes[..4], &[0x22; 4]);
        assert_eq!(&widened.bytes[4..8], &[0x11; 4]);
        assert_eq!(widened.bytes[8], 0);
    }

    #[test]
    fn snapify_requires_a_matching_end_state() {
        let mut s = Snapshot::new(ArchId::X86_64, "no-end-states");
        s.add_memory_mapping(MemoryMapping::new(CODE_ADDR, PAGE, MemoryPerms::RX))
            .unwrap();
        let opts = SnapifyOptions::for_running(ArchId::X86_64);
        assert!(matches!(
            snapify::<X86_64>(&s, &opts),
            Err(SnapifyError::NoEndStateForPlatform { .. })
        ));
    }

    #[test]
    fn snapify_synthesizes_an_end_state_when_allowed() {
        let mut s = Snapshot::new(ArchId::X86_64, "no-end-state");
        s.add_memory_mapping(MemoryMapping::new(DATA_ADDR, PAGE, MemoryPerms::RW))
            .unwrap();
        s.add_memory_bytes(MemoryBytes::new(DATA_ADDR, vec![0x55; 16]))
            .unwrap();

        let opts = SnapifyOptions::for_making(ArchId::X86_64);
        let normalized = snapify::<X86_64>(&s, &opts).unwrap();
        assert_eq!(normalized.id(), "no-end-state");
        let es = normalized.end_state();
        assert_eq!(es.instruction_address, 0);
        assert_eq!(es.memory_bytes.len(), 1);
        assert_eq!(es.memory_bytes[0].num_bytes(), PAGE);
        assert_eq!(&es.memory_bytes[0].bytes[..16], &[0x55; 16]);
    }

    #[test]
    fn snapify_rejects_an_unreachable_end_state_address() {
        let mut s = Snapshot::new(ArchId::X86_64, "bad-endpoint");
        s.add_memory_mapping(MemoryMapping::new(CODE_ADDR, PAGE, MemoryPerms::RX))
            .unwrap();
        s.add_end_state(EndState {
            platform: PlatformId::Any,
            // Too close to the mapping end for the exit sequence to fit.
            instruction_address: CODE_ADDR + PAGE - 1,
            registers: RegisterState::zeroed(ArchId::X86_64),
            memory_bytes: Vec::new(),
        })
        .unwrap();

        let opts = SnapifyOptions::for_running(ArchId::X86_64);
        assert!(matches!(
            snapify::<X86_64>(&s, &opts),
            Err(SnapifyError::ExitSequenceOutOfRange { .. })
        ));
    }

    #[test]
    fn snapify_rejects_mismatched_architecture() {
        let s = Snapshot::new(ArchId::AArch64, "wrong-arch");
        let opts = SnapifyOptions::for_making(ArchId::AArch64);
        assert!(matches!(
            snapify::<X86_64>(&s, &opts),
            Err(SnapifyError::ArchMismatch { .. })
        ));
    }
}
