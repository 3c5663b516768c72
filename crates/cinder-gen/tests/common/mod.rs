//! Shared builders for the generation tests: a small "ends as expected"
//! snapshot with one executable code page and one writable data page.

// Not every test binary uses every helper.
#![allow(dead_code)]

use cinder_snapshot::{
    snapify, ArchId, EndState, MemoryBytes, MemoryMapping, MemoryPerms, NormalizedSnapshot,
    PlatformId, RegisterState, SnapifyOptions, Snapshot, X86_64,
};

pub const CODE_ADDR: u64 = 0x1_0000;
pub const DATA_ADDR: u64 = 0x2_0000;
pub const PAGE: u64 = 4096;

/// A few nops then a breakpoint; the rest of the code page is zero fill.
pub const CODE_BYTES: &[u8] = &[0x90, 0x90, 0xCC];

pub fn ends_as_expected() -> Snapshot {
    let mut s = Snapshot::new(ArchId::X86_64, "ends-as-expected");
    s.add_memory_mapping(MemoryMapping::new(CODE_ADDR, PAGE, MemoryPerms::RX))
        .unwrap();
    s.add_memory_mapping(MemoryMapping::new(DATA_ADDR, PAGE, MemoryPerms::RW))
        .unwrap();
    s.add_memory_bytes(MemoryBytes::new(CODE_ADDR, CODE_BYTES.to_vec()))
        .unwrap();
    s.add_memory_bytes(MemoryBytes::new(DATA_ADDR, vec![0x11; 8]))
        .unwrap();
    s.add_end_state(EndState {
        platform: PlatformId::IntelSkylake,
        instruction_address: CODE_ADDR + CODE_BYTES.len() as u64,
        registers: RegisterState::zeroed(ArchId::X86_64),
        memory_bytes: vec![MemoryBytes::new(DATA_ADDR, vec![0x22; 4])],
    })
    .unwrap();
    s
}

pub fn snapified(opts: &SnapifyOptions) -> NormalizedSnapshot {
    snapify::<X86_64>(&ends_as_expected(), opts).unwrap()
}

/// The same snapshot under a different identifier.
pub fn renamed_ends_as_expected(id: &str) -> Snapshot {
    let src = ends_as_expected();
    let mut s = Snapshot::new(src.arch(), id);
    for m in src.mappings() {
        s.add_memory_mapping(*m).unwrap();
    }
    for b in src.memory_bytes() {
        s.add_memory_bytes(b.clone()).unwrap();
    }
    for es in src.end_states() {
        s.add_end_state(es.clone()).unwrap();
    }
    s
}
