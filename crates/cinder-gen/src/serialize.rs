//! Corpus blob assembly.
//!
//! One [`CorpusBuilder`] accumulates snaps and emits a single relocatable
//! blob. The builder owns all generation state (arena, dedup table, name
//! table) and is single-threaded; run several independent builders to
//! generate several corpora in parallel.
//!
//! Output is deterministic: identical snapshot sequences and options always
//! produce byte-identical blobs, as required for reproducible builds and
//! content-addressed caching of generated corpora.

use std::collections::HashMap;
use std::marker::PhantomData;

use cinder_corpus::format::{
    CorpusHeader, RawArray, RawEndState, RawMemoryBytes, RawMemoryMapping, RawRef, RawRegisters,
    RawSnap, CORPUS_MAGIC, CORPUS_VERSION, LITERAL_ALIGN, MEMORY_BYTES_LITERAL,
    MEMORY_BYTES_REPEATING,
};
use cinder_snapshot::{
    Arch, MemoryMapping, NormalizedSnapshot, RegisterState, SnapifyOptions,
};

use crate::arena::Arena;
use crate::encode::{encode_mapping, Run};
use crate::error::{GenError, Result};

/// Builds one relocatable corpus blob for architecture `A`.
pub struct CorpusBuilder<A: Arch> {
    arena: Arena,
    snaps: HashMap<String, u64>,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> CorpusBuilder<A> {
    pub fn new() -> CorpusBuilder<A> {
        CorpusBuilder {
            arena: Arena::new(),
            snaps: HashMap::new(),
            _arch: PhantomData,
        }
    }

    /// Encode one normalized snapshot and append it under `name`.
    ///
    /// Only [`NormalizedSnapshot`] is accepted, so "forgot to snapify" is a
    /// type error; the remaining failure modes are call-site mistakes.
    pub fn add_snap(
        &mut self,
        name: &str,
        snapshot: &NormalizedSnapshot,
        opts: &SnapifyOptions,
    ) -> Result<()> {
        if snapshot.arch() != A::ID {
            return Err(GenError::ArchMismatch {
                id: snapshot.id().to_string(),
                expected: A::ID,
                found: snapshot.arch(),
            });
        }
        if self.snaps.contains_key(name) {
            return Err(GenError::DuplicateSnapName(name.to_string()));
        }

        let id_offset = self.arena.alloc_bytes(snapshot.id().as_bytes(), LITERAL_ALIGN);
        let id = RawArray::new(id_offset, snapshot.id().len() as u64);

        let registers = self.write_registers(snapshot.snapshot().registers());
        let memory_mappings = self.write_mappings(snapshot.mapping_contents(), opts);

        let end_state = snapshot.end_state();
        let end_registers = self.write_registers(&end_state.registers);
        let end_mappings = self.write_mappings(snapshot.end_state_contents(), opts);

        let snap = RawSnap {
            id,
            registers: RawRef::from_offset(registers),
            memory_mappings,
            end_state: RawEndState {
                instruction_address: end_state.instruction_address,
                registers: RawRef::from_offset(end_registers),
                memory_mappings: end_mappings,
            },
        };
        let offset = self.arena.alloc_record(&snap);
        self.snaps.insert(name.to_string(), offset);
        tracing::debug!(name, offset, "generated snap");
        Ok(())
    }

    /// Append the top-level snap array in the given order and finish the
    /// blob. The order becomes the corpus's iteration and lookup order.
    pub fn finish(mut self, order: &[&str]) -> Result<Vec<u8>> {
        let mut refs = Vec::with_capacity(order.len());
        for &name in order {
            let &offset = self
                .snaps
                .get(name)
                .ok_or_else(|| GenError::UnknownSnapName(name.to_string()))?;
            refs.push(RawRef::<RawSnap>::from_offset(offset));
        }
        let refs_offset = self.arena.alloc_records(&refs);

        let header = CorpusHeader {
            magic: *CORPUS_MAGIC,
            version: CORPUS_VERSION,
            arch: A::ID as u32,
            total_len: self.arena.len(),
            snaps: RawArray::new(refs_offset, refs.len() as u64),
        };
        let blob = self.arena.finish(&header);
        tracing::debug!(snaps = refs.len(), len = blob.len(), "finished corpus blob");
        Ok(blob)
    }

    fn write_registers(&mut self, registers: &RegisterState) -> u64 {
        let gregs_offset = self.arena.alloc_bytes(registers.gregs(), LITERAL_ALIGN);
        let fpregs_offset = self.arena.alloc_bytes(registers.fpregs(), LITERAL_ALIGN);
        self.arena.alloc_record(&RawRegisters {
            gregs: RawArray::new(gregs_offset, registers.gregs().len() as u64),
            fpregs: RawArray::new(fpregs_offset, registers.fpregs().len() as u64),
        })
    }

    fn write_mappings<'s>(
        &mut self,
        contents: impl Iterator<Item = (&'s MemoryMapping, &'s [u8])>,
        opts: &SnapifyOptions,
    ) -> RawArray<RawMemoryMapping> {
        let mut mappings = Vec::new();
        for (mapping, content) in contents {
            let mut records = Vec::new();
            let mut address = mapping.start_address;
            for run in encode_mapping(content, mapping.perms, opts) {
                let covered = run.num_bytes();
                records.push(self.write_run(address, &run));
                address += covered;
            }
            let records_offset = self.arena.alloc_records(&records);
            mappings.push(RawMemoryMapping {
                start_address: mapping.start_address,
                num_bytes: mapping.num_bytes,
                perms: mapping.perms.bits(),
                _reserved: 0,
                memory_bytes: RawArray::new(records_offset, records.len() as u64),
            });
        }
        let offset = self.arena.alloc_records(&mappings);
        RawArray::new(offset, mappings.len() as u64)
    }

    fn write_run(&mut self, address: u64, run: &Run<'_>) -> RawMemoryBytes {
        match run {
            Run::Repeating { byte, num_bytes } => RawMemoryBytes {
                start_address: address,
                num_bytes: *num_bytes,
                kind: MEMORY_BYTES_REPEATING,
                byte_value: *byte,
                _reserved: [0; 3],
                byte_values: RawArray::EMPTY,
            },
            Run::Literal { bytes, direct_mmap } => {
                let (offset, stored_len) = if *direct_mmap {
                    self.arena.alloc_direct_mmap_literal(bytes, A::PAGE_SIZE)
                } else {
                    (self.arena.alloc_literal(bytes), bytes.len() as u64)
                };
                RawMemoryBytes {
                    start_address: address,
                    num_bytes: bytes.len() as u64,
                    kind: MEMORY_BYTES_LITERAL,
                    byte_value: 0,
                    _reserved: [0; 3],
                    byte_values: RawArray::new(offset, stored_len),
                }
            }
        }
    }
}

impl<A: Arch> Default for CorpusBuilder<A> {
    fn default() -> Self {
        CorpusBuilder::new()
    }
}

/// Generate one relocatable blob from already-normalized snapshots: names
/// default to snapshot ids and the array order is the input order.
pub fn generate_relocatable_corpus<A: Arch>(
    snapshots: &[NormalizedSnapshot],
    opts: &SnapifyOptions,
) -> Result<Vec<u8>> {
    let mut builder = CorpusBuilder::<A>::new();
    for snapshot in snapshots {
        builder.add_snap(snapshot.id(), snapshot, opts)?;
    }
    let order: Vec<&str> = snapshots.iter().map(|s| s.id()).collect();
    builder.finish(&order)
}
