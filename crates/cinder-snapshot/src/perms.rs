use bitflags::bitflags;

bitflags! {
    /// Access permissions of one memory mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPerms: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl MemoryPerms {
    pub const R: MemoryPerms = MemoryPerms::READ;
    pub const RW: MemoryPerms = MemoryPerms::READ.union(MemoryPerms::WRITE);
    pub const RX: MemoryPerms = MemoryPerms::READ.union(MemoryPerms::EXEC);
    pub const RWX: MemoryPerms = MemoryPerms::RW.union(MemoryPerms::EXEC);

    pub fn is_writable(self) -> bool {
        self.contains(MemoryPerms::WRITE)
    }

    pub fn is_executable(self) -> bool {
        self.contains(MemoryPerms::EXEC)
    }
}
