/// Identifies the microarchitecture an expected end state was recorded on.
///
/// End states are keyed by platform because the same instruction sequence can
/// legitimately end differently across implementations of one architecture.
/// `Any` matches every platform, both as an end-state key and as a selection
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PlatformId {
    Any = 0,
    IntelHaswell = 1,
    IntelBroadwell = 2,
    IntelSkylake = 3,
    IntelIcelake = 4,
    AmdRome = 5,
    AmdMilan = 6,
    ArmNeoverseN1 = 7,
    AmpereOne = 8,
}

impl PlatformId {
    /// End-state selection rule: `Any` on either side matches everything.
    pub fn matches(self, requested: PlatformId) -> bool {
        self == requested || self == PlatformId::Any || requested == PlatformId::Any
    }
}
