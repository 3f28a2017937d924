//! Dense variable identifiers.

/// A dense index into the variable array, `v ∈ [0, N)` (§3.1).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct VarId(u32);

impl VarId {
    /// Wrap a raw dense index.
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        VarId(index as u32)
    }

    /// The wrapped dense index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}
