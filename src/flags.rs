//! RandomX capability flags.
//!
//! Flags select allocation strategy and engine behavior (huge pages,
//! hardware AES, full-memory mode, JIT, Argon2 variant). They are combined
//! into a single bitmask and passed opaquely to the hashing engine; the
//! only bit this crate interprets itself is `FULL_MEM`, which switches the
//! execution mode from cache-backed to dataset-backed.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// A single RandomX engine flag.
///
/// Bit values match the engine's C-level constants. `Argon2` is the
/// combined SSSE3|AVX2 value the engine accepts for "pick the best
/// Argon2 implementation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    Default,
    LargePages,
    HardAes,
    FullMem,
    Jit,
    Secure,
    Argon2Ssse3,
    Argon2Avx2,
    Argon2,
}

impl Flag {
    /// Engine-level bit value of this flag.
    pub const fn bits(self) -> u32 {
        match self {
            Flag::Default => 0,
            Flag::LargePages => 1,
            Flag::HardAes => 2,
            Flag::FullMem => 4,
            Flag::Jit => 8,
            Flag::Secure => 16,
            Flag::Argon2Ssse3 => 32,
            Flag::Argon2Avx2 => 64,
            Flag::Argon2 => 96,
        }
    }
}

/// An immutable combination of [`Flag`]s.
///
/// Built once, fixed for the lifetime of a context. Pure value type:
/// combination and containment checks only.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FlagSet(u32);

impl FlagSet {
    /// The empty flag set (engine defaults).
    pub const fn empty() -> Self {
        FlagSet(0)
    }

    /// True if every bit of `flag` is set.
    pub const fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bits() == flag.bits()
    }

    /// True if the full-memory (dataset) mode is selected.
    pub const fn full_mem(self) -> bool {
        self.contains(Flag::FullMem)
    }

    /// The combined bitmask passed to the engine.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The subset of this set the engine accepts for dataset allocation.
    ///
    /// Dataset allocation only honors `LARGE_PAGES`; all other bits are
    /// stripped before the call.
    pub const fn dataset_alloc_bits(self) -> u32 {
        self.0 & Flag::LargePages.bits()
    }
}

impl From<Flag> for FlagSet {
    fn from(flag: Flag) -> Self {
        FlagSet(flag.bits())
    }
}

impl BitOr<Flag> for FlagSet {
    type Output = FlagSet;

    fn bitor(self, rhs: Flag) -> FlagSet {
        FlagSet(self.0 | rhs.bits())
    }
}

impl BitOr for FlagSet {
    type Output = FlagSet;

    fn bitor(self, rhs: FlagSet) -> FlagSet {
        FlagSet(self.0 | rhs.0)
    }
}

impl BitOr<FlagSet> for Flag {
    type Output = FlagSet;

    fn bitor(self, rhs: FlagSet) -> FlagSet {
        FlagSet(self.bits() | rhs.0)
    }
}

impl BitOr for Flag {
    type Output = FlagSet;

    fn bitor(self, rhs: Flag) -> FlagSet {
        FlagSet(self.bits() | rhs.bits())
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        iter.into_iter()
            .fold(FlagSet::empty(), |set, flag| set | flag)
    }
}
