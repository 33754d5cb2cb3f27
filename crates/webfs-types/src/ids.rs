//! Handle correlation tokens.
//!
//! An [`OpId`] names one open handle for its whole life: the create call
//! that allocates it, every read/write/metadata call against it, and the
//! final close that retires it. It is a generational index into a slot
//! table, so a retired id never aliases a later handle that reuses the
//! same slot.
//!
//! On the wire an `OpId` is a single `u64`: generation in the high half,
//! slot index in the low half.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generational handle token.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "u64", from = "u64")]
pub struct OpId {
    index: u32,
    generation: u32,
}

impl OpId {
    /// Token carried by calls made without an open handle (volume queries,
    /// metadata lookups the driver issues before any create). Handle tables
    /// never issue generation 0.
    pub const DETACHED: OpId = OpId::new(0, 0);

    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the owning table.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_detached(&self) -> bool {
        self.generation == 0
    }

    pub fn to_u64(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl From<OpId> for u64 {
    fn from(id: OpId) -> u64 {
        id.to_u64()
    }
}

impl From<u64> for OpId {
    fn from(raw: u64) -> Self {
        OpId::from_u64(raw)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({self})")
    }
}
