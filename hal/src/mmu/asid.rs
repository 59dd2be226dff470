//! # Address Space Identifiers
//!
//! Both backends tag non-global TLB entries with an ASID. The kernel runs a
//! single address space for now, so every caller passes [`Asid::KERNEL`];
//! the scoped flushes exist for per-process management later on.

use core::fmt;

/// Address space identifier (16 bits on both backends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Asid(u16);

impl Asid {
    /// The kernel's address space
    pub const KERNEL: Self = Self(0);

    /// Create a new ASID
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Check if this is the kernel ASID
    pub const fn is_kernel(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Asid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ASID({})", self.0)
    }
}
