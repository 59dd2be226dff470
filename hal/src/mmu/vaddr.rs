//! # Virtual Address Parser
//!
//! Splits a raw address into one 9-bit index per level plus the 12-bit page
//! offset, and records whether the active backend considers it canonical.
//!
//! ```text
//!   AArch64 (48-bit, 4 levels)       RISC-V Sv39 (39-bit, 3 levels)
//!   63   48 47  39 38  30 29  21 20  12 11   0
//!  ┌──────┬──────┬──────┬──────┬──────┬──────┐
//!  │ sign │  L0  │  L1  │  L2  │  L3  │ off  │   level 3 … level 0
//!  └──────┴──────┴──────┴──────┴──────┴──────┘
//!  ┌─────────────┬──────┬──────┬──────┬──────┐
//!  │    sign     │VPN[2]│VPN[1]│VPN[0]│ off  │   level 2 … level 0
//!  └─────────────┴──────┴──────┴──────┴──────┘
//! ```

use core::fmt;

use super::addr::VirtAddr;
use super::{Architecture, MAX_LEVELS};

/// Per-level decomposition of a virtual address
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddressParts {
    /// Indices, root level first
    indices: [u16; MAX_LEVELS],
    levels: u8,
    offset: u16,
    canonical: bool,
}

impl VirtualAddressParts {
    /// Parse `va` for the hierarchy of `A`
    pub fn parse<A: Architecture>(va: VirtAddr) -> Self {
        let mut indices = [0u16; MAX_LEVELS];
        for (slot, level) in indices.iter_mut().zip((0..A::LEVELS).rev()) {
            *slot = va.table_index(level) as u16;
        }

        Self {
            indices,
            levels: A::LEVELS as u8,
            offset: va.page_offset() as u16,
            canonical: A::is_canonical(va),
        }
    }

    /// Indices from the root down to the final level
    pub fn indices(&self) -> &[u16] {
        &self.indices[..self.levels as usize]
    }

    /// Index used at `level` (0 = final level)
    pub fn index(&self, level: usize) -> usize {
        self.indices[self.levels as usize - 1 - level] as usize
    }

    /// Number of levels in the hierarchy
    pub fn levels(&self) -> usize {
        self.levels as usize
    }

    /// Byte offset within the 4 KiB page
    pub fn offset(&self) -> u64 {
        self.offset as u64
    }

    /// Check if the address is translatable at all
    pub fn is_canonical(&self) -> bool {
        self.canonical
    }
}

impl fmt::Debug for VirtualAddressParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualAddressParts")
            .field("indices", &self.indices())
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("canonical", &self.canonical)
            .finish()
    }
}

/// True if bits above `va_bits - 1` all equal bit `va_bits - 1`
#[inline]
pub const fn is_sign_extended(va: u64, va_bits: u32) -> bool {
    let shift = 64 - va_bits;
    (((va << shift) as i64) >> shift) as u64 == va
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::AArch64;
    use crate::arch::riscv64::Riscv64;

    #[test]
    fn test_parse_aarch64() {
        let parts = VirtualAddressParts::parse::<AArch64>(VirtAddr::new(0xFFFF_0000_4008_0123));
        assert!(parts.is_canonical());
        assert_eq!(parts.indices(), &[0, 1, 0, 0x80]);
        assert_eq!(parts.index(2), 1);
        assert_eq!(parts.offset(), 0x123);
    }

    #[test]
    fn test_parse_sv39() {
        let parts = VirtualAddressParts::parse::<Riscv64>(VirtAddr::new(0xFFFF_FFC0_4008_0000));
        assert!(parts.is_canonical());
        assert_eq!(parts.levels(), 3);
        assert_eq!(parts.indices(), &[257, 0, 0x80]);
    }

    #[test]
    fn test_parse_non_canonical() {
        let parts = VirtualAddressParts::parse::<Riscv64>(VirtAddr::new(0x0000_0040_0000_0000));
        assert!(!parts.is_canonical());
    }

    #[test]
    fn test_sign_extension() {
        assert!(is_sign_extended(0x0000_003F_FFFF_FFFF, 39));
        assert!(is_sign_extended(0xFFFF_FFC0_0000_0000, 39));
        assert!(!is_sign_extended(0x0000_0040_0000_0000, 39));
        assert!(!is_sign_extended(0xFFFF_FFBF_FFFF_FFFF, 39));
    }
}
