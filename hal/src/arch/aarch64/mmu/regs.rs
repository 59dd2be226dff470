//! # Translation Control Values
//!
//! Fixed register images written once by
//! [`enable_translation`](crate::mmu::Architecture::enable_translation).

// =============================================================================
// MAIR_EL1
// =============================================================================

/// Normal memory, inner/outer write-back non-transient, RW allocate
pub const MAIR_NORMAL_WB: u64 = 0xFF;

/// Device-nGnRnE
pub const MAIR_DEVICE_NGNRNE: u64 = 0x00;

/// Normal memory, inner/outer non-cacheable
pub const MAIR_NORMAL_NC: u64 = 0x44;

/// MAIR image matching [`MemoryAttributeIndex`](super::entries::MemoryAttributeIndex)
pub const MAIR_VALUE: u64 = MAIR_NORMAL_WB | (MAIR_DEVICE_NGNRNE << 8) | (MAIR_NORMAL_NC << 16);

// =============================================================================
// TCR_EL1
// =============================================================================

/// TCR_EL1 fields
pub mod tcr {
    /// Region size for TTBR0: 2^(64-T0SZ)
    pub const T0SZ_SHIFT: u64 = 0;
    /// Inner cacheability, TTBR0 walks
    pub const IRGN0_SHIFT: u64 = 8;
    /// Outer cacheability, TTBR0 walks
    pub const ORGN0_SHIFT: u64 = 10;
    /// Shareability, TTBR0 walks
    pub const SH0_SHIFT: u64 = 12;
    /// Granule for TTBR0 (0 = 4 KiB)
    pub const TG0_SHIFT: u64 = 14;
    /// Region size for TTBR1
    pub const T1SZ_SHIFT: u64 = 16;
    /// Inner cacheability, TTBR1 walks
    pub const IRGN1_SHIFT: u64 = 24;
    /// Outer cacheability, TTBR1 walks
    pub const ORGN1_SHIFT: u64 = 26;
    /// Shareability, TTBR1 walks
    pub const SH1_SHIFT: u64 = 28;
    /// Granule for TTBR1 (2 = 4 KiB)
    pub const TG1_SHIFT: u64 = 30;
    /// Intermediate physical address size
    pub const IPS_SHIFT: u64 = 32;
    /// 16-bit ASIDs
    pub const AS: u64 = 1 << 36;

    /// Write-back read/write-allocate cacheable
    pub const RGN_WBWA: u64 = 1;
    /// Inner shareable
    pub const SH_INNER: u64 = 3;
    /// TG0 encoding for 4 KiB
    pub const TG0_4K: u64 = 0;
    /// TG1 encoding for 4 KiB
    pub const TG1_4K: u64 = 2;
    /// 48-bit physical addresses
    pub const IPS_48: u64 = 5;
}

/// Build a TCR_EL1 value for two `va_bits`-wide halves with 4 KiB granules
pub const fn tcr_value(va_bits: u32) -> u64 {
    use tcr::*;
    let tsz = 64 - va_bits as u64;
    (tsz << T0SZ_SHIFT)
        | (RGN_WBWA << IRGN0_SHIFT)
        | (RGN_WBWA << ORGN0_SHIFT)
        | (SH_INNER << SH0_SHIFT)
        | (TG0_4K << TG0_SHIFT)
        | (tsz << T1SZ_SHIFT)
        | (RGN_WBWA << IRGN1_SHIFT)
        | (RGN_WBWA << ORGN1_SHIFT)
        | (SH_INNER << SH1_SHIFT)
        | (TG1_4K << TG1_SHIFT)
        | (IPS_48 << IPS_SHIFT)
        | AS
}

/// TCR image for the 48-bit layout
pub const TCR_VALUE: u64 = tcr_value(super::layout::VA_BITS);

// =============================================================================
// SCTLR_EL1
// =============================================================================

/// MMU enable
pub const SCTLR_M: u64 = 1 << 0;
/// Data cache enable
pub const SCTLR_C: u64 = 1 << 2;
/// Instruction cache enable
pub const SCTLR_I: u64 = 1 << 12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mair_layout() {
        assert_eq!(MAIR_VALUE, 0x44_00FF);
    }

    #[test]
    fn test_tcr_value() {
        assert_eq!(TCR_VALUE & 0x3F, 16);
        assert_eq!((TCR_VALUE >> tcr::T1SZ_SHIFT) & 0x3F, 16);
        assert_eq!((TCR_VALUE >> tcr::TG1_SHIFT) & 0x3, tcr::TG1_4K);
        assert_ne!(TCR_VALUE & tcr::AS, 0);
        assert_eq!(TCR_VALUE, 0x15_B510_3510);
    }
}
