//! # satp Register
//!
//! ```text
//! 63    60 59         44 43                            0
//! +-------+-------------+-------------------------------+
//! | MODE  |    ASID     |             PPN               |
//! +-------+-------------+-------------------------------+
//! ```

use core::fmt;

use crate::mmu::{Asid, PhysAddr};

/// Translation modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SatpMode {
    /// No translation
    #[default]
    Bare = 0,
    /// 39-bit virtual addresses, three levels
    Sv39 = 8,
}

impl SatpMode {
    /// Decode the MODE field
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Bare),
            8 => Some(Self::Sv39),
            _ => None,
        }
    }
}

/// satp value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Satp {
    bits: u64,
}

impl Satp {
    /// Mode field shift
    pub const MODE_SHIFT: u64 = 60;
    /// Mode field mask
    pub const MODE_MASK: u64 = 0xF << Self::MODE_SHIFT;
    /// ASID field shift
    pub const ASID_SHIFT: u64 = 44;
    /// ASID field mask
    pub const ASID_MASK: u64 = 0xFFFF << Self::ASID_SHIFT;
    /// PPN field mask
    pub const PPN_MASK: u64 = (1 << 44) - 1;

    /// Compose a value for `root`
    pub const fn new(mode: SatpMode, asid: Asid, root: PhysAddr) -> Self {
        let bits = ((mode as u64) << Self::MODE_SHIFT)
            | ((asid.value() as u64) << Self::ASID_SHIFT)
            | ((root.as_u64() >> 12) & Self::PPN_MASK);
        Self { bits }
    }

    /// Create from raw value
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Raw value
    pub const fn bits(self) -> u64 {
        self.bits
    }

    /// Mode field, `Bare` if unrecognised
    pub const fn mode(self) -> SatpMode {
        match SatpMode::from_u8(((self.bits & Self::MODE_MASK) >> Self::MODE_SHIFT) as u8) {
            Some(mode) => mode,
            None => SatpMode::Bare,
        }
    }

    /// ASID field
    pub const fn asid(self) -> Asid {
        Asid::new(((self.bits & Self::ASID_MASK) >> Self::ASID_SHIFT) as u16)
    }

    /// Physical address of the root table
    pub const fn root(self) -> PhysAddr {
        PhysAddr::new((self.bits & Self::PPN_MASK) << 12)
    }
}

impl fmt::Display for Satp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} asid={} root={}", self.mode(), self.asid(), self.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sv39_encoding() {
        let satp = Satp::new(SatpMode::Sv39, Asid::KERNEL, PhysAddr::new(0x8020_3000));
        assert_eq!(satp.bits(), (8 << 60) | 0x80203);
        assert_eq!(satp.mode(), SatpMode::Sv39);
        assert_eq!(satp.root(), PhysAddr::new(0x8020_3000));
        assert!(satp.asid().is_kernel());
    }

    #[test]
    fn test_asid_field() {
        let satp = Satp::new(SatpMode::Sv39, Asid::new(0x1234), PhysAddr::new(0));
        assert_eq!(satp.asid().value(), 0x1234);
        assert_eq!(Satp::from_bits(0).mode(), SatpMode::Bare);
    }

    #[test]
    fn test_unsupported_mode_reads_as_bare() {
        assert_eq!(SatpMode::from_u8(9), None);
        assert_eq!(Satp::from_bits(9 << 60).mode(), SatpMode::Bare);
        assert_eq!(SatpMode::from_u8(8), Some(SatpMode::Sv39));
    }
}
