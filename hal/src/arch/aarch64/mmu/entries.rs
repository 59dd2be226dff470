//! # AArch64 Translation Table Descriptors
//!
//! One format for every level of the 4 KiB granule regime:
//!
//! ```text
//! 63  59 58  55 54  53  52  51      48 47                 12 11 10 9 8 7 6 5 4  2 1 0
//! ┌─────┬──────┬───┬───┬───┬──────────┬─────────────────────┬──┬──┬───┬───┬─┬────┬─┬─┐
//! │ tbl │  SW  │UXN│PXN│ C │   res0   │   output address    │nG│AF│SH │AP │NS│Attr│T│V│
//! └─────┴──────┴───┴───┴───┴──────────┴─────────────────────┴──┴──┴───┴───┴─┴────┴─┴─┘
//! ```
//!
//! `T` (bit 1) is the leaf/branch discriminator above L3: set for a table,
//! clear for a block. At L3 a valid page must have `T` set.
//!
//! Permissions are inverted relative to RISC-V: every valid descriptor is
//! readable, `AP[2]` removes write access and `AP[1]` grants EL0 access.

use core::fmt;

use crate::mmu::addr::{PageSize, PhysAddr};
use crate::mmu::entry::PageTableEntry;
use crate::mmu::flags::MapFlags;
use crate::mmu::table::PageTable;
use crate::mmu::PAGE_SIZE;

// =============================================================================
// Descriptor Bits
// =============================================================================

/// Entry present/valid bit
pub const PTE_VALID: u64 = 1 << 0;

/// Table/Page descriptor (0 = block, 1 = table/page)
pub const PTE_TABLE: u64 = 1 << 1;

/// Memory attribute index (bits 4:2)
pub const PTE_ATTR_INDEX_SHIFT: u64 = 2;
/// Memory attribute index mask
pub const PTE_ATTR_INDEX_MASK: u64 = 0x7 << PTE_ATTR_INDEX_SHIFT;

/// Access permission bits (bits 7:6)
pub const PTE_AP_SHIFT: u64 = 6;
/// Access permission mask
pub const PTE_AP_MASK: u64 = 0x3 << PTE_AP_SHIFT;

/// Shareability bits (bits 9:8)
pub const PTE_SH_SHIFT: u64 = 8;

/// Access flag
pub const PTE_AF: u64 = 1 << 10;

/// Not global (tagged with the current ASID)
pub const PTE_NG: u64 = 1 << 11;

/// Privileged execute never
pub const PTE_PXN: u64 = 1 << 53;

/// Unprivileged execute never
pub const PTE_UXN: u64 = 1 << 54;

/// Output address for the 4 KiB granule (bits 47:12)
pub const PTE_ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

// =============================================================================
// Access Permissions
// =============================================================================

/// Access permission values (AP[2:1])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccessPermission {
    /// Kernel read/write, user no access
    KernelRwUserNone = 0b00,
    /// Kernel read/write, user read/write
    KernelRwUserRw = 0b01,
    /// Kernel read-only, user no access
    KernelRoUserNone = 0b10,
    /// Kernel read-only, user read-only
    KernelRoUserRo = 0b11,
}

impl AccessPermission {
    /// Permission for a (write, user) request
    pub const fn for_access(write: bool, user: bool) -> Self {
        match (write, user) {
            (true, false) => Self::KernelRwUserNone,
            (true, true) => Self::KernelRwUserRw,
            (false, false) => Self::KernelRoUserNone,
            (false, true) => Self::KernelRoUserRo,
        }
    }

    /// Convert to descriptor bits
    pub const fn to_bits(self) -> u64 {
        (self as u64) << PTE_AP_SHIFT
    }

    /// Decode from descriptor bits
    pub const fn from_bits(bits: u64) -> Self {
        match (bits >> PTE_AP_SHIFT) & 0x3 {
            0b00 => Self::KernelRwUserNone,
            0b01 => Self::KernelRwUserRw,
            0b10 => Self::KernelRoUserNone,
            _ => Self::KernelRoUserRo,
        }
    }

    /// Check if writable
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::KernelRwUserNone | Self::KernelRwUserRw)
    }

    /// Check if accessible from EL0
    pub const fn is_user_accessible(self) -> bool {
        matches!(self, Self::KernelRwUserRw | Self::KernelRoUserRo)
    }
}

// =============================================================================
// Shareability
// =============================================================================

/// Shareability domain (SH[1:0])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Shareability {
    /// Non-shareable
    NonShareable = 0b00,
    /// Inner shareable
    InnerShareable = 0b11,
}

impl Shareability {
    /// Convert to descriptor bits
    pub const fn to_bits(self) -> u64 {
        (self as u64) << PTE_SH_SHIFT
    }
}

// =============================================================================
// Memory Attributes
// =============================================================================

/// Index into MAIR_EL1 (layout fixed in [`super::regs`])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemoryAttributeIndex {
    /// Normal, write-back cacheable
    NormalWriteBack = 0,
    /// Device-nGnRnE
    Device = 1,
}

impl MemoryAttributeIndex {
    /// Convert to descriptor bits
    pub const fn to_bits(self) -> u64 {
        (self as u64) << PTE_ATTR_INDEX_SHIFT
    }

    /// Decode from descriptor bits
    pub const fn from_bits(bits: u64) -> Self {
        match (bits & PTE_ATTR_INDEX_MASK) >> PTE_ATTR_INDEX_SHIFT {
            1 => Self::Device,
            _ => Self::NormalWriteBack,
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// AArch64 translation table descriptor
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Descriptor(u64);

static_assertions::assert_eq_size!(Descriptor, u64);
static_assertions::const_assert_eq!(core::mem::size_of::<PageTable<Descriptor>>(), PAGE_SIZE as usize);
static_assertions::const_assert_eq!(core::mem::align_of::<PageTable<Descriptor>>(), PAGE_SIZE as usize);

impl Descriptor {
    /// Check if this is a block descriptor (valid, above L3)
    #[inline]
    pub const fn is_block(self) -> bool {
        self.0 & (PTE_VALID | PTE_TABLE) == PTE_VALID
    }

    /// Check if this is a table descriptor (or an L3 page)
    #[inline]
    pub const fn is_table(self) -> bool {
        self.0 & (PTE_VALID | PTE_TABLE) == (PTE_VALID | PTE_TABLE)
    }

    /// Access permission
    pub const fn permission(self) -> AccessPermission {
        AccessPermission::from_bits(self.0)
    }

    /// MAIR index
    pub const fn attr_index(self) -> MemoryAttributeIndex {
        MemoryAttributeIndex::from_bits(self.0)
    }

    /// Check if execute never at EL0
    pub const fn is_uxn(self) -> bool {
        self.0 & PTE_UXN != 0
    }

    /// Check if execute never at EL1
    pub const fn is_pxn(self) -> bool {
        self.0 & PTE_PXN != 0
    }

    /// Check if tagged with an ASID
    pub const fn is_not_global(self) -> bool {
        self.0 & PTE_NG != 0
    }

    /// Check if the access flag is set
    pub const fn is_accessed(self) -> bool {
        self.0 & PTE_AF != 0
    }
}

impl PageTableEntry for Descriptor {
    const INVALID: Self = Self(0);

    #[inline]
    fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    fn is_valid(self) -> bool {
        self.0 & PTE_VALID != 0
    }

    #[inline]
    fn is_leaf(self) -> bool {
        self.is_block()
    }

    #[inline]
    fn is_branch(self) -> bool {
        self.is_table()
    }

    #[inline]
    fn phys_addr(self) -> PhysAddr {
        PhysAddr::new(self.0 & PTE_ADDR_MASK)
    }

    #[inline]
    fn branch(table: PhysAddr) -> Self {
        Self((table.as_u64() & PTE_ADDR_MASK) | PTE_TABLE | PTE_VALID)
    }

    fn leaf(phys: PhysAddr, flags: MapFlags, size: PageSize) -> Self {
        debug_assert!(phys.is_aligned(size), "{phys} not aligned to {size}");

        let device = flags.is_device();
        let user = flags.is_user();
        let exec = flags.is_executable() && !device;

        let (attr, shareability) = if device {
            (MemoryAttributeIndex::Device, Shareability::NonShareable)
        } else {
            (MemoryAttributeIndex::NormalWriteBack, Shareability::InnerShareable)
        };

        let mut bits = (phys.as_u64() & PTE_ADDR_MASK)
            | PTE_VALID
            | PTE_AF
            | attr.to_bits()
            | shareability.to_bits()
            | AccessPermission::for_access(flags.is_writable(), user).to_bits();

        // EL1 never executes user memory
        if user {
            bits |= PTE_NG | PTE_PXN;
            if !exec {
                bits |= PTE_UXN;
            }
        } else {
            bits |= PTE_UXN;
            if !exec {
                bits |= PTE_PXN;
            }
        }

        if size == PageSize::Size4K {
            bits |= PTE_TABLE;
        }

        Self(bits)
    }

    fn flags(self) -> MapFlags {
        let ap = self.permission();
        let mut flags = MapFlags::empty();

        if ap.is_writable() {
            flags |= MapFlags::WRITE;
        }
        if ap.is_user_accessible() {
            flags |= MapFlags::USER;
            if !self.is_uxn() {
                flags |= MapFlags::EXEC;
            }
        } else if !self.is_pxn() {
            flags |= MapFlags::EXEC;
        }
        if self.attr_index() == MemoryAttributeIndex::Device {
            flags |= MapFlags::DEVICE;
        }

        flags
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "Descriptor::Invalid")
        } else if self.is_table() {
            write!(f, "Descriptor::Table({:#x})", self.0 & PTE_ADDR_MASK)
        } else {
            write!(
                f,
                "Descriptor::Block({:#x}, {:?}, {:?})",
                self.0 & PTE_ADDR_MASK,
                self.permission(),
                self.attr_index()
            )
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_leaf_bits() {
        let pte = Descriptor::kernel_leaf(PhysAddr::new(0x4008_0000), true, false);
        assert!(pte.is_valid());
        assert!(pte.is_table(), "L3 pages carry the table bit");
        assert!(pte.is_accessed());
        assert!(!pte.is_not_global());
        assert!(pte.is_pxn() && pte.is_uxn());
        assert_eq!(pte.permission(), AccessPermission::KernelRwUserNone);
        assert_eq!(pte.phys_addr(), PhysAddr::new(0x4008_0000));
        assert_eq!(pte.bits() & (0x3 << PTE_SH_SHIFT), Shareability::InnerShareable.to_bits());
    }

    #[test]
    fn test_read_only_is_inverted() {
        let ro = Descriptor::kernel_leaf(PhysAddr::new(0x1000), false, false);
        assert_ne!(ro.bits() & (1 << 7), 0, "AP[2] set removes write access");
        assert_eq!(ro.flags(), MapFlags::KERNEL_RO);
    }

    #[test]
    fn test_user_leaf() {
        let code = Descriptor::user_leaf(PhysAddr::new(0x2000), false, true);
        assert!(code.is_not_global());
        assert!(code.is_pxn());
        assert!(!code.is_uxn());
        assert_eq!(code.permission(), AccessPermission::KernelRoUserRo);
        assert_eq!(code.flags(), MapFlags::USER_RX);

        let data = Descriptor::user_leaf(PhysAddr::new(0x3000), true, false);
        assert_eq!(data.flags(), MapFlags::USER_RW);
    }

    #[test]
    fn test_device_leaf() {
        let mmio = Descriptor::device_leaf(PhysAddr::new(0x0900_0000));
        assert_eq!(mmio.attr_index(), MemoryAttributeIndex::Device);
        assert!(mmio.is_pxn() && mmio.is_uxn());
        assert_eq!(mmio.flags(), MapFlags::MMIO);
        assert_eq!(mmio.bits() & (0x3 << PTE_SH_SHIFT), Shareability::NonShareable.to_bits());
    }

    #[test]
    fn test_attr_index_decodes_constructor_output() {
        let ram = Descriptor::kernel_leaf(PhysAddr::new(0x4000_0000), true, false);
        assert_eq!(ram.attr_index(), MemoryAttributeIndex::NormalWriteBack);
        assert_eq!(MemoryAttributeIndex::from_bits(MemoryAttributeIndex::Device.to_bits()), MemoryAttributeIndex::Device);
        assert_eq!(MemoryAttributeIndex::from_bits(0), MemoryAttributeIndex::NormalWriteBack);
    }

    #[test]
    fn test_block_vs_table() {
        let block = Descriptor::leaf(PhysAddr::new(0x4000_0000), MapFlags::KERNEL_RWX, PageSize::Size1G);
        assert!(block.is_leaf());
        assert!(!block.is_branch());
        assert_eq!(block.flags(), MapFlags::KERNEL_RWX);

        let table = Descriptor::branch(PhysAddr::new(0x8000_1000));
        assert!(table.is_branch());
        assert!(!table.is_leaf());
        assert_eq!(table.phys_addr(), PhysAddr::new(0x8000_1000));

        assert!(!Descriptor::INVALID.is_leaf());
        assert!(!Descriptor::INVALID.is_branch());
    }
}
