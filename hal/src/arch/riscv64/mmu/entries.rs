//! # Sv39 Page Table Entries
//!
//! ```text
//! 63 62 61 60    54 53                        10 9  8 7 6 5 4 3 2 1 0
//! ┌──┬─────┬───────┬────────────────────────────┬────┬─┬─┬─┬─┬─┬─┬─┬─┐
//! │N │PBMT │ res0  │            PPN             │RSW │D│A│G│U│X│W│R│V│
//! └──┴─────┴───────┴────────────────────────────┴────┴─┴─┴─┴─┴─┴─┴─┴─┘
//! ```
//!
//! A valid entry with R, W and X all clear points at the next table; any
//! other valid entry is a leaf at whatever level it sits.
//!
//! Leaves are created with A (and D when writable) already set, so no
//! hardware or software update is ever needed on first access.

use core::fmt;

use crate::mmu::addr::{PageSize, PhysAddr};
use crate::mmu::entry::PageTableEntry;
use crate::mmu::flags::MapFlags;
use crate::mmu::table::PageTable;
use crate::mmu::PAGE_SIZE;

bitflags::bitflags! {
    /// Low PTE bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        /// Valid
        const VALID = 1 << 0;
        /// Readable
        const READ = 1 << 1;
        /// Writable
        const WRITE = 1 << 2;
        /// Executable
        const EXEC = 1 << 3;
        /// User accessible
        const USER = 1 << 4;
        /// Global mapping
        const GLOBAL = 1 << 5;
        /// Accessed
        const ACCESSED = 1 << 6;
        /// Dirty
        const DIRTY = 1 << 7;
    }
}

impl PteFlags {
    /// R, W and X together
    pub const RWX: Self = Self::READ.union(Self::WRITE).union(Self::EXEC);
}

/// PPN field shift
pub const PPN_SHIFT: u64 = 10;

/// PPN field mask (44 bits)
pub const PPN_MASK: u64 = ((1 << 44) - 1) << PPN_SHIFT;

/// Svpbmt: non-cacheable, idempotent
pub const PBMT_NC: u64 = 1 << 61;

/// Svpbmt: non-cacheable, strongly ordered I/O
pub const PBMT_IO: u64 = 2 << 61;

/// Svpbmt field mask
pub const PBMT_MASK: u64 = 3 << 61;

/// Sv39 page table entry
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Pte(u64);

static_assertions::assert_eq_size!(Pte, u64);
static_assertions::const_assert_eq!(core::mem::size_of::<PageTable<Pte>>(), PAGE_SIZE as usize);
static_assertions::const_assert_eq!(core::mem::align_of::<PageTable<Pte>>(), PAGE_SIZE as usize);

impl Pte {
    /// Low flag bits
    #[inline]
    pub const fn pte_flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Physical page number
    #[inline]
    pub const fn ppn(self) -> u64 {
        (self.0 & PPN_MASK) >> PPN_SHIFT
    }

    /// Svpbmt memory type bits
    #[inline]
    pub const fn pbmt(self) -> u64 {
        self.0 & PBMT_MASK
    }

    const fn with_ppn(phys: PhysAddr) -> u64 {
        ((phys.as_u64() >> 12) << PPN_SHIFT) & PPN_MASK
    }

    /// Memory-type bits for a device leaf
    const fn device_type() -> u64 {
        if cfg!(feature = "svpbmt") {
            PBMT_IO
        } else {
            0
        }
    }
}

impl PageTableEntry for Pte {
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
        self.pte_flags().contains(PteFlags::VALID)
    }

    #[inline]
    fn is_leaf(self) -> bool {
        self.is_valid() && self.pte_flags().intersects(PteFlags::RWX)
    }

    #[inline]
    fn is_branch(self) -> bool {
        self.is_valid() && !self.pte_flags().intersects(PteFlags::RWX)
    }

    #[inline]
    fn phys_addr(self) -> PhysAddr {
        PhysAddr::new(self.ppn() << 12)
    }

    #[inline]
    fn branch(table: PhysAddr) -> Self {
        Self(Self::with_ppn(table) | PteFlags::VALID.bits())
    }

    fn leaf(phys: PhysAddr, flags: MapFlags, size: PageSize) -> Self {
        debug_assert!(phys.is_aligned(size), "{phys} not aligned to {size}");

        let mut pte = PteFlags::VALID | PteFlags::READ | PteFlags::ACCESSED;
        if flags.is_writable() {
            pte |= PteFlags::WRITE | PteFlags::DIRTY;
        }
        if flags.is_executable() && !flags.is_device() {
            pte |= PteFlags::EXEC;
        }
        if flags.is_user() {
            pte |= PteFlags::USER;
        } else {
            pte |= PteFlags::GLOBAL;
        }

        let memory_type = if flags.is_device() { Self::device_type() } else { 0 };

        Self(Self::with_ppn(phys) | pte.bits() | memory_type)
    }

    fn flags(self) -> MapFlags {
        let pte = self.pte_flags();
        let mut flags = MapFlags::empty();
        if pte.contains(PteFlags::WRITE) {
            flags |= MapFlags::WRITE;
        }
        if pte.contains(PteFlags::EXEC) {
            flags |= MapFlags::EXEC;
        }
        if pte.contains(PteFlags::USER) {
            flags |= MapFlags::USER;
        }
        if self.pbmt() == PBMT_IO {
            flags |= MapFlags::DEVICE;
        }
        flags
    }
}

impl fmt::Debug for Pte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "Pte::Invalid")
        } else if self.is_branch() {
            write!(f, "Pte::Table({})", self.phys_addr())
        } else {
            write!(f, "Pte::Leaf({}, {:?})", self.phys_addr(), self.pte_flags())
        }
    }
}
