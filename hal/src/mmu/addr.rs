//! # Address Types
//!
//! Type-safe physical and virtual addresses plus the page sizes shared by
//! both backends (4 KiB granule, 9 index bits per level).

use core::fmt;
use core::ops::{Add, Sub};

use super::{INDEX_BITS, INDEX_MASK, PAGE_SHIFT};

// =============================================================================
// Page Size
// =============================================================================

/// Mapping granularities reachable with a 4 KiB granule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageSize {
    /// 4 KiB page (final level)
    Size4K,
    /// 2 MiB superpage (one level above the final one)
    Size2M,
    /// 1 GiB superpage (two levels above the final one)
    Size1G,
}

impl PageSize {
    /// Get the size in bytes
    #[inline]
    pub const fn size(self) -> u64 {
        1 << self.shift()
    }

    /// Get the shift (log2 of size)
    #[inline]
    pub const fn shift(self) -> u32 {
        match self {
            PageSize::Size4K => 12,
            PageSize::Size2M => 21,
            PageSize::Size1G => 30,
        }
    }

    /// Offset mask within a page of this size
    #[inline]
    pub const fn offset_mask(self) -> u64 {
        self.size() - 1
    }

    /// Table level (0 = final level) whose leaves have this size
    #[inline]
    pub const fn level(self) -> usize {
        match self {
            PageSize::Size4K => 0,
            PageSize::Size2M => 1,
            PageSize::Size1G => 2,
        }
    }

    /// Page size of a leaf found at `level`, if that level may hold leaves
    #[inline]
    pub const fn from_level(level: usize) -> Option<Self> {
        match level {
            0 => Some(PageSize::Size4K),
            1 => Some(PageSize::Size2M),
            2 => Some(PageSize::Size1G),
            _ => None,
        }
    }

    /// Check if an address is aligned to this page size
    #[inline]
    pub const fn is_aligned(self, addr: u64) -> bool {
        addr & self.offset_mask() == 0
    }

    /// Align an address down to this page size
    #[inline]
    pub const fn align_down(self, addr: u64) -> u64 {
        addr & !self.offset_mask()
    }

    /// Align an address up to this page size
    #[inline]
    pub const fn align_up(self, addr: u64) -> u64 {
        (addr + self.offset_mask()) & !self.offset_mask()
    }

    /// Align an address up to this page size, `None` past the top of memory
    #[inline]
    pub const fn checked_align_up(self, addr: u64) -> Option<u64> {
        match addr.checked_add(self.offset_mask()) {
            Some(sum) => Some(sum & !self.offset_mask()),
            None => None,
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Size4K => write!(f, "4KiB"),
            PageSize::Size2M => write!(f, "2MiB"),
            PageSize::Size1G => write!(f, "1GiB"),
        }
    }
}

// =============================================================================
// Physical Address
// =============================================================================

/// A physical memory address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Null physical address
    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if the address is aligned to the given page size
    #[inline]
    pub const fn is_aligned(self, size: PageSize) -> bool {
        size.is_aligned(self.0)
    }

    /// Align down to the given page size
    #[inline]
    pub const fn align_down(self, size: PageSize) -> Self {
        Self(size.align_down(self.0))
    }

    /// Align up to the given page size
    #[inline]
    pub const fn align_up(self, size: PageSize) -> Self {
        Self(size.align_up(self.0))
    }

    /// Align up to the given page size, `None` on overflow
    #[inline]
    pub const fn checked_align_up(self, size: PageSize) -> Option<Self> {
        match size.checked_align_up(self.0) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Add `rhs`, `None` on overflow
    #[inline]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Physical frame number (address >> 12)
    #[inline]
    pub const fn frame_number(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<u64> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = u64;

    fn sub(self, rhs: PhysAddr) -> u64 {
        self.0 - rhs.0
    }
}

// =============================================================================
// Virtual Address
// =============================================================================

/// A virtual memory address
///
/// No canonical form is enforced here: canonicality is a property of the
/// active backend (see [`super::Architecture::is_canonical`]).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a virtual address from a pointer
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Get the address as a mutable pointer
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }

    /// Offset within the 4 KiB page
    #[inline]
    pub const fn page_offset(self) -> u64 {
        self.0 & PageSize::Size4K.offset_mask()
    }

    /// Table index for `level` (0 = final level)
    #[inline]
    pub const fn table_index(self, level: usize) -> usize {
        ((self.0 >> (PAGE_SHIFT + INDEX_BITS * level as u32)) & INDEX_MASK) as usize
    }

    /// Check if the address is aligned to the given page size
    #[inline]
    pub const fn is_aligned(self, size: PageSize) -> bool {
        size.is_aligned(self.0)
    }

    /// Align down to the given page size
    #[inline]
    pub const fn align_down(self, size: PageSize) -> Self {
        Self(size.align_down(self.0))
    }

    /// Add `rhs`, `None` past the top of the address space
    #[inline]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<u64> for VirtAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

// =============================================================================
// Tests
// =============================================================================
