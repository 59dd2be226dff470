//! # Physical Memory Access
//!
//! Page tables hold physical addresses; the walker needs a virtual address
//! to dereference them. A [`PhysMapper`] supplies that conversion. After
//! boot it is the physmap ([`DirectMap`]); host-side tests use
//! [`IdentityMap`] so that host heap addresses can stand in for frames.

use core::fmt;
use core::marker::PhantomData;

use super::addr::{PhysAddr, VirtAddr};
use super::table::PageTable;
use super::Architecture;

/// Conversion between physical addresses and dereferenceable addresses
pub trait PhysMapper {
    /// Address at which `pa` can be accessed
    fn phys_to_virt(&self, pa: PhysAddr) -> VirtAddr;

    /// Physical address backing `va`
    fn virt_to_phys(&self, va: VirtAddr) -> PhysAddr;

    /// Reference to the table stored at `pa`.
    ///
    /// # Safety
    ///
    /// `pa` must hold a live page table that nothing else references for
    /// the returned lifetime.
    #[inline]
    unsafe fn table_mut<'a, E>(&self, pa: PhysAddr) -> &'a mut PageTable<E> {
        // SAFETY: caller guarantees a live, unaliased table at `pa`
        unsafe { &mut *self.phys_to_virt(pa).as_mut_ptr::<PageTable<E>>() }
    }
}

// =============================================================================
// Direct Map (physmap)
// =============================================================================

/// The kernel's permanent physmap: `va = pa + KERNEL_VIRT_BASE`
pub struct DirectMap<A>(PhantomData<A>);

impl<A: Architecture> DirectMap<A> {
    /// Create the mapper
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<A: Architecture> PhysMapper for DirectMap<A> {
    #[inline]
    fn phys_to_virt(&self, pa: PhysAddr) -> VirtAddr {
        VirtAddr::new(pa.as_u64().wrapping_add(A::KERNEL_VIRT_BASE))
    }

    #[inline]
    fn virt_to_phys(&self, va: VirtAddr) -> PhysAddr {
        PhysAddr::new(va.as_u64().wrapping_sub(A::KERNEL_VIRT_BASE))
    }
}

impl<A: Architecture> fmt::Debug for DirectMap<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirectMap({}, base {:#x})", A::NAME, A::KERNEL_VIRT_BASE)
    }
}

// =============================================================================
// Identity Map
// =============================================================================

/// `va == pa`. Valid untranslated, and on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMap;

impl PhysMapper for IdentityMap {
    #[inline]
    fn phys_to_virt(&self, pa: PhysAddr) -> VirtAddr {
        VirtAddr::new(pa.as_u64())
    }

    #[inline]
    fn virt_to_phys(&self, va: VirtAddr) -> PhysAddr {
        PhysAddr::new(va.as_u64())
    }
}

// =============================================================================
// Host Test Support
// =============================================================================

/// Heap-allocate an empty table that lives for the rest of the test run
#[cfg(test)]
pub(crate) fn leak_table<E: super::PageTableEntry>() -> &'static mut PageTable<E> {
    std::boxed::Box::leak(std::boxed::Box::new(PageTable::new()))
}

/// Table allocator for `map_page_with_alloc` backed by the host heap
#[cfg(test)]
pub(crate) fn host_alloc<E: super::PageTableEntry>() -> Option<VirtAddr> {
    Some(VirtAddr::from_ptr(leak_table::<E>() as *const PageTable<E>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::AArch64;
    use crate::arch::riscv64::Riscv64;

    #[test]
    fn test_direct_map_round_trip() {
        let map = DirectMap::<AArch64>::new();
        for pa in [0u64, 0x4008_0000, 0x7FFF_F000, 0x1_0000_0000] {
            let va = map.phys_to_virt(PhysAddr::new(pa));
            assert_eq!(va.as_u64(), 0xFFFF_0000_0000_0000 + pa);
            assert_eq!(map.virt_to_phys(va), PhysAddr::new(pa));
        }

        let map = DirectMap::<Riscv64>::new();
        let va = map.phys_to_virt(PhysAddr::new(0x8020_0000));
        assert_eq!(va.as_u64(), 0xFFFF_FFC0_8020_0000);
        assert_eq!(map.virt_to_phys(va).as_u64(), 0x8020_0000);
    }

    #[test]
    fn test_identity_map() {
        let pa = PhysAddr::new(0x1234_5000);
        assert_eq!(IdentityMap.phys_to_virt(pa).as_u64(), pa.as_u64());
        assert_eq!(IdentityMap.virt_to_phys(VirtAddr::new(0x1234_5000)), pa);
    }
}
