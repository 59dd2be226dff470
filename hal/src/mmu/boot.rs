//! # Boot Sequencer
//!
//! Takes the boot core from physical addressing to a hardened higher-half
//! kernel. The sequence is strictly linear:
//!
//! ```text
//!  Untranslated ──init──► IdentityActive ──enter_higher_half──► HigherHalf
//!                                                                   │
//!        Hardened ◄──remove_identity_mapping── PhysmapExpanded ◄────┘
//!                                                     expand_physmap
//! ```
//!
//! Boot mappings are 1 GiB superpages so that no table allocator is needed:
//! every table touched here is part of the statically allocated roots.
//! Only local TLB flushes are used; no other core runs yet and broadcast
//! invalidation can fault before translation is globally enabled.
//!
//! Nothing here takes a lock. `KernelSpace` is handed around by `&mut`
//! during boot and published behind a `spin::Mutex` afterwards.

use core::fmt;
use core::marker::PhantomData;

use super::addr::{PageSize, PhysAddr, VirtAddr};
use super::entry::PageTableEntry;
use super::error::{BootError, MapResult};
use super::flags::MapFlags;
use super::phys::{DirectMap, PhysMapper};
use super::tlb::{self, TlbScope};
use super::walker::Translation;
use super::{mapper, walker, Architecture, RootTables, GIB};

/// Bytes reserved after the kernel load address for the image
pub const KERNEL_IMAGE_RESERVE: u64 = 64 << 20;

/// Bytes reserved after the boot blob (flattened device tree)
pub const BOOT_BLOB_RESERVE: u64 = 2 << 20;

// =============================================================================
// Boot Stage
// =============================================================================

/// Boot progress of the kernel address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootStage {
    /// Executing at physical addresses, no tables
    Untranslated,
    /// Translation on, identity and physmap both present
    IdentityActive,
    /// SP and PC moved into the physmap
    HigherHalf,
    /// Physmap covers all discovered RAM
    PhysmapExpanded,
    /// Identity mapping destroyed
    Hardened,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Untranslated => "untranslated",
            Self::IdentityActive => "identity-active",
            Self::HigherHalf => "higher-half",
            Self::PhysmapExpanded => "physmap-expanded",
            Self::Hardened => "hardened",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Higher-Half Jump
// =============================================================================

/// Permission to leave the identity mapping, obtained from
/// [`KernelSpace::enter_higher_half`].
#[must_use = "the jump only happens through `HigherHalfJump::jump`"]
pub struct HigherHalfJump<A> {
    _arch: PhantomData<A>,
}

impl<A: Architecture> HigherHalfJump<A> {
    /// Rebase SP and `entry` by the kernel virtual base and branch there.
    ///
    /// # Safety
    ///
    /// Nothing on the current stack may hold a physical pointer that is
    /// used after the jump. `entry` must be reachable through the physmap.
    pub unsafe fn jump(self, entry: extern "C" fn() -> !) -> ! {
        // SAFETY: the sequencer reached HigherHalf, so the physmap is live
        unsafe { A::jump_to_higher_half(entry) }
    }
}

impl<A: Architecture> fmt::Debug for HigherHalfJump<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HigherHalfJump(+{:#x})", A::KERNEL_VIRT_BASE)
    }
}

// =============================================================================
// Kernel Address Space
// =============================================================================

/// The kernel's translation tables and their boot progress.
///
/// Owns the root tables for the lifetime of the kernel. After boot every
/// mapping operation goes through here with the tables of the right root
/// register picked from the address.
pub struct KernelSpace<A: Architecture, M: PhysMapper = DirectMap<A>> {
    roots: A::Roots,
    stage: BootStage,
    mapper: M,
    boot_range: (PhysAddr, PhysAddr),
    physmap_end: PhysAddr,
}

impl<A: Architecture, M: PhysMapper> KernelSpace<A, M> {
    /// Create an empty, untranslated address space
    pub const fn new(mapper: M) -> Self {
        Self {
            roots: <A::Roots as RootTables>::EMPTY,
            stage: BootStage::Untranslated,
            mapper,
            boot_range: (PhysAddr::zero(), PhysAddr::zero()),
            physmap_end: PhysAddr::zero(),
        }
    }

    /// Current boot stage
    pub fn stage(&self) -> BootStage {
        self.stage
    }

    /// Root tables
    pub fn roots(&self) -> &A::Roots {
        &self.roots
    }

    /// Physical range mapped by `init`
    pub fn boot_range(&self) -> (PhysAddr, PhysAddr) {
        self.boot_range
    }

    /// End of the physical range reachable through the physmap
    pub fn physmap_end(&self) -> PhysAddr {
        self.physmap_end
    }

    fn require(&self, expected: BootStage) -> Result<(), BootError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(BootError::OutOfOrder {
                expected,
                found: self.stage,
            })
        }
    }

    /// GiB-aligned range covering the kernel image and the boot blob.
    ///
    /// A null `boot_blob` contributes nothing. `None` if the range runs
    /// past the top of the physical address space.
    pub fn covering_range(kernel_phys_load: PhysAddr, boot_blob: PhysAddr) -> Option<(PhysAddr, PhysAddr)> {
        let mut start = kernel_phys_load;
        let mut end = kernel_phys_load.checked_add(KERNEL_IMAGE_RESERVE)?;

        if boot_blob != PhysAddr::zero() {
            start = start.min(boot_blob);
            end = end.max(boot_blob.checked_add(BOOT_BLOB_RESERVE)?);
        }

        Some((start.align_down(PageSize::Size1G), end.checked_align_up(PageSize::Size1G)?))
    }

    // =========================================================================
    // Boot Transitions
    // =========================================================================

    /// Build identity + physmap superpages for the boot range and turn
    /// translation on.
    ///
    /// # Safety
    ///
    /// Boot core only, executing untranslated, with `self` at its physical
    /// address. `kernel_phys_load` must be where the running image lives.
    pub unsafe fn init(&mut self, kernel_phys_load: PhysAddr, boot_blob: PhysAddr) -> Result<(), BootError> {
        self.require(BootStage::Untranslated)?;

        let capacity = <A::Roots as RootTables>::IDENTITY_CAPACITY.min(<A::Roots as RootTables>::PHYSMAP_CAPACITY);
        let (start, end) = Self::covering_range(kernel_phys_load, boot_blob).ok_or(BootError::OutOfRange {
            end: PhysAddr::new(u64::MAX),
            capacity,
        })?;
        let out_of_range = BootError::OutOfRange { end, capacity };
        if end.as_u64() > capacity {
            return Err(out_of_range);
        }

        self.roots.link();

        let first = start.as_u64() / GIB;
        let last = end.as_u64() / GIB;
        for gib in first..last {
            let leaf = A::Entry::leaf(PhysAddr::new(gib * GIB), MapFlags::KERNEL_RWX, PageSize::Size1G);
            *self.roots.identity_slot(gib as usize).ok_or(out_of_range)? = leaf;
            *self.roots.physmap_slot(gib as usize).ok_or(out_of_range)? = leaf;
        }

        A::store_barrier();
        // SAFETY: the running image lies inside the identity range just built
        unsafe { A::enable_translation(&self.roots) };

        self.boot_range = (start, end);
        self.physmap_end = end;
        self.stage = BootStage::IdentityActive;

        log::info!(
            "MMU: {} identity + physmap active, {}..{} ({} GiB)",
            A::NAME,
            start,
            end,
            last - first
        );
        Ok(())
    }

    /// Mark the move to the higher half and hand out the jump.
    pub fn enter_higher_half(&mut self) -> Result<HigherHalfJump<A>, BootError> {
        self.require(BootStage::IdentityActive)?;
        self.stage = BootStage::HigherHalf;
        log::debug!("MMU: jumping to higher half (+{:#x})", A::KERNEL_VIRT_BASE);
        Ok(HigherHalfJump { _arch: PhantomData })
    }

    /// Extend the physmap over `[RAM_BASE, RAM_BASE + ram_size)`.
    ///
    /// Slots already mapped are kept. RAM beyond the physmap capacity is
    /// left unmapped with a warning. Returns the number of GiB added.
    pub fn expand_physmap(&mut self, ram_size: u64) -> Result<usize, BootError> {
        self.require(BootStage::HigherHalf)?;

        let capacity = <A::Roots as RootTables>::PHYSMAP_CAPACITY;
        let mut end = A::RAM_BASE.saturating_add(ram_size);
        if end > capacity {
            log::warn!(
                "MMU: RAM ends at {:#x}, physmap stops at {:#x}; {} MiB unreachable",
                end,
                capacity,
                (end - capacity) >> 20
            );
            end = capacity;
        }

        let first = A::RAM_BASE / GIB;
        let last = end.div_ceil(GIB);
        let mut added = 0;
        for gib in first..last {
            let slot = self.roots.physmap_slot(gib as usize).ok_or(BootError::OutOfRange {
                end: PhysAddr::new(last * GIB),
                capacity,
            })?;
            if slot.is_valid() {
                continue;
            }
            *slot = A::Entry::leaf(PhysAddr::new(gib * GIB), MapFlags::KERNEL_RW, PageSize::Size1G);
            added += 1;
        }

        A::store_barrier();
        tlb::flush::<A>(TlbScope::Local);

        self.physmap_end = self.physmap_end.max(PhysAddr::new(last * GIB));
        self.stage = BootStage::PhysmapExpanded;

        log::info!("MMU: physmap expanded to {} (+{} GiB)", self.physmap_end, added);
        Ok(added)
    }

    /// Destroy the identity mapping. One way: it is never rebuilt.
    pub fn remove_identity_mapping(&mut self) -> Result<(), BootError> {
        self.require(BootStage::PhysmapExpanded)?;

        self.roots.clear_identity();
        A::store_barrier();
        tlb::flush::<A>(TlbScope::Local);

        self.stage = BootStage::Hardened;
        log::info!("MMU: identity mapping removed");
        Ok(())
    }

    // =========================================================================
    // Mapping API
    // =========================================================================

    /// Physical address backing `va`
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        // SAFETY: every table reachable from the roots was installed through
        // this address space
        unsafe { walker::translate::<A, M>(self.roots.root(va), va, &self.mapper) }
    }

    /// Physical address, leaf and page size backing `va`
    pub fn translate_detailed(&self, va: VirtAddr) -> Option<Translation<A::Entry>> {
        // SAFETY: see `translate`
        unsafe { walker::translate_detailed::<A, M>(self.roots.root(va), va, &self.mapper) }
    }

    /// Check if `va` translates to anything
    pub fn is_mapped(&self, va: VirtAddr) -> bool {
        self.translate(va).is_some()
    }

    /// Final-level slot for `va`; see [`walker::walk`].
    ///
    /// # Safety
    ///
    /// Writes through the slot bypass every check of the mapper.
    pub unsafe fn walk(&mut self, va: VirtAddr) -> Option<&mut A::Entry> {
        // SAFETY: see `translate`
        unsafe { walker::walk::<A, M>(self.roots.root_mut(va), va, &self.mapper) }
    }

    /// Map one 4 KiB page; see [`mapper::map_page`].
    ///
    /// # Safety
    ///
    /// The new mapping must not alias memory Rust code relies on being
    /// exclusively owned.
    pub unsafe fn map_page(&mut self, va: VirtAddr, pa: PhysAddr, flags: MapFlags) -> MapResult<()> {
        // SAFETY: tables are owned by `self`; aliasing is the caller's
        unsafe { mapper::map_page::<A, M>(self.roots.root_mut(va), va, pa, flags, &self.mapper) }
    }

    /// Map one 4 KiB page, allocating tables; see [`mapper::map_page_with_alloc`].
    ///
    /// # Safety
    ///
    /// Same as [`Self::map_page`]. `alloc` must hand out zeroed pages
    /// reachable through the physmap.
    pub unsafe fn map_page_with_alloc<F>(&mut self, va: VirtAddr, pa: PhysAddr, flags: MapFlags, alloc: F) -> MapResult<()>
    where
        F: FnMut() -> Option<VirtAddr>,
    {
        // SAFETY: forwarded from the caller
        unsafe { mapper::map_page_with_alloc::<A, M, F>(self.roots.root_mut(va), va, pa, flags, &self.mapper, alloc) }
    }

    /// Map a contiguous range; see [`mapper::map_range_with_alloc`].
    ///
    /// # Safety
    ///
    /// Same as [`Self::map_page_with_alloc`].
    pub unsafe fn map_range_with_alloc<F>(
        &mut self,
        va: VirtAddr,
        pa: PhysAddr,
        size: u64,
        flags: MapFlags,
        alloc: F,
    ) -> MapResult<()>
    where
        F: FnMut() -> Option<VirtAddr>,
    {
        // SAFETY: forwarded from the caller
        unsafe { mapper::map_range_with_alloc::<A, M, F>(self.roots.root_mut(va), va, pa, size, flags, &self.mapper, alloc) }
    }

    /// Unmap one 4 KiB page without flushing; see [`mapper::unmap_page`].
    ///
    /// # Safety
    ///
    /// Nothing may access `va` until the caller has flushed it.
    pub unsafe fn unmap_page(&mut self, va: VirtAddr) -> MapResult<PhysAddr> {
        // SAFETY: forwarded from the caller
        unsafe { mapper::unmap_page::<A, M>(self.roots.root_mut(va), va, &self.mapper) }
    }

    /// Unmap one 4 KiB page and flush it.
    ///
    /// # Safety
    ///
    /// Nothing may still hold references into the page.
    pub unsafe fn unmap_page_and_flush(&mut self, va: VirtAddr) -> MapResult<PhysAddr> {
        // SAFETY: forwarded from the caller
        unsafe { mapper::unmap_page_and_flush::<A, M>(self.roots.root_mut(va), va, &self.mapper) }
    }

    /// Unmap a range and flush it; see [`mapper::unmap_range`].
    ///
    /// # Safety
    ///
    /// Nothing may still hold references into the range.
    pub unsafe fn unmap_range(&mut self, va: VirtAddr, size: u64) -> MapResult<usize> {
        // SAFETY: forwarded from the caller
        unsafe { mapper::unmap_range::<A, M>(self.roots.root_mut(va), va, size, &self.mapper) }
    }

    /// Change permissions of a 4 KiB page; see [`mapper::protect`].
    ///
    /// # Safety
    ///
    /// Live references into the page must stay valid under `flags`.
    pub unsafe fn protect(&mut self, va: VirtAddr, flags: MapFlags) -> MapResult<MapFlags> {
        // SAFETY: forwarded from the caller
        unsafe { mapper::protect::<A, M>(self.roots.root_mut(va), va, flags, &self.mapper) }
    }

    /// Invalidate translations in `scope`
    pub fn flush(&self, scope: TlbScope) {
        tlb::flush::<A>(scope);
    }

    /// Log the tables behind `va` at `debug` level
    #[cfg(feature = "debug")]
    pub fn dump(&self, va: VirtAddr) {
        // SAFETY: see `translate`
        unsafe { walker::dump::<A, M>(self.roots.root(va), &self.mapper) }
    }
}

impl<A: Architecture, M: PhysMapper + fmt::Debug> fmt::Debug for KernelSpace<A, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelSpace")
            .field("arch", &A::NAME)
            .field("stage", &self.stage)
            .field("mapper", &self.mapper)
            .field("boot_range", &self.boot_range)
            .field("physmap_end", &self.physmap_end)
            .field("roots", &self.roots)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::AArch64;
    use crate::arch::riscv64::Riscv64;
    use crate::mmu::phys::{host_alloc, IdentityMap};
    use crate::mmu::PAGE_SIZE;
    use crate::sim;

    const KERNEL_LOAD: PhysAddr = PhysAddr::new(0x4008_0000);

    fn booted<A: Architecture>() -> Box<KernelSpace<A, IdentityMap>> {
        let mut space = Box::new(KernelSpace::<A, IdentityMap>::new(IdentityMap));
        unsafe { space.init(KERNEL_LOAD, PhysAddr::zero()) }.expect("init");
        space
    }

    fn boot_scenario<A: Architecture>() {
        let mut space = booted::<A>();
        assert_eq!(space.stage(), BootStage::IdentityActive);
        assert_eq!(
            space.boot_range(),
            (PhysAddr::new(0x4000_0000), PhysAddr::new(0x8000_0000))
        );

        let low = VirtAddr::new(KERNEL_LOAD.as_u64());
        let high = VirtAddr::new(A::KERNEL_VIRT_BASE + KERNEL_LOAD.as_u64());
        assert_eq!(space.translate(low), Some(KERNEL_LOAD));
        assert_eq!(space.translate(high), Some(KERNEL_LOAD));

        let t = space.translate_detailed(high).expect("physmap");
        assert_eq!(t.size, PageSize::Size1G);
        assert_eq!(t.entry.flags(), MapFlags::KERNEL_RWX);

        let _jump = space.enter_higher_half().expect("higher half");

        let ram = 2 * GIB;
        space.expand_physmap(ram).expect("expand");
        let last_gib = VirtAddr::new(A::KERNEL_VIRT_BASE + A::RAM_BASE + ram - GIB);
        let t = space.translate_detailed(last_gib).expect("expanded");
        assert_eq!(t.entry.flags(), MapFlags::KERNEL_RW);
        assert_eq!(
            space.translate(VirtAddr::new(A::KERNEL_VIRT_BASE + A::RAM_BASE + ram - PAGE_SIZE)),
            Some(PhysAddr::new(A::RAM_BASE + ram - PAGE_SIZE))
        );
        assert!(!space.is_mapped(VirtAddr::new(A::KERNEL_VIRT_BASE + A::RAM_BASE + ram)));
        // identity structure untouched by expansion
        assert!(!space.is_mapped(VirtAddr::new(A::RAM_BASE + ram - GIB)));

        space.remove_identity_mapping().expect("harden");
        assert_eq!(space.stage(), BootStage::Hardened);
        assert_eq!(space.translate(low), None);
        assert_eq!(space.translate(high), Some(KERNEL_LOAD));
    }

    #[test]
    fn test_boot_scenario_aarch64() {
        boot_scenario::<AArch64>();
    }

    #[test]
    fn test_boot_scenario_riscv64() {
        boot_scenario::<Riscv64>();
    }

    #[test]
    fn test_covering_range() {
        type Space = KernelSpace<AArch64, IdentityMap>;

        let (start, end) = Space::covering_range(KERNEL_LOAD, PhysAddr::zero()).expect("range");
        assert_eq!((start.as_u64(), end.as_u64()), (0x4000_0000, 0x8000_0000));

        // kernel image reserve crosses into the next GiB
        let (start, end) = Space::covering_range(PhysAddr::new(0x7E00_0000), PhysAddr::zero()).expect("range");
        assert_eq!((start.as_u64(), end.as_u64()), (0x4000_0000, 0xC000_0000));

        // blob below the kernel
        let (start, end) = Space::covering_range(KERNEL_LOAD, PhysAddr::new(0x3FF0_0000)).expect("range");
        assert_eq!((start.as_u64(), end.as_u64()), (0, 0x8000_0000));

        // no room above the top GiB
        let top = PhysAddr::new(0xFFFF_FFFF_FFFF_F000);
        assert_eq!(Space::covering_range(top, PhysAddr::zero()), None);
        assert_eq!(Space::covering_range(KERNEL_LOAD, top), None);
        assert_eq!(Space::covering_range(PhysAddr::new(0xFFFF_FFFF_C000_0000), PhysAddr::zero()), None);
    }

    #[test]
    fn test_out_of_order_transitions() {
        let mut space = Box::new(KernelSpace::<Riscv64, IdentityMap>::new(IdentityMap));
        assert_eq!(
            space.expand_physmap(GIB).unwrap_err(),
            BootError::OutOfOrder {
                expected: BootStage::HigherHalf,
                found: BootStage::Untranslated,
            }
        );
        assert!(space.enter_higher_half().is_err());

        unsafe { space.init(KERNEL_LOAD, PhysAddr::zero()) }.expect("init");
        assert!(unsafe { space.init(KERNEL_LOAD, PhysAddr::zero()) }.is_err());
        assert!(space.remove_identity_mapping().is_err());

        let _jump = space.enter_higher_half().expect("higher half");
        assert!(space.remove_identity_mapping().is_err());
        space.expand_physmap(GIB).expect("expand");
        space.remove_identity_mapping().expect("harden");
        assert!(space.remove_identity_mapping().is_err());
        assert!(space.expand_physmap(GIB).is_err());
    }

    #[test]
    fn test_boot_range_out_of_capacity() {
        let mut space = Box::new(KernelSpace::<Riscv64, IdentityMap>::new(IdentityMap));
        let far = PhysAddr::new(300 * GIB);
        let err = unsafe { space.init(far, PhysAddr::zero()) }.unwrap_err();
        assert!(matches!(err, BootError::OutOfRange { .. }));
        assert_eq!(space.stage(), BootStage::Untranslated);
    }

    #[test]
    fn test_boot_range_at_top_of_memory() {
        let mut space = Box::new(KernelSpace::<AArch64, IdentityMap>::new(IdentityMap));
        sim::reset();
        let err = unsafe { space.init(PhysAddr::new(0xFFFF_FFFF_FFFF_F000), PhysAddr::zero()) }.unwrap_err();
        assert!(matches!(err, BootError::OutOfRange { .. }));
        assert_eq!(space.stage(), BootStage::Untranslated);
        assert!(sim::take().is_empty());
    }

    #[test]
    fn test_expand_clamps_to_capacity() {
        let mut space = booted::<Riscv64>();
        let _jump = space.enter_higher_half().expect("higher half");
        space.expand_physmap(1 << 40).expect("expand");

        let capacity = <<Riscv64 as Architecture>::Roots as RootTables>::PHYSMAP_CAPACITY;
        assert_eq!(space.physmap_end().as_u64(), capacity);
        let top = VirtAddr::new(Riscv64::KERNEL_VIRT_BASE + (capacity - PAGE_SIZE));
        assert_eq!(space.translate(top), Some(PhysAddr::new(capacity - PAGE_SIZE)));
    }

    #[test]
    fn test_mapping_through_kernel_space() {
        let mut space = booted::<AArch64>();
        let va = VirtAddr::new(0xFFFF_8000_0000_0000);
        let pa = PhysAddr::new(0x4010_0000);
        unsafe {
            assert_eq!(
                space.map_page(va, pa, MapFlags::KERNEL_RW),
                Err(crate::mmu::MapError::TableNotPresent)
            );
            space
                .map_page_with_alloc(va, pa, MapFlags::KERNEL_RW, host_alloc::<crate::arch::aarch64::Descriptor>)
                .expect("map");
        }
        assert_eq!(space.translate(va + 0x42), Some(pa + 0x42));
        assert_eq!(unsafe { space.unmap_page_and_flush(va) }, Ok(pa));
        assert!(!space.is_mapped(va));
    }
}
