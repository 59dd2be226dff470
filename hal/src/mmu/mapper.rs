//! # Mapping Mutators
//!
//! `map_page`, `map_page_with_alloc` and `unmap_page` plus the range and
//! permission helpers built on them.
//!
//! ## Ordering
//!
//! Every mutator validates its arguments (alignment first, then
//! canonicality) before reading or allocating anything. Range mutators
//! validate the whole range up front: it must not wrap and must stay inside
//! one canonical half. A rejected call leaves the hierarchy untouched. The allocating variant may still link
//! fresh, empty intermediate tables before a later allocation fails; those
//! stay in place and are reused by the next call.
//!
//! ## TLB
//!
//! A successful write is followed by a store barrier only. Flushing is the
//! caller's job so that a batch of mappings costs one flush. `unmap_page_and_flush`,
//! `unmap_range` and `protect` flush for you.
//!
//! ## Locking
//!
//! None. Callers hold the lock that guards `root` (see `crate::kernel_space`).

use super::addr::{PageSize, PhysAddr, VirtAddr};
use super::entry::PageTableEntry;
use super::error::{MapError, MapResult};
use super::flags::MapFlags;
use super::phys::PhysMapper;
use super::table::PageTable;
use super::tlb::{self, TlbScope};
use super::{Architecture, PAGE_SIZE};

// =============================================================================
// Validation
// =============================================================================

#[inline]
fn check_virt<A: Architecture>(va: VirtAddr) -> MapResult<()> {
    if !va.is_aligned(PageSize::Size4K) {
        return Err(MapError::NotAligned);
    }
    if !A::is_canonical(va) {
        return Err(MapError::NotCanonical);
    }
    Ok(())
}

#[inline]
fn check_map<A: Architecture>(va: VirtAddr, pa: PhysAddr) -> MapResult<()> {
    if !pa.is_aligned(PageSize::Size4K) {
        return Err(MapError::NotAligned);
    }
    check_virt::<A>(va)
}

/// `[va, va + size)` is page aligned, does not wrap, and lies in one
/// canonical half.
fn check_range<A: Architecture>(va: VirtAddr, size: u64) -> MapResult<()> {
    if size % PAGE_SIZE != 0 {
        return Err(MapError::NotAligned);
    }
    check_virt::<A>(va)?;
    if size == 0 {
        return Ok(());
    }

    let last = va.checked_add(size - PAGE_SIZE).ok_or(MapError::NotCanonical)?;
    if !A::is_canonical(last) || (va.as_u64() ^ last.as_u64()) >> 63 != 0 {
        return Err(MapError::NotCanonical);
    }
    Ok(())
}

fn check_map_range<A: Architecture>(va: VirtAddr, pa: PhysAddr, size: u64) -> MapResult<()> {
    if !pa.is_aligned(PageSize::Size4K) {
        return Err(MapError::NotAligned);
    }
    if size != 0 && pa.checked_add(size - PAGE_SIZE).is_none() {
        return Err(MapError::NotAligned);
    }
    check_range::<A>(va, size)
}

// =============================================================================
// Leaf Slot Lookup
// =============================================================================

/// Final-level slot for `va`, creating intermediate tables through `alloc`.
///
/// Without an allocator a missing level is `TableNotPresent`; with one, an
/// exhausted allocator is `OutOfMemory`.
unsafe fn leaf_slot<'a, A, M>(
    root: &'a mut PageTable<A::Entry>,
    va: VirtAddr,
    mapper: &M,
    mut alloc: Option<&mut dyn FnMut() -> Option<VirtAddr>>,
) -> MapResult<&'a mut A::Entry>
where
    A: Architecture,
    M: PhysMapper,
{
    let mut table: &'a mut PageTable<A::Entry> = root;

    for level in (1..A::LEVELS).rev() {
        let entry = &mut table[va.table_index(level)];

        if !entry.is_valid() {
            let Some(alloc) = alloc.as_deref_mut() else {
                return Err(MapError::TableNotPresent);
            };
            let fresh = alloc().ok_or(MapError::OutOfMemory)?;
            debug_assert!(fresh.is_aligned(PageSize::Size4K), "table allocator returned {fresh}");
            *entry = A::Entry::branch(mapper.virt_to_phys(fresh));
        } else if entry.is_leaf() {
            return Err(MapError::SuperpageConflict);
        }

        let next = entry.phys_addr();
        // SAFETY: `next` is a branch target installed by us or by the owner
        table = unsafe { mapper.table_mut(next) };
    }

    Ok(&mut table[va.table_index(0)])
}

unsafe fn map_with<A, M>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    pa: PhysAddr,
    flags: MapFlags,
    mapper: &M,
    alloc: Option<&mut dyn FnMut() -> Option<VirtAddr>>,
) -> MapResult<()>
where
    A: Architecture,
    M: PhysMapper,
{
    check_map::<A>(va, pa)?;

    // SAFETY: forwarded from the caller
    let slot = unsafe { leaf_slot::<A, M>(root, va, mapper, alloc)? };
    if slot.is_valid() {
        return Err(MapError::AlreadyMapped);
    }

    *slot = A::Entry::leaf(pa, flags, PageSize::Size4K);
    A::store_barrier();
    Ok(())
}

// =============================================================================
// Map / Unmap
// =============================================================================

/// Map the 4 KiB page at `va` to `pa`.
///
/// Every intermediate level must already exist as a branch.
///
/// # Safety
///
/// All tables reachable from `root` must be live and dereferenceable
/// through `mapper`, and the caller must exclude concurrent mutation.
pub unsafe fn map_page<A, M>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    pa: PhysAddr,
    flags: MapFlags,
    mapper: &M,
) -> MapResult<()>
where
    A: Architecture,
    M: PhysMapper,
{
    // SAFETY: forwarded from the caller
    unsafe { map_with::<A, M>(root, va, pa, flags, mapper, None) }
}

/// Map the 4 KiB page at `va` to `pa`, allocating missing tables.
///
/// `alloc` must return a zeroed, page-aligned address reachable through
/// `mapper`, or `None` when exhausted.
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn map_page_with_alloc<A, M, F>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    pa: PhysAddr,
    flags: MapFlags,
    mapper: &M,
    mut alloc: F,
) -> MapResult<()>
where
    A: Architecture,
    M: PhysMapper,
    F: FnMut() -> Option<VirtAddr>,
{
    // SAFETY: forwarded from the caller
    unsafe { map_with::<A, M>(root, va, pa, flags, mapper, Some(&mut alloc)) }
}

/// Clear the 4 KiB mapping at `va` and return the frame it pointed at.
///
/// No TLB flush; see [`unmap_page_and_flush`].
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn unmap_page<A, M>(root: &mut PageTable<A::Entry>, va: VirtAddr, mapper: &M) -> MapResult<PhysAddr>
where
    A: Architecture,
    M: PhysMapper,
{
    check_virt::<A>(va)?;

    let slot = match unsafe { leaf_slot::<A, M>(root, va, mapper, None) } {
        Ok(slot) => slot,
        Err(MapError::TableNotPresent) => return Err(MapError::NotMapped),
        Err(e) => return Err(e),
    };
    if !slot.is_valid() {
        return Err(MapError::NotMapped);
    }

    let old = slot.phys_addr();
    *slot = A::Entry::INVALID;
    A::store_barrier();
    Ok(old)
}

/// [`unmap_page`] followed by a single-address TLB flush.
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn unmap_page_and_flush<A, M>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    mapper: &M,
) -> MapResult<PhysAddr>
where
    A: Architecture,
    M: PhysMapper,
{
    // SAFETY: forwarded from the caller
    let old = unsafe { unmap_page::<A, M>(root, va, mapper)? };
    tlb::flush::<A>(TlbScope::Address(va));
    Ok(old)
}

// =============================================================================
// Ranges
// =============================================================================

/// Map `size` bytes starting at `va` onto `pa`, page by page.
///
/// The whole range is validated first. After that, mapping stops at the
/// first failure and pages mapped before it stay mapped.
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn map_range<A, M>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    pa: PhysAddr,
    size: u64,
    flags: MapFlags,
    mapper: &M,
) -> MapResult<()>
where
    A: Architecture,
    M: PhysMapper,
{
    check_map_range::<A>(va, pa, size)?;
    for offset in (0..size).step_by(PAGE_SIZE as usize) {
        // SAFETY: forwarded from the caller
        unsafe { map_page::<A, M>(root, va + offset, pa + offset, flags, mapper)? };
    }
    Ok(())
}

/// [`map_range`] with table allocation.
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn map_range_with_alloc<A, M, F>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    pa: PhysAddr,
    size: u64,
    flags: MapFlags,
    mapper: &M,
    mut alloc: F,
) -> MapResult<()>
where
    A: Architecture,
    M: PhysMapper,
    F: FnMut() -> Option<VirtAddr>,
{
    check_map_range::<A>(va, pa, size)?;
    for offset in (0..size).step_by(PAGE_SIZE as usize) {
        // SAFETY: forwarded from the caller
        unsafe { map_with::<A, M>(root, va + offset, pa + offset, flags, mapper, Some(&mut alloc))? };
    }
    Ok(())
}

/// Unmap every mapped page in `[va, va + size)` and flush the range.
///
/// Unmapped pages are skipped. Returns how many pages were cleared. If a
/// page cannot be reached (a superpage covers it), the pages already cleared
/// are flushed before the error is returned.
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn unmap_range<A, M>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    size: u64,
    mapper: &M,
) -> MapResult<usize>
where
    A: Architecture,
    M: PhysMapper,
{
    check_range::<A>(va, size)?;

    let mut cleared = 0;
    for offset in (0..size).step_by(PAGE_SIZE as usize) {
        // SAFETY: forwarded from the caller
        match unsafe { unmap_page::<A, M>(root, va + offset, mapper) } {
            Ok(_) => cleared += 1,
            Err(MapError::NotMapped) => {}
            Err(e) => {
                tlb::flush_range::<A>(va, offset);
                return Err(e);
            }
        }
    }

    tlb::flush_range::<A>(va, size);
    Ok(cleared)
}

// =============================================================================
// Permissions
// =============================================================================

/// Rewrite the permissions of the 4 KiB leaf at `va`, keeping its frame.
///
/// Returns the previous flags and flushes `va`.
///
/// # Safety
///
/// Same requirements as [`map_page`].
pub unsafe fn protect<A, M>(
    root: &mut PageTable<A::Entry>,
    va: VirtAddr,
    flags: MapFlags,
    mapper: &M,
) -> MapResult<MapFlags>
where
    A: Architecture,
    M: PhysMapper,
{
    check_virt::<A>(va)?;

    let slot = match unsafe { leaf_slot::<A, M>(root, va, mapper, None) } {
        Ok(slot) => slot,
        Err(MapError::TableNotPresent) => return Err(MapError::NotMapped),
        Err(e) => return Err(e),
    };
    if !slot.is_valid() {
        return Err(MapError::NotMapped);
    }

    let old = slot.flags();
    *slot = A::Entry::leaf(slot.phys_addr(), flags, PageSize::Size4K);
    A::store_barrier();
    tlb::flush::<A>(TlbScope::Address(va));
    Ok(old)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::{AArch64, Descriptor};
    use crate::arch::riscv64::{Pte, Riscv64};
    use crate::mmu::phys::{host_alloc, leak_table, IdentityMap};
    use crate::mmu::walker::{translate, translate_detailed};
    use crate::sim::{self, HwOp};

    const VA: VirtAddr = VirtAddr::new(0x0000_0000_1234_5000);
    const PA: PhysAddr = PhysAddr::new(0x8765_4000);

    #[test]
    fn test_map_then_translate() {
        let root = leak_table::<Descriptor>();
        unsafe {
            map_page_with_alloc::<AArch64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Descriptor>)
                .expect("map");
            assert_eq!(translate::<AArch64, _>(root, VA + 0x10, &IdentityMap), Some(PA + 0x10));
        }
    }

    #[test]
    fn test_map_twice_is_already_mapped() {
        let root = leak_table::<Pte>();
        unsafe {
            map_page_with_alloc::<Riscv64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Pte>)
                .expect("map");
            let again = map_page::<Riscv64, _>(root, VA, PA + PAGE_SIZE, MapFlags::KERNEL_RW, &IdentityMap);
            assert_eq!(again, Err(MapError::AlreadyMapped));
            assert_eq!(translate::<Riscv64, _>(root, VA, &IdentityMap), Some(PA));
        }
    }

    #[test]
    fn test_unmap_then_translate() {
        let root = leak_table::<Descriptor>();
        unsafe {
            map_page_with_alloc::<AArch64, _, _>(root, VA, PA, MapFlags::USER_RW, &IdentityMap, host_alloc::<Descriptor>)
                .expect("map");
            assert_eq!(unmap_page::<AArch64, _>(root, VA, &IdentityMap), Ok(PA));
            assert_eq!(translate::<AArch64, _>(root, VA, &IdentityMap), None);
            assert_eq!(unmap_page::<AArch64, _>(root, VA, &IdentityMap), Err(MapError::NotMapped));
        }
    }

    #[test]
    fn test_missing_table() {
        let root = leak_table::<Pte>();
        let result = unsafe { map_page::<Riscv64, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap) };
        assert_eq!(result, Err(MapError::TableNotPresent));
        assert!(root.is_empty());
    }

    #[test]
    fn test_superpage_conflict() {
        let root = leak_table::<Pte>();
        root[0] = Pte::leaf(PhysAddr::zero(), MapFlags::KERNEL_RWX, PageSize::Size1G);
        unsafe {
            let result = map_page_with_alloc::<Riscv64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Pte>);
            assert_eq!(result, Err(MapError::SuperpageConflict));
            assert_eq!(unmap_page::<Riscv64, _>(root, VA, &IdentityMap), Err(MapError::SuperpageConflict));
        }
    }

    #[test]
    fn test_validation_before_allocation() {
        let root = leak_table::<Descriptor>();
        let mut calls = 0;
        let mut alloc = || {
            calls += 1;
            host_alloc::<Descriptor>()
        };
        unsafe {
            let unaligned = map_page_with_alloc::<AArch64, _, _>(root, VA + 8, PA, MapFlags::KERNEL_RW, &IdentityMap, &mut alloc);
            assert_eq!(unaligned, Err(MapError::NotAligned));
            let bad_pa = map_page_with_alloc::<AArch64, _, _>(root, VA, PA + 8, MapFlags::KERNEL_RW, &IdentityMap, &mut alloc);
            assert_eq!(bad_pa, Err(MapError::NotAligned));
            let hole = VirtAddr::new(0x0001_0000_0000_0000);
            let non_canonical = map_page_with_alloc::<AArch64, _, _>(root, hole, PA, MapFlags::KERNEL_RW, &IdentityMap, &mut alloc);
            assert_eq!(non_canonical, Err(MapError::NotCanonical));
        }
        assert_eq!(calls, 0);
        assert!(root.is_empty());
    }

    #[test]
    fn test_out_of_memory_keeps_partial_chain() {
        let root = leak_table::<Descriptor>();
        let mut budget = 1;
        let alloc = || {
            if budget == 0 {
                return None;
            }
            budget -= 1;
            host_alloc::<Descriptor>()
        };
        let result = unsafe { map_page_with_alloc::<AArch64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, alloc) };
        assert_eq!(result, Err(MapError::OutOfMemory));
        assert_eq!(root.valid_count(), 1);
    }

    #[test]
    fn test_map_issues_store_barrier_only() {
        let root = leak_table::<Descriptor>();
        unsafe {
            map_page_with_alloc::<AArch64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Descriptor>)
                .expect("map");
        }
        sim::reset();
        unsafe {
            map_page::<AArch64, _>(root, VA + PAGE_SIZE, PA + PAGE_SIZE, MapFlags::KERNEL_RW, &IdentityMap).expect("map");
        }
        assert_eq!(sim::take(), [HwOp::Insn("dsb ishst")]);
    }

    #[test]
    fn test_unmap_and_flush_orders_barrier_before_invalidate() {
        let root = leak_table::<Pte>();
        unsafe {
            map_page_with_alloc::<Riscv64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Pte>)
                .expect("map");
            sim::reset();
            unmap_page_and_flush::<Riscv64, _>(root, VA, &IdentityMap).expect("unmap");
        }
        let ops = sim::take();
        let barrier = ops.iter().position(|op| *op == HwOp::Insn("fence w, w")).expect("barrier");
        let invalidate = ops
            .iter()
            .position(|op| *op == HwOp::InsnWith("sfence.vma {}, zero", VA.as_u64()))
            .expect("invalidate");
        assert!(barrier < invalidate);
    }

    #[test]
    fn test_range_map_and_unmap() {
        let root = leak_table::<Pte>();
        let size = 4 * PAGE_SIZE;
        unsafe {
            map_range_with_alloc::<Riscv64, _, _>(root, VA, PA, size, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Pte>)
                .expect("map range");
            for i in 0..4 {
                let off = i * PAGE_SIZE;
                assert_eq!(translate::<Riscv64, _>(root, VA + off, &IdentityMap), Some(PA + off));
            }
            unmap_page::<Riscv64, _>(root, VA + PAGE_SIZE, &IdentityMap).expect("unmap");
            assert_eq!(unmap_range::<Riscv64, _>(root, VA, size, &IdentityMap), Ok(3));
            assert_eq!(translate::<Riscv64, _>(root, VA, &IdentityMap), None);
            assert_eq!(
                map_range::<Riscv64, _>(root, VA, PA, PAGE_SIZE + 1, MapFlags::KERNEL_RW, &IdentityMap),
                Err(MapError::NotAligned)
            );
        }
    }

    #[test]
    fn test_unmap_range_past_low_half_changes_nothing() {
        let root = leak_table::<Pte>();
        let last_low = VirtAddr::new(0x0000_003F_FFFF_F000);
        unsafe {
            map_page_with_alloc::<Riscv64, _, _>(root, last_low, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Pte>)
                .expect("map");
            sim::reset();
            let result = unmap_range::<Riscv64, _>(root, last_low, 2 * PAGE_SIZE, &IdentityMap);
            assert_eq!(result, Err(MapError::NotCanonical));
            assert_eq!(translate::<Riscv64, _>(root, last_low, &IdentityMap), Some(PA));
        }
        assert!(sim::take().is_empty());
    }

    #[test]
    fn test_range_wrapping_past_top_is_rejected() {
        let root = leak_table::<Descriptor>();
        let zero = VirtAddr::new(0);
        let top = VirtAddr::new(0xFFFF_FFFF_FFFF_F000);
        unsafe {
            map_page_with_alloc::<AArch64, _, _>(root, zero, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Descriptor>)
                .expect("map");

            assert_eq!(unmap_range::<AArch64, _>(root, top, 2 * PAGE_SIZE, &IdentityMap), Err(MapError::NotCanonical));
            assert_eq!(translate::<AArch64, _>(root, zero, &IdentityMap), Some(PA));

            let wrapped = map_range_with_alloc::<AArch64, _, _>(
                root,
                top,
                PA + PAGE_SIZE,
                2 * PAGE_SIZE,
                MapFlags::KERNEL_RW,
                &IdentityMap,
                host_alloc::<Descriptor>,
            );
            assert_eq!(wrapped, Err(MapError::NotCanonical));
            assert_eq!(root.valid_count(), 1);
            assert_eq!(translate::<AArch64, _>(root, top, &IdentityMap), None);
        }
    }

    #[test]
    fn test_range_physical_overflow_is_rejected() {
        let root = leak_table::<Pte>();
        let top = PhysAddr::new(0xFFFF_FFFF_FFFF_F000);
        unsafe {
            let result = map_range_with_alloc::<Riscv64, _, _>(
                root,
                VA,
                top,
                2 * PAGE_SIZE,
                MapFlags::KERNEL_RW,
                &IdentityMap,
                host_alloc::<Pte>,
            );
            assert_eq!(result, Err(MapError::NotAligned));
            assert_eq!(
                map_range::<Riscv64, _>(root, VA, top, 2 * PAGE_SIZE, MapFlags::KERNEL_RW, &IdentityMap),
                Err(MapError::NotAligned)
            );
        }
        assert!(root.is_empty());
    }

    #[test]
    fn test_unmap_range_flushes_cleared_pages_before_superpage() {
        let root = leak_table::<Pte>();
        root[1] = Pte::leaf(PhysAddr::new(0x4000_0000), MapFlags::KERNEL_RWX, PageSize::Size1G);
        let below = VirtAddr::new(0x3FFF_F000);
        unsafe {
            map_page_with_alloc::<Riscv64, _, _>(root, below, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Pte>)
                .expect("map");
            sim::reset();
            let result = unmap_range::<Riscv64, _>(root, below, 2 * PAGE_SIZE, &IdentityMap);
            assert_eq!(result, Err(MapError::SuperpageConflict));
            assert_eq!(translate::<Riscv64, _>(root, below, &IdentityMap), None);
        }
        let ops = sim::take();
        assert!(ops.contains(&HwOp::InsnWith("sfence.vma {}, zero", below.as_u64())));
        assert!(!ops.contains(&HwOp::InsnWith("sfence.vma {}, zero", 0x4000_0000)));
    }

    #[test]
    fn test_protect() {
        let root = leak_table::<Descriptor>();
        unsafe {
            map_page_with_alloc::<AArch64, _, _>(root, VA, PA, MapFlags::KERNEL_RW, &IdentityMap, host_alloc::<Descriptor>)
                .expect("map");
            let old = protect::<AArch64, _>(root, VA, MapFlags::KERNEL_RX, &IdentityMap).expect("protect");
            assert_eq!(old, MapFlags::KERNEL_RW);
            let t = translate_detailed::<AArch64, _>(root, VA, &IdentityMap).expect("mapped");
            assert_eq!(t.phys, PA);
            assert_eq!(t.entry.flags(), MapFlags::KERNEL_RX);
            assert_eq!(
                protect::<AArch64, _>(root, VA + PAGE_SIZE, MapFlags::KERNEL_RO, &IdentityMap),
                Err(MapError::NotMapped)
            );
        }
    }
}
