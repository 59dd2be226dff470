//! # Page Table Walker
//!
//! Read-only traversal of a translation hierarchy.
//!
//! - [`walk`] returns the final-level slot for an address. It refuses to
//!   cross a superpage, because no 4 KiB slot exists inside one.
//! - [`translate`] follows the same descent but resolves a superpage at any
//!   level to `base | (va & size_mask)`.
//!
//! Both reject non-canonical addresses before touching memory. Neither
//! takes a lock: callers guarantee that no writer runs concurrently.

use core::fmt;

use super::addr::{PageSize, PhysAddr, VirtAddr};
use super::entry::PageTableEntry;
use super::phys::PhysMapper;
use super::table::PageTable;
use super::vaddr::VirtualAddressParts;
use super::Architecture;

// =============================================================================
// Descent
// =============================================================================

/// Where a descent towards `target` level stopped
pub(crate) enum Descent<E> {
    /// Slot at the target level (valid or not)
    Slot(*mut E),
    /// Invalid entry found above the target level
    Absent {
        /// Level holding the invalid entry
        level: usize,
    },
    /// Leaf found above the target level
    Superpage {
        /// Level holding the leaf
        level: usize,
        /// The leaf itself
        entry: E,
    },
}

/// Descend from `root` down to `target` level.
///
/// # Safety
///
/// Every branch reachable from `root` must point at a live table that
/// `mapper` can dereference.
pub(crate) unsafe fn descend<A, M>(
    root: *mut PageTable<A::Entry>,
    parts: &VirtualAddressParts,
    target: usize,
    mapper: &M,
) -> Descent<A::Entry>
where
    A: Architecture,
    M: PhysMapper,
{
    let mut table = root.cast::<A::Entry>();
    let mut level = A::LEVELS - 1;

    while level > target {
        // SAFETY: `table` is the root or was reached through a branch
        let entry = unsafe { *table.add(parts.index(level)) };
        if !entry.is_valid() {
            return Descent::Absent { level };
        }
        if entry.is_leaf() {
            return Descent::Superpage { level, entry };
        }
        table = mapper.phys_to_virt(entry.phys_addr()).as_mut_ptr();
        level -= 1;
    }

    // SAFETY: index is below TABLE_ENTRIES by construction
    Descent::Slot(unsafe { table.add(parts.index(target)) })
}

// =============================================================================
// Walk / Translate
// =============================================================================

/// Final-level slot for `va`.
///
/// Returns `None` if `va` is not canonical, if an intermediate level is
/// missing, or if a superpage covers `va`. The slot itself may be invalid.
///
/// # Safety
///
/// See [`PhysMapper::table_mut`]: all tables reachable from `root` must be
/// live and not otherwise borrowed.
pub unsafe fn walk<'a, A, M>(
    root: &'a mut PageTable<A::Entry>,
    va: VirtAddr,
    mapper: &M,
) -> Option<&'a mut A::Entry>
where
    A: Architecture,
    M: PhysMapper,
{
    let parts = VirtualAddressParts::parse::<A>(va);
    if !parts.is_canonical() {
        return None;
    }

    // SAFETY: forwarded from the caller
    match unsafe { descend::<A, M>(root, &parts, 0, mapper) } {
        // SAFETY: slot lives in a table owned through `root`
        Descent::Slot(slot) => Some(unsafe { &mut *slot }),
        Descent::Absent { .. } | Descent::Superpage { .. } => None,
    }
}

/// Result of a detailed translation
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Translation<E> {
    /// Output physical address
    pub phys: PhysAddr,
    /// Granularity of the terminating leaf
    pub size: PageSize,
    /// The terminating leaf
    pub entry: E,
}

impl<E: PageTableEntry> fmt::Debug for Translation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translation")
            .field("phys", &self.phys)
            .field("size", &self.size)
            .field("flags", &self.entry.flags())
            .finish()
    }
}

/// Translate `va`, reporting the leaf and its size.
///
/// # Safety
///
/// Same requirements as [`walk`].
pub unsafe fn translate_detailed<A, M>(
    root: &PageTable<A::Entry>,
    va: VirtAddr,
    mapper: &M,
) -> Option<Translation<A::Entry>>
where
    A: Architecture,
    M: PhysMapper,
{
    let parts = VirtualAddressParts::parse::<A>(va);
    if !parts.is_canonical() {
        return None;
    }

    let root = root as *const PageTable<A::Entry> as *mut PageTable<A::Entry>;
    // SAFETY: forwarded from the caller; nothing is written through `root`
    match unsafe { descend::<A, M>(root, &parts, 0, mapper) } {
        Descent::Slot(slot) => {
            // SAFETY: slot lives in a table reachable from `root`
            let entry = unsafe { *slot };
            entry.is_valid().then(|| Translation {
                phys: entry.phys_addr() + parts.offset(),
                size: PageSize::Size4K,
                entry,
            })
        }
        Descent::Superpage { level, entry } => {
            let size = PageSize::from_level(level)?;
            Some(Translation {
                phys: PhysAddr::new(
                    entry.phys_addr().align_down(size).as_u64() | (va.as_u64() & size.offset_mask()),
                ),
                size,
                entry,
            })
        }
        Descent::Absent { .. } => None,
    }
}

/// Physical address backing `va`, resolving superpages at any level.
///
/// # Safety
///
/// Same requirements as [`walk`].
#[inline]
pub unsafe fn translate<A, M>(root: &PageTable<A::Entry>, va: VirtAddr, mapper: &M) -> Option<PhysAddr>
where
    A: Architecture,
    M: PhysMapper,
{
    // SAFETY: forwarded from the caller
    unsafe { translate_detailed::<A, M>(root, va, mapper) }.map(|t| t.phys)
}

/// Check if `va` translates to anything.
///
/// # Safety
///
/// Same requirements as [`walk`].
#[inline]
pub unsafe fn is_mapped<A, M>(root: &PageTable<A::Entry>, va: VirtAddr, mapper: &M) -> bool
where
    A: Architecture,
    M: PhysMapper,
{
    // SAFETY: forwarded from the caller
    unsafe { translate::<A, M>(root, va, mapper) }.is_some()
}

// =============================================================================
// Debug Dump
// =============================================================================

/// Log every valid entry reachable from `root` at `debug` level.
///
/// # Safety
///
/// Same requirements as [`walk`].
#[cfg(feature = "debug")]
pub unsafe fn dump<A, M>(root: &PageTable<A::Entry>, mapper: &M)
where
    A: Architecture,
    M: PhysMapper,
{
    log::debug!("MMU: {} page tables at {:p}", A::NAME, root.as_ptr());
    // SAFETY: forwarded from the caller
    unsafe { dump_level::<A, M>(root, A::LEVELS - 1, 0, mapper) };
}

#[cfg(feature = "debug")]
unsafe fn dump_level<A, M>(table: &PageTable<A::Entry>, level: usize, base: u64, mapper: &M)
where
    A: Architecture,
    M: PhysMapper,
{
    let shift = super::PAGE_SHIFT + super::INDEX_BITS * level as u32;
    let indent = (A::LEVELS - 1 - level) * 2;

    for (index, entry) in table.valid_entries() {
        let va = base | ((index as u64) << shift);
        if level > 0 && entry.is_branch() {
            log::debug!("{:indent$}[{index:3}] {va:#018x} -> table {}", "", entry.phys_addr());
            // SAFETY: valid branch entries point at live tables
            let next = unsafe { mapper.table_mut::<A::Entry>(entry.phys_addr()) };
            // SAFETY: forwarded from the caller
            unsafe { dump_level::<A, M>(next, level - 1, va, mapper) };
        } else {
            log::debug!(
                "{:indent$}[{index:3}] {va:#018x} -> {} {} ({:?})",
                "",
                entry.phys_addr(),
                entry.flags(),
                PageSize::from_level(level),
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::{AArch64, Descriptor};
    use crate::arch::riscv64::{Pte, Riscv64};
    use crate::mmu::flags::MapFlags;
    use crate::mmu::phys::{leak_table, IdentityMap};

    fn host_phys<E>(table: &PageTable<E>) -> PhysAddr {
        PhysAddr::new(table as *const PageTable<E> as u64)
    }

    #[test]
    fn test_superpage_translation_sv39() {
        let root = leak_table::<Pte>();
        let base = 0x4000_0000u64;
        root[1] = Pte::leaf(PhysAddr::new(base), MapFlags::KERNEL_RW, PageSize::Size1G);

        let hit = unsafe { translate::<Riscv64, _>(root, VirtAddr::new(base + 0x123456), &IdentityMap) };
        assert_eq!(hit, Some(PhysAddr::new(base + 0x123456)));

        let end = unsafe { translate::<Riscv64, _>(root, VirtAddr::new(base + (1 << 30)), &IdentityMap) };
        assert_eq!(end, None);
    }

    #[test]
    fn test_walk_refuses_superpage() {
        let root = leak_table::<Pte>();
        root[1] = Pte::leaf(PhysAddr::new(0x4000_0000), MapFlags::KERNEL_RW, PageSize::Size1G);
        let slot = unsafe { walk::<Riscv64, _>(root, VirtAddr::new(0x4000_1000), &IdentityMap) };
        assert!(slot.is_none());
    }

    #[test]
    fn test_walk_returns_invalid_final_slot() {
        let l0 = leak_table::<Descriptor>();
        let l1 = leak_table::<Descriptor>();
        let l2 = leak_table::<Descriptor>();
        let l3 = leak_table::<Descriptor>();
        l0[0] = Descriptor::branch(host_phys(l1));
        l1[0] = Descriptor::branch(host_phys(l2));
        l2[0] = Descriptor::branch(host_phys(l3));

        let va = VirtAddr::new(0x5000);
        let slot = unsafe { walk::<AArch64, _>(l0, va, &IdentityMap) }.expect("slot");
        assert!(!slot.is_valid());
        *slot = Descriptor::kernel_leaf(PhysAddr::new(0x9000_0000), false, false);

        let pa = unsafe { translate::<AArch64, _>(l0, VirtAddr::new(0x5abc), &IdentityMap) };
        assert_eq!(pa, Some(PhysAddr::new(0x9000_0abc)));
    }

    #[test]
    fn test_aarch64_2m_block() {
        let l0 = leak_table::<Descriptor>();
        let l1 = leak_table::<Descriptor>();
        let l2 = leak_table::<Descriptor>();
        l0[0] = Descriptor::branch(host_phys(l1));
        l1[0] = Descriptor::branch(host_phys(l2));
        l2[3] = Descriptor::leaf(PhysAddr::new(0x8000_0000), MapFlags::KERNEL_RX, PageSize::Size2M);

        let va = VirtAddr::new(3 * (2 << 20) + 0x1_2345);
        let t = unsafe { translate_detailed::<AArch64, _>(l0, va, &IdentityMap) }.expect("mapped");
        assert_eq!(t.size, PageSize::Size2M);
        assert_eq!(t.phys, PhysAddr::new(0x8001_2345));
        assert_eq!(t.entry.flags(), MapFlags::KERNEL_RX);
    }

    #[test]
    fn test_non_canonical_rejected() {
        let root = leak_table::<Pte>();
        root[256] = Pte::leaf(PhysAddr::new(0), MapFlags::KERNEL_RW, PageSize::Size1G);
        // index 256 but bits 63:39 not sign-extended
        let va = VirtAddr::new(0x0000_0040_0000_0000);
        assert!(!unsafe { is_mapped::<Riscv64, _>(root, va, &IdentityMap) });
        assert!(unsafe { walk::<Riscv64, _>(root, va, &IdentityMap) }.is_none());
    }

    #[test]
    fn test_absent_levels() {
        let root = leak_table::<Descriptor>();
        let va = VirtAddr::new(0x1234_5000);
        assert_eq!(unsafe { translate::<AArch64, _>(root, va, &IdentityMap) }, None);
        assert!(unsafe { walk::<AArch64, _>(root, va, &IdentityMap) }.is_none());
    }

    #[cfg(feature = "debug")]
    #[test]
    fn test_dump_visits_branches() {
        let l0 = leak_table::<Descriptor>();
        let l1 = leak_table::<Descriptor>();
        l0[0] = Descriptor::branch(host_phys(l1));
        l1[1] = Descriptor::leaf(PhysAddr::new(0x4000_0000), MapFlags::KERNEL_RWX, PageSize::Size1G);
        unsafe { dump::<AArch64, _>(l0, &IdentityMap) };
    }
}
