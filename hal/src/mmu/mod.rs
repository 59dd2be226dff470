//! # Virtual Memory Core
//!
//! Architecture-neutral half of the virtual memory subsystem. Everything in
//! here is written once against the [`Architecture`] contract; the AArch64
//! and RISC-V backends in [`crate::arch`] supply descriptor formats, root
//! table layouts and the privileged instructions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       boot::KernelSpace                     │
//! │        init → higher half → expand physmap → harden         │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  mapper (map / unmap / ...)  │  walker (walk / translate)   │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │   table::PageTable<E>   entry::PageTableEntry   vaddr, tlb  │
//! ├─────────────────────────────────────────────────────────────┤
//! │            Architecture (AArch64 │ RISC-V Sv39)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Levels are numbered from the bottom: level 0 holds 4 KiB pages, level 1
//! holds 2 MiB superpages, level 2 holds 1 GiB superpages. The root is at
//! `Architecture::LEVELS - 1`.

pub mod addr;
pub mod asid;
pub mod boot;
pub mod entry;
pub mod error;
pub mod flags;
pub mod mapper;
pub mod phys;
pub mod table;
pub mod tlb;
pub mod vaddr;
pub mod walker;

use core::fmt;

pub use addr::{PageSize, PhysAddr, VirtAddr};
pub use asid::Asid;
pub use boot::{BootStage, HigherHalfJump, KernelSpace};
pub use entry::PageTableEntry;
pub use error::{BootError, MapError, MapResult};
pub use flags::MapFlags;
pub use phys::{DirectMap, IdentityMap, PhysMapper};
pub use table::PageTable;
pub use tlb::TlbScope;
pub use vaddr::VirtualAddressParts;
pub use walker::Translation;

// =============================================================================
// Geometry
// =============================================================================

/// Page shift (log2 of the 4 KiB granule)
pub const PAGE_SHIFT: u32 = 12;

/// Page size (4 KiB granule on both backends)
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Index bits consumed per table level
pub const INDEX_BITS: u32 = 9;

/// Mask for one table index
pub const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Entries per table
pub const TABLE_ENTRIES: usize = 1 << INDEX_BITS;

/// Deepest hierarchy any backend uses
pub const MAX_LEVELS: usize = 4;

/// One gibibyte, the granularity of boot mappings
pub const GIB: u64 = 1 << 30;

// =============================================================================
// Architecture Contract
// =============================================================================

/// A translation regime plus the privileged operations that drive it.
///
/// Implementations are zero-sized markers selected at build time; every
/// method is an associated function so that calls compile down to the
/// backend's instructions with no dispatch.
pub trait Architecture: Sized + 'static {
    /// Descriptor format used at every level
    type Entry: PageTableEntry;

    /// Boot-time root tables (identity + physmap structures)
    type Roots: RootTables<Entry = Self::Entry> + fmt::Debug;

    /// Human readable backend name
    const NAME: &'static str;

    /// Number of table levels walked from the root
    const LEVELS: usize;

    /// Offset between a physical address and its physmap alias
    const KERNEL_VIRT_BASE: u64;

    /// Start of DRAM on the reference platform
    const RAM_BASE: u64;

    /// Whether `va` lies in one of the translatable ranges
    fn is_canonical(va: VirtAddr) -> bool;

    /// Make prior page table stores visible to the table walker
    fn store_barrier();

    /// Invalidate every translation, all address spaces
    fn flush_all();

    /// Invalidate one page, all address spaces
    fn flush_addr(va: VirtAddr);

    /// Invalidate every translation tagged with `asid`
    fn flush_asid(asid: Asid);

    /// Invalidate one page in one address space
    fn flush_addr_asid(va: VirtAddr, asid: Asid);

    /// Invalidate every translation on the executing core only
    fn flush_all_local();

    /// Program the root register(s), flush locally, turn translation on.
    ///
    /// Panics if a root table is not page aligned.
    ///
    /// # Safety
    ///
    /// Must run on the boot core while the currently executing code and
    /// stack are reachable through `roots`.
    unsafe fn enable_translation(roots: &Self::Roots);

    /// Add the kernel virtual base to SP and to `entry`, then branch.
    ///
    /// # Safety
    ///
    /// Translation must be on with the physmap covering the stack and
    /// `entry`'s physical location.
    unsafe fn jump_to_higher_half(entry: extern "C" fn() -> !) -> !;
}

/// Root tables owned by the kernel for its whole lifetime.
///
/// Both the identity structure and the physmap structure are addressed in
/// whole GiB slots: slot `n` maps physical `[n GiB, n+1 GiB)`.
pub trait RootTables: Sized + 'static {
    /// Descriptor format
    type Entry: PageTableEntry;

    /// All tables empty, suitable for a `static`
    const EMPTY: Self;

    /// Bytes addressable through the identity structure
    const IDENTITY_CAPACITY: u64;

    /// Bytes addressable through the physmap structure
    const PHYSMAP_CAPACITY: u64;

    /// Install branch entries to the statically allocated sub-tables.
    ///
    /// Runs untranslated: table addresses are used as physical addresses.
    fn link(&mut self);

    /// GiB slot `gib` of the identity structure
    fn identity_slot(&mut self, gib: usize) -> Option<&mut Self::Entry>;

    /// GiB slot `gib` of the physmap structure
    fn physmap_slot(&mut self, gib: usize) -> Option<&mut Self::Entry>;

    /// Invalidate every identity-structure entry
    fn clear_identity(&mut self);

    /// Root table translating `va`
    fn root(&self, va: VirtAddr) -> &PageTable<Self::Entry>;

    /// Root table translating `va`, mutably
    fn root_mut(&mut self, va: VirtAddr) -> &mut PageTable<Self::Entry>;
}
