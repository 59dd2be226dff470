//! # AArch64 Root Tables
//!
//! ```text
//! TTBR0_EL1 ─► ttbr0 (L0) ─[0]─► identity_l1 ─[n]─► 1 GiB block @ n GiB
//! TTBR1_EL1 ─► ttbr1 (L0) ─[0]─► physmap_l1  ─[n]─► 1 GiB block @ n GiB
//! ```
//!
//! One L0 slot covers 512 GiB, so each half describes 512 GiB of RAM
//! without further allocation.

use crate::mmu::addr::{PhysAddr, VirtAddr};
use crate::mmu::entry::PageTableEntry;
use crate::mmu::table::PageTable;
use crate::mmu::{RootTables, GIB, TABLE_ENTRIES};

use super::entries::Descriptor;

/// Statically allocated boot tables for both halves
#[repr(C)]
#[derive(Debug)]
pub struct Aarch64Roots {
    ttbr0: PageTable<Descriptor>,
    ttbr1: PageTable<Descriptor>,
    identity_l1: PageTable<Descriptor>,
    physmap_l1: PageTable<Descriptor>,
}

impl Aarch64Roots {
    /// Value programmed into TTBR0_EL1
    pub fn ttbr0_base(&self) -> u64 {
        self.ttbr0.as_ptr() as u64
    }

    /// Value programmed into TTBR1_EL1
    pub fn ttbr1_base(&self) -> u64 {
        self.ttbr1.as_ptr() as u64
    }

    /// L1 table of the identity structure
    pub fn identity_l1(&self) -> &PageTable<Descriptor> {
        &self.identity_l1
    }

    /// L1 table of the physmap structure
    pub fn physmap_l1(&self) -> &PageTable<Descriptor> {
        &self.physmap_l1
    }
}

impl RootTables for Aarch64Roots {
    type Entry = Descriptor;

    const EMPTY: Self = Self {
        ttbr0: PageTable::new(),
        ttbr1: PageTable::new(),
        identity_l1: PageTable::new(),
        physmap_l1: PageTable::new(),
    };

    const IDENTITY_CAPACITY: u64 = TABLE_ENTRIES as u64 * GIB;
    const PHYSMAP_CAPACITY: u64 = TABLE_ENTRIES as u64 * GIB;

    fn link(&mut self) {
        let identity = PhysAddr::new(self.identity_l1.as_ptr() as u64);
        let physmap = PhysAddr::new(self.physmap_l1.as_ptr() as u64);
        self.ttbr0[0] = Descriptor::branch(identity);
        self.ttbr1[0] = Descriptor::branch(physmap);
    }

    fn identity_slot(&mut self, gib: usize) -> Option<&mut Descriptor> {
        self.identity_l1.get_mut(gib)
    }

    fn physmap_slot(&mut self, gib: usize) -> Option<&mut Descriptor> {
        self.physmap_l1.get_mut(gib)
    }

    fn clear_identity(&mut self) {
        self.ttbr0.clear();
        self.identity_l1.clear();
    }

    fn root(&self, va: VirtAddr) -> &PageTable<Descriptor> {
        if va.as_u64() >> 63 != 0 {
            &self.ttbr1
        } else {
            &self.ttbr0
        }
    }

    fn root_mut(&mut self, va: VirtAddr) -> &mut PageTable<Descriptor> {
        if va.as_u64() >> 63 != 0 {
            &mut self.ttbr1
        } else {
            &mut self.ttbr0
        }
    }
}
