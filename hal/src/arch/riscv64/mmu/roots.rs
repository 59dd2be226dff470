//! # Sv39 Root Table
//!
//! A single root translates both halves. Slot `n < 256` identity-maps
//! `[n GiB, n+1 GiB)`; slot `256 + n` is the physmap alias of the same GiB.

use crate::mmu::addr::VirtAddr;
use crate::mmu::table::PageTable;
use crate::mmu::{RootTables, GIB, TABLE_ENTRIES};

use super::entries::Pte;
use super::layout::HIGH_HALF_SLOT;

/// Statically allocated Sv39 root
#[repr(C)]
#[derive(Debug)]
pub struct Sv39Roots {
    root: PageTable<Pte>,
}

impl Sv39Roots {
    /// Physical address programmed into satp
    pub fn root_base(&self) -> u64 {
        self.root.as_ptr() as u64
    }
}

impl RootTables for Sv39Roots {
    type Entry = Pte;

    const EMPTY: Self = Self {
        root: PageTable::new(),
    };

    const IDENTITY_CAPACITY: u64 = HIGH_HALF_SLOT as u64 * GIB;
    const PHYSMAP_CAPACITY: u64 = (TABLE_ENTRIES - HIGH_HALF_SLOT) as u64 * GIB;

    fn link(&mut self) {}

    fn identity_slot(&mut self, gib: usize) -> Option<&mut Pte> {
        if gib < HIGH_HALF_SLOT {
            self.root.get_mut(gib)
        } else {
            None
        }
    }

    fn physmap_slot(&mut self, gib: usize) -> Option<&mut Pte> {
        self.root.get_mut(HIGH_HALF_SLOT.checked_add(gib)?)
    }

    fn clear_identity(&mut self) {
        self.root.clear_range(0..HIGH_HALF_SLOT);
    }

    fn root(&self, _va: VirtAddr) -> &PageTable<Pte> {
        &self.root
    }

    fn root_mut(&mut self, _va: VirtAddr) -> &mut PageTable<Pte> {
        &mut self.root
    }
}
