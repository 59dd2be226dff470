//! # Page Table
//!
//! A table is exactly one page: 512 eight-byte entries, page aligned. The
//! per-backend layout assertions live next to each descriptor type.

use core::fmt;
use core::ops::{Index, IndexMut};

use super::entry::PageTableEntry;
use super::TABLE_ENTRIES;

/// One level of the translation hierarchy
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageTable<E> {
    entries: [E; TABLE_ENTRIES],
}

impl<E: PageTableEntry> PageTable<E> {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            entries: [E::INVALID; TABLE_ENTRIES],
        }
    }

    /// Invalidate every entry
    pub fn clear(&mut self) {
        self.entries.fill(E::INVALID);
    }

    /// Invalidate entries in `range`
    pub fn clear_range(&mut self, range: core::ops::Range<usize>) {
        self.entries[range].fill(E::INVALID);
    }

    /// Entry at `index`, if in range
    pub fn get(&self, index: usize) -> Option<&E> {
        self.entries.get(index)
    }

    /// Entry at `index` mutably, if in range
    pub fn get_mut(&mut self, index: usize) -> Option<&mut E> {
        self.entries.get_mut(index)
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter()
    }

    /// Iterate over valid entries together with their index
    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, E)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
    }

    /// Number of valid entries
    pub fn valid_count(&self) -> usize {
        self.valid_entries().count()
    }

    /// Check if no entry is valid
    pub fn is_empty(&self) -> bool {
        self.valid_count() == 0
    }

    /// Address of the table itself
    pub fn as_ptr(&self) -> *const Self {
        self
    }
}

impl<E> Index<usize> for PageTable<E> {
    type Output = E;

    #[inline]
    fn index(&self, index: usize) -> &E {
        &self.entries[index]
    }
}

impl<E> IndexMut<usize> for PageTable<E> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut E {
        &mut self.entries[index]
    }
}

impl<E: PageTableEntry> fmt::Debug for PageTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTable")
            .field("addr", &self.as_ptr())
            .field("valid", &self.valid_count())
            .finish()
    }
}
