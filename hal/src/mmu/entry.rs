//! # Page Table Entry Contract
//!
//! Uniform semantic view over the two descriptor formats. Constructors are
//! the only place where permission semantics are decided; the walker and
//! mapper treat entries as opaque values.
//!
//! ## Classification
//!
//! `is_leaf` / `is_branch` are only meaningful above the final level. At
//! level 0 any valid entry is a page, whatever its type bit says, and the
//! walker never asks.

use core::fmt;

use super::addr::{PageSize, PhysAddr};
use super::flags::MapFlags;

/// One 64-bit translation table descriptor
pub trait PageTableEntry: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The all-zero, invalid entry
    const INVALID: Self;

    /// Create from raw bits
    fn from_bits(bits: u64) -> Self;

    /// Get raw bits
    fn bits(self) -> u64;

    /// Check if the valid bit is set
    fn is_valid(self) -> bool;

    /// Valid entry that terminates translation above the final level
    fn is_leaf(self) -> bool;

    /// Valid entry pointing at the next level
    fn is_branch(self) -> bool;

    /// Output address (next table for branches, frame for leaves)
    fn phys_addr(self) -> PhysAddr;

    /// Pointer to a next-level table
    fn branch(table: PhysAddr) -> Self;

    /// Leaf mapping `phys` at granularity `size`
    fn leaf(phys: PhysAddr, flags: MapFlags, size: PageSize) -> Self;

    /// Decode the permissions of a leaf
    fn flags(self) -> MapFlags;

    /// Privileged 4 KiB page
    #[inline]
    fn kernel_leaf(phys: PhysAddr, write: bool, exec: bool) -> Self {
        Self::leaf(phys, MapFlags::from_parts(write, exec, false), PageSize::Size4K)
    }

    /// Unprivileged 4 KiB page
    #[inline]
    fn user_leaf(phys: PhysAddr, write: bool, exec: bool) -> Self {
        Self::leaf(phys, MapFlags::from_parts(write, exec, true), PageSize::Size4K)
    }

    /// Uncached device page, kernel read/write, never executable
    #[inline]
    fn device_leaf(phys: PhysAddr) -> Self {
        Self::leaf(phys, MapFlags::MMIO, PageSize::Size4K)
    }
}
