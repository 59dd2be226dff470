//! # TLB Management
//!
//! Every invalidation is composed the same way on both backends:
//!
//! ```text
//!   store barrier      pending PTE writes visible to the walker
//!   invalidate         scope: all │ address │ ASID │ address + ASID
//!   completion barrier invalidation finished
//!   (isb)              AArch64 only: refetch with the new translation
//! ```
//!
//! The local variant never broadcasts and is the only one used before
//! secondary cores exist. Cross-core shootdown is not implemented: the
//! broadcast forms on AArch64 cover the single-core case only.

use super::addr::VirtAddr;
use super::asid::Asid;
use super::{Architecture, PAGE_SIZE};

/// Above this many pages a range flush falls back to a full flush
pub const RANGE_FLUSH_THRESHOLD: u64 = 32;

/// Invalidation granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlbScope {
    /// Every entry, every address space
    All,
    /// One page, every address space
    Address(VirtAddr),
    /// Every entry of one address space
    Asid(Asid),
    /// One page of one address space
    AddressAsid(VirtAddr, Asid),
    /// Every entry, executing core only
    Local,
}

/// Invalidate translations in `scope`
#[inline]
pub fn flush<A: Architecture>(scope: TlbScope) {
    stats::record(scope);
    match scope {
        TlbScope::All => A::flush_all(),
        TlbScope::Address(va) => A::flush_addr(va),
        TlbScope::Asid(asid) => A::flush_asid(asid),
        TlbScope::AddressAsid(va, asid) => A::flush_addr_asid(va, asid),
        TlbScope::Local => A::flush_all_local(),
    }
}

/// Invalidate every page overlapping `[start, start + size)`
pub fn flush_range<A: Architecture>(start: VirtAddr, size: u64) {
    let first = start.as_u64() & !(PAGE_SIZE - 1);
    let end = start.as_u64().saturating_add(size);
    let pages = end.saturating_sub(first).div_ceil(PAGE_SIZE);

    if pages > RANGE_FLUSH_THRESHOLD {
        flush::<A>(TlbScope::All);
        return;
    }

    for page in 0..pages {
        flush::<A>(TlbScope::Address(VirtAddr::new(first + page * PAGE_SIZE)));
    }
}

// =============================================================================
// TLB Statistics
// =============================================================================

#[cfg(feature = "tlb_stats")]
pub use stats::{stats, TlbStats};

mod stats {
    use super::TlbScope;

    #[cfg(feature = "tlb_stats")]
    use core::sync::atomic::{AtomicU64, Ordering};

    /// TLB operation statistics
    #[cfg(feature = "tlb_stats")]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct TlbStats {
        /// Full broadcast flushes
        pub full_flushes: u64,
        /// Single-address flushes
        pub page_flushes: u64,
        /// ASID flushes
        pub asid_flushes: u64,
        /// Address + ASID flushes
        pub page_asid_flushes: u64,
        /// Local full flushes
        pub local_flushes: u64,
    }

    #[cfg(feature = "tlb_stats")]
    static COUNTERS: [AtomicU64; 5] = [
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
    ];

    #[cfg(feature = "tlb_stats")]
    #[inline]
    pub(super) fn record(scope: TlbScope) {
        let slot = match scope {
            TlbScope::All => 0,
            TlbScope::Address(_) => 1,
            TlbScope::Asid(_) => 2,
            TlbScope::AddressAsid(..) => 3,
            TlbScope::Local => 4,
        };
        COUNTERS[slot].fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(not(feature = "tlb_stats"))]
    #[inline(always)]
    pub(super) fn record(_scope: TlbScope) {}

    /// Snapshot of the counters since boot
    #[cfg(feature = "tlb_stats")]
    pub fn stats() -> TlbStats {
        let load = |i: usize| COUNTERS[i].load(Ordering::Relaxed);
        TlbStats {
            full_flushes: load(0),
            page_flushes: load(1),
            asid_flushes: load(2),
            page_asid_flushes: load(3),
            local_flushes: load(4),
        }
    }
}
