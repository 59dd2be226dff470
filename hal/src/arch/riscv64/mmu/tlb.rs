//! # Sv39 TLB Sequences
//!
//! `fence w, w; sfence.vma ...; fence rw, rw`. `sfence.vma` only affects
//! the executing hart, so the local form is the full flush.

use crate::arch::riscv64::cpu;
use crate::mmu::{Asid, VirtAddr};

/// Invalidate all translations
#[inline]
pub fn flush_all() {
    cpu::fence_w_w();
    cpu::sfence_vma_all();
    cpu::fence_rw_rw();
}

/// Invalidate all translations on this hart
#[inline]
pub fn flush_all_local() {
    flush_all();
}

/// Invalidate one page for every ASID
#[inline]
pub fn flush_addr(va: VirtAddr) {
    cpu::fence_w_w();
    cpu::sfence_vma_addr(va.as_u64());
    cpu::fence_rw_rw();
}

/// Invalidate everything tagged with `asid`
#[inline]
pub fn flush_asid(asid: Asid) {
    cpu::fence_w_w();
    cpu::sfence_vma_asid(asid.value() as u64);
    cpu::fence_rw_rw();
}

/// Invalidate one page in one ASID
#[inline]
pub fn flush_addr_asid(va: VirtAddr, asid: Asid) {
    cpu::fence_w_w();
    cpu::sfence_vma_addr_asid(va.as_u64(), asid.value() as u64);
    cpu::fence_rw_rw();
}
