//! # AArch64 TLB Sequences
//!
//! Broadcast forms: `dsb ishst; tlbi ...is; dsb ish; isb`.
//! The local form uses the non-shareable barriers instead.

use crate::arch::aarch64::cpu;
use crate::mmu::{Asid, VirtAddr};

/// Bits [43:0] of a TLBI operand hold VA[55:12]
const TLBI_VA_MASK: u64 = 0xFFF_FFFF_FFFF;

/// Bits [63:48] of a TLBI operand hold the ASID
const TLBI_ASID_SHIFT: u64 = 48;

#[inline(always)]
fn va_operand(va: VirtAddr) -> u64 {
    (va.as_u64() >> 12) & TLBI_VA_MASK
}

#[inline(always)]
fn asid_operand(asid: Asid) -> u64 {
    (asid.value() as u64) << TLBI_ASID_SHIFT
}

/// Invalidate all translations, all cores
#[inline]
pub fn flush_all() {
    cpu::dsb_ishst();
    cpu::tlbi_vmalle1is();
    cpu::dsb_ish();
    cpu::isb();
}

/// Invalidate all translations, executing core only
#[inline]
pub fn flush_all_local() {
    cpu::dsb_nshst();
    cpu::tlbi_vmalle1();
    cpu::dsb_nsh();
    cpu::isb();
}

/// Invalidate one page for every ASID
#[inline]
pub fn flush_addr(va: VirtAddr) {
    cpu::dsb_ishst();
    cpu::tlbi_vaae1is(va_operand(va));
    cpu::dsb_ish();
    cpu::isb();
}

/// Invalidate everything tagged with `asid`
#[inline]
pub fn flush_asid(asid: Asid) {
    cpu::dsb_ishst();
    cpu::tlbi_aside1is(asid_operand(asid));
    cpu::dsb_ish();
    cpu::isb();
}

/// Invalidate one page in one ASID
#[inline]
pub fn flush_addr_asid(va: VirtAddr, asid: Asid) {
    cpu::dsb_ishst();
    cpu::tlbi_vae1is(asid_operand(asid) | va_operand(va));
    cpu::dsb_ish();
    cpu::isb();
}
