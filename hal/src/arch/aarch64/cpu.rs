//! # AArch64 Privileged Primitives
//!
//! The only place AArch64 instructions are issued. On bare-metal AArch64
//! builds every function is a single `asm!` block; everywhere else the
//! operation is handed to the host model in `crate::sim`.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none"))] {
        use core::arch::asm;

        macro_rules! insn {
            ($insn:literal) => {
                // SAFETY: barriers and TLB maintenance have no memory-safety preconditions
                unsafe { asm!($insn, options(nostack, preserves_flags)) }
            };
            ($insn:literal, $op:expr) => {
                // SAFETY: as above
                unsafe { asm!(concat!($insn, ", {}"), in(reg) $op, options(nostack, preserves_flags)) }
            };
        }

        macro_rules! read_sysreg {
            ($reg:literal) => {{
                let value: u64;
                // SAFETY: reading an EL1 system register has no side effects
                unsafe { asm!(concat!("mrs {}, ", $reg), out(reg) value, options(nomem, nostack, preserves_flags)) };
                value
            }};
        }

        macro_rules! write_sysreg {
            ($reg:literal, $value:expr) => {
                // SAFETY: caller upholds the register's contract
                unsafe { asm!(concat!("msr ", $reg, ", {}"), in(reg) $value, options(nostack, preserves_flags)) }
            };
        }
    } else {
        use crate::sim::{self, HwOp};

        macro_rules! insn {
            ($insn:literal) => {
                sim::record(HwOp::Insn($insn))
            };
            ($insn:literal, $op:expr) => {
                sim::record(HwOp::InsnWith(concat!($insn, ", {}"), $op))
            };
        }

        macro_rules! read_sysreg {
            ($reg:literal) => {
                sim::read_reg($reg)
            };
        }

        macro_rules! write_sysreg {
            ($reg:literal, $value:expr) => {
                sim::record(HwOp::WriteReg($reg, $value))
            };
        }
    }
}

// =============================================================================
// Barriers
// =============================================================================

/// Wait for prior stores, inner shareable domain
#[inline(always)]
pub fn dsb_ishst() {
    insn!("dsb ishst");
}

/// Wait for prior memory accesses, inner shareable domain
#[inline(always)]
pub fn dsb_ish() {
    insn!("dsb ish");
}

/// Wait for prior stores, this core only
#[inline(always)]
pub fn dsb_nshst() {
    insn!("dsb nshst");
}

/// Wait for prior memory accesses, this core only
#[inline(always)]
pub fn dsb_nsh() {
    insn!("dsb nsh");
}

/// Flush the pipeline
#[inline(always)]
pub fn isb() {
    insn!("isb");
}

// =============================================================================
// TLB Maintenance
// =============================================================================

/// Invalidate all EL1&0 entries, broadcast
#[inline(always)]
pub fn tlbi_vmalle1is() {
    insn!("tlbi vmalle1is");
}

/// Invalidate all EL1&0 entries, this core only
#[inline(always)]
pub fn tlbi_vmalle1() {
    insn!("tlbi vmalle1");
}

/// Invalidate by VA, all ASIDs, broadcast. Operand: VA[55:12] in [43:0]
#[inline(always)]
pub fn tlbi_vaae1is(operand: u64) {
    insn!("tlbi vaae1is", operand);
}

/// Invalidate by ASID, broadcast. Operand: ASID in [63:48]
#[inline(always)]
pub fn tlbi_aside1is(operand: u64) {
    insn!("tlbi aside1is", operand);
}

/// Invalidate by VA and ASID, broadcast
#[inline(always)]
pub fn tlbi_vae1is(operand: u64) {
    insn!("tlbi vae1is", operand);
}

// =============================================================================
// System Registers
// =============================================================================

/// Read SCTLR_EL1
#[inline]
pub fn read_sctlr_el1() -> u64 {
    read_sysreg!("SCTLR_EL1")
}

/// Write SCTLR_EL1
///
/// # Safety
///
/// Toggling the MMU or caches changes the meaning of every address.
#[inline]
pub unsafe fn write_sctlr_el1(value: u64) {
    write_sysreg!("SCTLR_EL1", value);
}

/// Write MAIR_EL1
///
/// # Safety
///
/// Changes the memory type of every live mapping.
#[inline]
pub unsafe fn write_mair_el1(value: u64) {
    write_sysreg!("MAIR_EL1", value);
}

/// Write TCR_EL1
///
/// # Safety
///
/// Changes the translation regime.
#[inline]
pub unsafe fn write_tcr_el1(value: u64) {
    write_sysreg!("TCR_EL1", value);
}

/// Write TTBR0_EL1
///
/// # Safety
///
/// `value` must point at a valid L0 table for the low range.
#[inline]
pub unsafe fn write_ttbr0_el1(value: u64) {
    write_sysreg!("TTBR0_EL1", value);
}

/// Write TTBR1_EL1
///
/// # Safety
///
/// `value` must point at a valid L0 table for the high range.
#[inline]
pub unsafe fn write_ttbr1_el1(value: u64) {
    write_sysreg!("TTBR1_EL1", value);
}

// =============================================================================
// Relocating Jump
// =============================================================================

/// Add `offset` to SP, then branch to `entry + offset`.
///
/// Both happen inside one asm block with no memory access in between.
///
/// # Safety
///
/// The stack and `entry` must be mapped at `+offset`.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[inline(always)]
pub unsafe fn relocate_and_jump(offset: u64, entry: u64) -> ! {
    let target = entry.wrapping_add(offset);
    // SAFETY: caller guarantees the stack and target are mapped at +offset
    unsafe {
        asm!(
            "add sp, sp, {off}",
            "br {target}",
            off = in(reg) offset,
            target = in(reg) target,
            options(noreturn)
        )
    }
}

/// Host builds cannot leave the current address space.
///
/// # Safety
///
/// Never returns; records the branch target and panics.
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub unsafe fn relocate_and_jump(offset: u64, entry: u64) -> ! {
    let target = entry.wrapping_add(offset);
    sim::record(HwOp::InsnWith("br {}", target));
    panic!("MMU: higher-half jump to {target:#x} requires bare-metal AArch64");
}
