//! # RISC-V Privileged Primitives
//!
//! Fences, `sfence.vma`, the `satp` CSR and the relocating jump. Real
//! instructions on bare-metal RV64 only; the host model elsewhere.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "riscv64", target_os = "none"))] {
        use core::arch::asm;

        macro_rules! insn {
            ($insn:literal) => {
                // SAFETY: fences and address-translation fences touch no memory
                unsafe { asm!($insn, options(nostack, preserves_flags)) }
            };
            ($insn:literal, $a:expr) => {
                // SAFETY: as above
                unsafe { asm!($insn, in(reg) $a, options(nostack, preserves_flags)) }
            };
            ($insn:literal, $a:expr, $b:expr) => {
                // SAFETY: as above
                unsafe { asm!($insn, in(reg) $a, in(reg) $b, options(nostack, preserves_flags)) }
            };
        }

        macro_rules! read_csr {
            ($csr:literal) => {{
                let value: u64;
                // SAFETY: reading a supervisor CSR has no side effects
                unsafe { asm!(concat!("csrr {}, ", $csr), out(reg) value, options(nomem, nostack, preserves_flags)) };
                value
            }};
        }

        macro_rules! write_csr {
            ($csr:literal, $value:expr) => {
                // SAFETY: caller upholds the CSR's contract
                unsafe { asm!(concat!("csrw ", $csr, ", {}"), in(reg) $value, options(nostack)) }
            };
        }
    } else {
        use crate::sim::{self, HwOp};

        macro_rules! insn {
            ($insn:literal) => {
                sim::record(HwOp::Insn($insn))
            };
            ($insn:literal, $a:expr) => {
                sim::record(HwOp::InsnWith($insn, $a))
            };
            ($insn:literal, $a:expr, $b:expr) => {
                sim::record(HwOp::InsnWith2($insn, $a, $b))
            };
        }

        macro_rules! read_csr {
            ($csr:literal) => {
                sim::read_reg($csr)
            };
        }

        macro_rules! write_csr {
            ($csr:literal, $value:expr) => {
                sim::record(HwOp::WriteReg($csr, $value))
            };
        }
    }
}

// =============================================================================
// Fences
// =============================================================================

/// Order prior stores before later stores (PTE writes before the walk)
#[inline(always)]
pub fn fence_w_w() {
    insn!("fence w, w");
}

/// Full memory fence
#[inline(always)]
pub fn fence_rw_rw() {
    insn!("fence rw, rw");
}

// =============================================================================
// Address Translation Fences
// =============================================================================

/// `sfence.vma zero, zero`
#[inline(always)]
pub fn sfence_vma_all() {
    insn!("sfence.vma");
}

/// `sfence.vma va, zero`
#[inline(always)]
pub fn sfence_vma_addr(va: u64) {
    insn!("sfence.vma {}, zero", va);
}

/// `sfence.vma zero, asid`
#[inline(always)]
pub fn sfence_vma_asid(asid: u64) {
    insn!("sfence.vma zero, {}", asid);
}

/// `sfence.vma va, asid`
#[inline(always)]
pub fn sfence_vma_addr_asid(va: u64, asid: u64) {
    insn!("sfence.vma {}, {}", va, asid);
}

// =============================================================================
// satp
// =============================================================================

/// Read satp
#[inline]
pub fn read_satp() -> u64 {
    read_csr!("satp")
}

/// Write satp
///
/// # Safety
///
/// Switches the translation regime of the executing hart.
#[inline]
pub unsafe fn write_satp(value: u64) {
    write_csr!("satp", value);
}

// =============================================================================
// Relocating Jump
// =============================================================================

/// Add `offset` to SP, then jump to `entry + offset`.
///
/// # Safety
///
/// The stack and `entry` must be mapped at `+offset`.
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[inline(always)]
pub unsafe fn relocate_and_jump(offset: u64, entry: u64) -> ! {
    let target = entry.wrapping_add(offset);
    // SAFETY: caller guarantees the stack and target are mapped at +offset
    unsafe {
        asm!(
            "add sp, sp, {off}",
            "jr {target}",
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
/// Never returns; records the jump target and panics.
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
pub unsafe fn relocate_and_jump(offset: u64, entry: u64) -> ! {
    let target = entry.wrapping_add(offset);
    sim::record(HwOp::InsnWith("jr {}", target));
    panic!("MMU: higher-half jump to {target:#x} requires bare-metal RISC-V");
}
