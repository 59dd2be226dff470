//! # AArch64 Memory Management Unit
//!
//! 4 KiB granule, 48-bit virtual addresses, four levels. The low half is
//! walked from TTBR0_EL1 and the high half from TTBR1_EL1.

pub mod entries;
pub mod layout;
pub mod regs;
pub mod roots;
pub mod tlb;

use crate::arch::aarch64::{cpu, AArch64};
use crate::mmu::tlb::TlbScope;
use crate::mmu::{Architecture, Asid, VirtAddr, PAGE_SIZE};

use entries::Descriptor;
use roots::Aarch64Roots;

impl Architecture for AArch64 {
    type Entry = Descriptor;
    type Roots = Aarch64Roots;

    const NAME: &'static str = "AArch64";
    const LEVELS: usize = 4;
    const KERNEL_VIRT_BASE: u64 = layout::KERNEL_VIRT_BASE;
    const RAM_BASE: u64 = layout::RAM_BASE;

    #[inline]
    fn is_canonical(va: VirtAddr) -> bool {
        va.as_u64() <= layout::LOW_MAX || va.as_u64() >= layout::HIGH_MIN
    }

    #[inline]
    fn store_barrier() {
        cpu::dsb_ishst();
    }

    #[inline]
    fn flush_all() {
        tlb::flush_all();
    }

    #[inline]
    fn flush_addr(va: VirtAddr) {
        tlb::flush_addr(va);
    }

    #[inline]
    fn flush_asid(asid: Asid) {
        tlb::flush_asid(asid);
    }

    #[inline]
    fn flush_addr_asid(va: VirtAddr, asid: Asid) {
        tlb::flush_addr_asid(va, asid);
    }

    #[inline]
    fn flush_all_local() {
        tlb::flush_all_local();
    }

    unsafe fn enable_translation(roots: &Aarch64Roots) {
        let ttbr0 = roots.ttbr0_base();
        let ttbr1 = roots.ttbr1_base();
        assert!(ttbr0 % PAGE_SIZE == 0, "MMU: TTBR0 table {ttbr0:#x} not page aligned");
        assert!(ttbr1 % PAGE_SIZE == 0, "MMU: TTBR1 table {ttbr1:#x} not page aligned");

        log::debug!("MMU: TTBR0={ttbr0:#x} TTBR1={ttbr1:#x} TCR={:#x}", regs::TCR_VALUE);

        // SAFETY: caller guarantees the running code is reachable through `roots`
        unsafe {
            cpu::write_mair_el1(regs::MAIR_VALUE);
            cpu::write_tcr_el1(regs::TCR_VALUE);
            cpu::write_ttbr0_el1(ttbr0);
            cpu::write_ttbr1_el1(ttbr1);
        }
        cpu::isb();

        crate::mmu::tlb::flush::<Self>(TlbScope::Local);

        let sctlr = cpu::read_sctlr_el1() | regs::SCTLR_M | regs::SCTLR_C | regs::SCTLR_I;
        // SAFETY: as above
        unsafe { cpu::write_sctlr_el1(sctlr) };
        cpu::isb();
    }

    unsafe fn jump_to_higher_half(entry: extern "C" fn() -> !) -> ! {
        // SAFETY: caller guarantees the physmap covers the stack and `entry`
        unsafe { cpu::relocate_and_jump(layout::KERNEL_VIRT_BASE, entry as usize as u64) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::RootTables;
    use crate::sim::{self, HwOp};

    #[test]
    fn test_canonical_boundaries() {
        assert!(AArch64::is_canonical(VirtAddr::new(0)));
        assert!(AArch64::is_canonical(VirtAddr::new(0x0000_FFFF_FFFF_FFFF)));
        assert!(!AArch64::is_canonical(VirtAddr::new(0x0001_0000_0000_0000)));
        assert!(!AArch64::is_canonical(VirtAddr::new(0xFFFE_FFFF_FFFF_FFFF)));
        assert!(AArch64::is_canonical(VirtAddr::new(0xFFFF_0000_0000_0000)));
        assert!(AArch64::is_canonical(VirtAddr::new(u64::MAX)));
    }

    #[test]
    fn test_enable_sequence() {
        let mut roots = Box::new(Aarch64Roots::EMPTY);
        roots.link();

        sim::reset();
        unsafe { AArch64::enable_translation(&roots) };
        let ops = sim::take();

        let pos = |op: &HwOp| ops.iter().position(|o| o == op);
        let mair = pos(&HwOp::WriteReg("MAIR_EL1", 0x44_00FF)).unwrap();
        let tcr = pos(&HwOp::WriteReg("TCR_EL1", regs::TCR_VALUE)).unwrap();
        let ttbr0 = pos(&HwOp::WriteReg("TTBR0_EL1", roots.ttbr0_base())).unwrap();
        let ttbr1 = pos(&HwOp::WriteReg("TTBR1_EL1", roots.ttbr1_base())).unwrap();
        let flush = pos(&HwOp::Insn("tlbi vmalle1")).unwrap();
        let sctlr = ops
            .iter()
            .position(|o| matches!(o, HwOp::WriteReg("SCTLR_EL1", _)))
            .unwrap();

        assert!(mair < tcr && tcr < ttbr0 && ttbr0 < ttbr1);
        assert!(ttbr1 < flush && flush < sctlr);
        assert!(!ops.contains(&HwOp::Insn("tlbi vmalle1is")));
        assert_eq!(ops.last(), Some(&HwOp::Insn("isb")));

        if let HwOp::WriteReg(_, value) = ops[sctlr] {
            let want = regs::SCTLR_M | regs::SCTLR_C | regs::SCTLR_I;
            assert_eq!(value & want, want);
        }
    }
}
