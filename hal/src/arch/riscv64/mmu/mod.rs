//! # RISC-V Sv39 Memory Management Unit

pub mod entries;
pub mod layout;
pub mod roots;
pub mod satp;
pub mod tlb;

use crate::arch::riscv64::{cpu, Riscv64};
use crate::mmu::tlb::TlbScope;
use crate::mmu::vaddr::is_sign_extended;
use crate::mmu::{Architecture, Asid, PhysAddr, VirtAddr, PAGE_SIZE};

use entries::Pte;
use roots::Sv39Roots;
use satp::{Satp, SatpMode};

impl Architecture for Riscv64 {
    type Entry = Pte;
    type Roots = Sv39Roots;

    const NAME: &'static str = "RISC-V Sv39";
    const LEVELS: usize = 3;
    const KERNEL_VIRT_BASE: u64 = layout::KERNEL_VIRT_BASE;
    const RAM_BASE: u64 = layout::RAM_BASE;

    #[inline]
    fn is_canonical(va: VirtAddr) -> bool {
        is_sign_extended(va.as_u64(), layout::VA_BITS)
    }

    #[inline]
    fn store_barrier() {
        cpu::fence_w_w();
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

    unsafe fn enable_translation(roots: &Sv39Roots) {
        let root = roots.root_base();
        assert!(root % PAGE_SIZE == 0, "MMU: root table {root:#x} not page aligned");

        let satp = Satp::new(SatpMode::Sv39, Asid::KERNEL, PhysAddr::new(root));
        log::debug!("MMU: satp <- {satp}");

        // SAFETY: caller guarantees the running code is reachable through `roots`
        unsafe { cpu::write_satp(satp.bits()) };
        crate::mmu::tlb::flush::<Self>(TlbScope::Local);
    }

    unsafe fn jump_to_higher_half(entry: extern "C" fn() -> !) -> ! {
        // SAFETY: caller guarantees the physmap covers the stack and `entry`
        unsafe { cpu::relocate_and_jump(layout::KERNEL_VIRT_BASE, entry as usize as u64) }
    }
}
