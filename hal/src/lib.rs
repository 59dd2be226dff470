//! # Orbit Virtual Memory HAL
//!
//! Kernel page tables for the Orbit microkernel on AArch64 (4 KiB granule,
//! 48-bit VA) and RISC-V Sv39.
//!
//! ## Boot Flow
//!
//! ```text
//!   untranslated ──init──► identity-active ──enter_higher_half──► higher-half
//!        ──expand_physmap──► physmap-expanded ──remove_identity_mapping──► hardened
//! ```
//!
//! The boot core drives [`mmu::KernelSpace`] through these stages on a
//! statically allocated instance, then hands it to [`publish`]. From then
//! on every mapping change goes through [`kernel_space`].
//!
//! ## Backend Selection
//!
//! The `aarch64` / `riscv64` features force a backend; otherwise the build
//! target decides, falling back to AArch64 on hosts.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod arch;
pub mod mmu;

mod sim;

use mmu::{Architecture, BootError, KernelSpace, PhysAddr, VirtAddr};

cfg_if::cfg_if! {
    if #[cfg(all(feature = "aarch64", feature = "riscv64"))] {
        compile_error!("features `aarch64` and `riscv64` are mutually exclusive");
    } else if #[cfg(feature = "riscv64")] {
        /// Backend for this build
        pub type Active = arch::riscv64::Riscv64;
    } else if #[cfg(feature = "aarch64")] {
        /// Backend for this build
        pub type Active = arch::aarch64::AArch64;
    } else if #[cfg(target_arch = "riscv64")] {
        /// Backend for this build
        pub type Active = arch::riscv64::Riscv64;
    } else {
        /// Backend for this build
        pub type Active = arch::aarch64::AArch64;
    }
}

/// Physmap alias of `pa`
#[inline]
pub const fn phys_to_virt(pa: PhysAddr) -> VirtAddr {
    VirtAddr::new(pa.as_u64().wrapping_add(Active::KERNEL_VIRT_BASE))
}

/// Physical address behind physmap alias `va`
#[inline]
pub const fn virt_to_phys(va: VirtAddr) -> PhysAddr {
    PhysAddr::new(va.as_u64().wrapping_sub(Active::KERNEL_VIRT_BASE))
}

// =============================================================================
// Published Kernel Address Space
// =============================================================================

static KERNEL_SPACE: spin::Once<spin::Mutex<&'static mut KernelSpace<Active>>> = spin::Once::new();

/// Make the booted kernel address space available to the rest of the kernel.
///
/// Fails with [`BootError::AlreadyPublished`] on a second call.
pub fn publish(space: &'static mut KernelSpace<Active>) -> Result<(), BootError> {
    let mut fresh = false;
    KERNEL_SPACE.call_once(|| {
        fresh = true;
        spin::Mutex::new(space)
    });
    if !fresh {
        return Err(BootError::AlreadyPublished);
    }

    log::info!("MMU: {} kernel address space published", Active::NAME);
    Ok(())
}

/// Lock the published kernel address space, if [`publish`] has run
pub fn kernel_space() -> Option<spin::MutexGuard<'static, &'static mut KernelSpace<Active>>> {
    KERNEL_SPACE.get().map(|space| space.lock())
}
