//! AArch64 address-space layout (48-bit VA, two halves).

/// Highest address translated through TTBR0_EL1
pub const LOW_MAX: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Lowest address translated through TTBR1_EL1
pub const HIGH_MIN: u64 = 0xFFFF_0000_0000_0000;

/// Base of the physmap: physical `p` is visible at `KERNEL_VIRT_BASE + p`
pub const KERNEL_VIRT_BASE: u64 = HIGH_MIN;

/// Start of DRAM on the QEMU `virt` machine
pub const RAM_BASE: u64 = 0x4000_0000;

/// Bits of virtual address per half
pub const VA_BITS: u32 = 48;
