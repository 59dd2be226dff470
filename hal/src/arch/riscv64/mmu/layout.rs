//! Sv39 address-space layout (39-bit VA, sign-extended).

/// Bits of virtual address
pub const VA_BITS: u32 = 39;

/// Base of the physmap: physical `p` is visible at `KERNEL_VIRT_BASE + p`
pub const KERNEL_VIRT_BASE: u64 = 0xFFFF_FFC0_0000_0000;

/// First root slot of the upper half; identity slots lie below it
pub const HIGH_HALF_SLOT: usize = 256;

/// Start of DRAM on the QEMU `virt` machine
pub const RAM_BASE: u64 = 0x8000_0000;
