//! # AArch64 Virtual Memory Backend
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Orbit - AArch64 VM backend                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TTBR0_EL1 ──► L0 ──► L1 (identity, 1 GiB blocks)           │
//! │  TTBR1_EL1 ──► L0 ──► L1 (physmap,  1 GiB blocks)           │
//! │                                                             │
//! │  4 KiB granule · 48-bit VA · L0..L3 · MAIR idx 0/1/2        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`cpu`]: barriers, TLBI, system registers, the relocating jump
//! - [`mmu`]: descriptors, root tables, TLB sequences, MMU enable

pub mod cpu;
pub mod mmu;

pub use mmu::entries::Descriptor;
pub use mmu::roots::Aarch64Roots;

/// Marker for the AArch64 translation regime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AArch64;
