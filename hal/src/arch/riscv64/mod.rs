//! # RISC-V Sv39 Virtual Memory Backend
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Orbit - RISC-V Sv39 VM backend               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  satp ──► root (L2)                                         │
//! │            [0..256)   identity, 1 GiB leaves                │
//! │            [256..512) physmap,  1 GiB leaves                │
//! │                                                             │
//! │  4 KiB pages · 39-bit VA · L2..L0 · optional Svpbmt         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cpu;
pub mod mmu;

pub use mmu::entries::Pte;
pub use mmu::roots::Sv39Roots;

/// Marker for the Sv39 translation regime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Riscv64;
