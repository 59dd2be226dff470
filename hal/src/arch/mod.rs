//! # Architecture Backends
//!
//! Both backends are always compiled; only the one matching the build
//! target issues real instructions (see each `cpu` module). The crate root
//! picks the active one as [`crate::Active`].

pub mod aarch64;
pub mod riscv64;
