//! # Host Model of Privileged Instructions
//!
//! Bare-metal builds of a backend never reach this module: every primitive
//! in `arch::<arch>::cpu` is an `asm!` block there. On any other target
//! (host builds, unit tests, the inactive backend of a kernel build) the
//! primitives land here instead.
//!
//! Under `cfg(test)` each thread keeps a trace of the operations it issued
//! and the last value written to every system register, so tests can check
//! barrier/invalidate ordering and what the boot sequencer programmed.
//! Outside of tests the model is inert.

/// One privileged operation as seen by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwOp {
    /// Instruction without operand (barrier, full invalidate)
    Insn(&'static str),
    /// Instruction taking a register operand (targeted invalidate)
    InsnWith(&'static str, u64),
    /// Instruction taking two register operands (address + ASID invalidate)
    InsnWith2(&'static str, u64, u64),
    /// System register / CSR write
    WriteReg(&'static str, u64),
}


#[cfg(not(test))]
mod imp {
    use super::HwOp;

    #[inline(always)]
    pub fn record(_op: HwOp) {}

    #[inline(always)]
    pub fn read_reg(_name: &'static str) -> u64 {
        0
    }
}

pub(crate) use imp::*;
