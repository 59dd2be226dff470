//! # Mapping Flags
//!
//! Architecture-neutral permissions requested by callers of the mapper.
//! Readability is implied: every valid leaf is readable. With no flag set a
//! mapping is read-only, privileged and non-executable.

use core::fmt;

bitflags::bitflags! {
    /// Mapping flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// Stores permitted
        const WRITE = 1 << 0;
        /// Instruction fetch permitted
        const EXEC = 1 << 1;
        /// Accessible from the lowest privilege level
        const USER = 1 << 2;
        /// Device memory (uncached, strongly ordered, never executable)
        const DEVICE = 1 << 3;

        /// Kernel read-only data
        const KERNEL_RO = 0;
        /// Kernel data
        const KERNEL_RW = Self::WRITE.bits();
        /// Kernel code
        const KERNEL_RX = Self::EXEC.bits();
        /// Boot mappings: the image runs from them before sections are split
        const KERNEL_RWX = Self::WRITE.bits() | Self::EXEC.bits();
        /// User data
        const USER_RW = Self::USER.bits() | Self::WRITE.bits();
        /// User code
        const USER_RX = Self::USER.bits() | Self::EXEC.bits();
        /// Memory-mapped I/O for the kernel
        const MMIO = Self::WRITE.bits() | Self::DEVICE.bits();
    }
}

impl MapFlags {
    /// Build from the three caller-visible options
    pub const fn from_parts(write: bool, exec: bool, user: bool) -> Self {
        let mut bits = 0;
        if write {
            bits |= Self::WRITE.bits();
        }
        if exec {
            bits |= Self::EXEC.bits();
        }
        if user {
            bits |= Self::USER.bits();
        }
        Self::from_bits_truncate(bits)
    }

    /// Check if stores are permitted
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Check if instruction fetch is permitted
    pub const fn is_executable(self) -> bool {
        self.contains(Self::EXEC)
    }

    /// Check if user accessible
    pub const fn is_user(self) -> bool {
        self.contains(Self::USER)
    }

    /// Check if device memory
    pub const fn is_device(self) -> bool {
        self.contains(Self::DEVICE)
    }
}

impl fmt::Display for MapFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}{}{}{}",
            if self.is_writable() { 'w' } else { '-' },
            if self.is_executable() { 'x' } else { '-' },
            if self.is_user() { 'u' } else { '-' },
            if self.is_device() { 'd' } else { '-' },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        assert_eq!(MapFlags::from_parts(false, false, false), MapFlags::KERNEL_RO);
        assert_eq!(MapFlags::from_parts(true, false, true), MapFlags::USER_RW);
        assert_eq!(MapFlags::from_parts(true, true, false), MapFlags::KERNEL_RWX);
    }

    #[test]
    fn test_display() {
        assert_eq!(MapFlags::KERNEL_RO.to_string(), "r----");
        assert_eq!(MapFlags::USER_RX.to_string(), "r-xu-");
        assert_eq!(MapFlags::MMIO.to_string(), "rw--d");
    }
}
