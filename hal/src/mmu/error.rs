//! # Virtual Memory Errors

use core::fmt;

use super::addr::PhysAddr;
use super::boot::BootStage;

// =============================================================================
// Mapping Errors
// =============================================================================

/// Mapping error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Virtual or physical address not page aligned
    NotAligned,
    /// Virtual address outside both canonical ranges
    NotCanonical,
    /// An intermediate level is missing
    TableNotPresent,
    /// An intermediate level is already a leaf
    SuperpageConflict,
    /// Target slot already holds a valid entry
    AlreadyMapped,
    /// Nothing mapped at the address
    NotMapped,
    /// Table allocation callback returned nothing
    OutOfMemory,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAligned => write!(f, "address not page aligned"),
            Self::NotCanonical => write!(f, "virtual address not canonical"),
            Self::TableNotPresent => write!(f, "intermediate page table not present"),
            Self::SuperpageConflict => write!(f, "address covered by a superpage"),
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::OutOfMemory => write!(f, "out of memory for page tables"),
        }
    }
}

/// Result type for mapping operations
pub type MapResult<T> = Result<T, MapError>;

// =============================================================================
// Boot Errors
// =============================================================================

/// Boot sequencing error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Transition requested from the wrong stage
    OutOfOrder {
        /// Stage the transition starts from
        expected: BootStage,
        /// Stage the sequencer is in
        found: BootStage,
    },
    /// Boot range does not fit the identity or physmap structure
    OutOfRange {
        /// End of the range that had to be mapped
        end: PhysAddr,
        /// Bytes the structure can describe
        capacity: u64,
    },
    /// Kernel address space was already published
    AlreadyPublished,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder { expected, found } => {
                write!(f, "boot transition expects stage {expected}, found {found}")
            }
            Self::OutOfRange { end, capacity } => {
                write!(f, "boot range ends at {end}, beyond capacity {capacity:#x}")
            }
            Self::AlreadyPublished => write!(f, "kernel address space already published"),
        }
    }
}
