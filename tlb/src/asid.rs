//! # Address Space Identifiers
//!
//! ASIDs tag TLB entries so entries from several address spaces can live in
//! the TLB at once. Allocation and recycling belong to the ASID allocator;
//! this module only answers "which ASID should a flush for this address
//! space carry, if any".
//!
//! - RISC-V implements up to 16 ASID bits (`satp.ASID`)
//! - With tagging disabled every flush is ASID-less, which invalidates the
//!   address for all address spaces

use core::fmt;

use static_assertions::assert_eq_size;

use crate::config::TlbConfig;
use crate::mm::AddressSpace;

// ============================================================================
// ASID Constants
// ============================================================================

/// Maximum number of ASID bits an implementation may provide
pub const MAX_ASID_BITS: u32 = 16;

// ============================================================================
// ASID Type
// ============================================================================

/// Address Space Identifier
///
/// "No ASID" is expressed as `Option<Asid>::None`, never as a reserved
/// value, so every `u16` is a valid ASID.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Asid(u16);

assert_eq_size!(Asid, u16);

impl Asid {
    /// Create new ASID
    #[inline]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw value
    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Raw value widened for register operands
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Asid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asid({})", self.0)
    }
}

impl fmt::Display for Asid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Asid {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Asid> for u16 {
    fn from(asid: Asid) -> u16 {
        asid.0
    }
}

// ============================================================================
// ASID Tagging
// ============================================================================

/// Whether flushes are tagged with ASIDs, and the implemented ASID width
///
/// Fixed at initialization, the same way the allocator decides once whether
/// the hardware has enough ASID bits to be worth using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsidTagging {
    enabled: bool,
    mask: usize,
}

impl AsidTagging {
    /// Tagging off: every flush is ASID-less
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            mask: 0,
        }
    }

    /// Tagging on with `bits` implemented ASID bits
    pub const fn enabled(bits: u32) -> Self {
        let bits = if bits > MAX_ASID_BITS { MAX_ASID_BITS } else { bits };
        Self {
            enabled: true,
            mask: (1usize << bits) - 1,
        }
    }

    /// Derive the tagging mode from the TLB configuration
    pub fn from_config(config: &TlbConfig) -> Self {
        if !config.use_asid {
            return Self::disabled();
        }
        if config.asid_bits == 0 {
            log::warn!("TLB: ASID tagging requested but no ASID bits implemented");
            return Self::disabled();
        }
        Self::enabled(config.asid_bits)
    }

    /// Check whether flushes carry ASIDs
    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mask applied to context ids
    #[inline]
    pub const fn mask(&self) -> usize {
        self.mask
    }

    /// ASID a flush for `mm` should carry
    ///
    /// The context id is read without synchronizing against the allocator.
    /// A concurrent reassignment can make the result stale; the allocator
    /// flushes everything when it recycles ASIDs, which covers that window.
    #[inline]
    pub fn asid_of<A: AddressSpace + ?Sized>(&self, mm: &A) -> Option<Asid> {
        if !self.enabled {
            return None;
        }
        Some(Asid::new((mm.context_id() & self.mask) as u16))
    }
}

impl Default for AsidTagging {
    fn default() -> Self {
        Self::disabled()
    }
}
