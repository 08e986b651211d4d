//! # XuanTie TLB Reload
//!
//! T-Head XuanTie C9xx cores can write one TLB entry directly through
//! custom M-mode-visible supervisor CSRs. This is a reactive path: after a
//! fault installs a PTE, the entry is loaded instead of waiting for the
//! hardware walker.
//!
//! ## Register Layout
//!
//! ```text
//! SMEH  = ASID | PAGE_4K (bit 16) | VPN << 19
//! SMEL  = C | B | SH | SEC | V | PFN << 10 | PTE[9:1]
//! SMCIR = TLBWR (bit 28)
//! ```
//!
//! The strongly-ordered attribute (SMEL bit 63) is always left clear.
//!
//! Experimental. Invalidation correctness never depends on this module.

use bitflags::bitflags;
use core::fmt;

use crate::asid::AsidTagging;
use crate::cpu::{CpuPin, Processors};
use crate::mm::AddressSpace;
use crate::PAGE_SHIFT;

/// Custom CSR numbers
pub mod csr {
    /// Entry low (translation and attributes)
    pub const SMEL: u16 = 0x9C1;
    /// Entry high (match fields)
    pub const SMEH: u16 = 0x9C2;
    /// Command register
    pub const SMCIR: u16 = 0x9C3;
}

/// SMEH page-size field for a 4 KiB page
pub const SMEH_PAGE_4K: u64 = 1 << 16;

/// SMEH VPN position
pub const SMEH_VPN_SHIFT: u32 = 19;

/// SMEL PFN position
pub const SMEL_PFN_SHIFT: u32 = 10;

/// SMCIR command: write the staged entry
pub const SMCIR_TLBWR: u64 = 1 << 28;

/// PTE bits copied verbatim into SMEL (R, W, X, U, G, A, D, RSW)
pub const PTE_PERMISSION_MASK: u64 = 0x3FE;

const PTE_VALID: u64 = 1 << 0;
const PTE_PFN_SHIFT: u32 = 10;
const PTE_PFN_MASK: u64 = (1 << 44) - 1;

bitflags! {
    /// SMEL attribute bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SmelFlags: u64 {
        /// Strongly ordered
        const STRONG_ORDER = 1 << 63;
        /// Cacheable
        const CACHEABLE = 1 << 62;
        /// Bufferable
        const BUFFERABLE = 1 << 61;
        /// Shareable
        const SHAREABLE = 1 << 60;
        /// Trustable (secure)
        const TRUSTABLE = 1 << 59;
        /// Entry valid
        const VALID = 1 << 0;
    }
}

impl SmelFlags {
    /// Attributes of a reloaded normal-memory entry
    pub const NORMAL: Self = Self::CACHEABLE
        .union(Self::BUFFERABLE)
        .union(Self::SHAREABLE)
        .union(Self::TRUSTABLE)
        .union(Self::VALID);
}

// ============================================================================
// Registers
// ============================================================================

/// Reload failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadError {
    /// The PTE is not valid
    NotPresent,
    /// The core rejected the staged entry
    CommitFailed,
}

impl fmt::Display for ReloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadError::NotPresent => f.write_str("PTE not present"),
            ReloadError::CommitFailed => f.write_str("TLB write command failed"),
        }
    }
}

/// The hart's TLB staging registers
pub trait TlbRegisters {
    /// Stage the match fields
    fn write_smeh(&self, value: u64);

    /// Stage the translation
    fn write_smel(&self, value: u64);

    /// Issue a TLB command
    fn commit(&self, smcir: u64) -> Result<(), ReloadError>;
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        macro_rules! write_csr {
            ($csr:literal, $value:expr) => {{
                unsafe {
                    core::arch::asm!(
                        concat!("csrw ", $csr, ", {}"),
                        in(reg) $value,
                        options(nostack)
                    );
                }
            }};
        }

        /// The executing hart's XuanTie CSRs
        #[derive(Debug, Clone, Copy, Default)]
        pub struct XuantieCsr;

        impl TlbRegisters for XuantieCsr {
            #[inline]
            fn write_smeh(&self, value: u64) {
                write_csr!("0x9c2", value);
            }

            #[inline]
            fn write_smel(&self, value: u64) {
                write_csr!("0x9c1", value);
            }

            #[inline]
            fn commit(&self, smcir: u64) -> Result<(), ReloadError> {
                write_csr!("0x9c3", smcir);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// A fault that just installed `pte` for `address`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultEntry {
    /// Faulting virtual address
    pub address: usize,
    /// Installed page-table entry
    pub pte: u64,
}

impl FaultEntry {
    /// Physical page number of the PTE
    #[inline]
    pub const fn pfn(&self) -> u64 {
        (self.pte >> PTE_PFN_SHIFT) & PTE_PFN_MASK
    }

    /// Check the PTE valid bit
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.pte & PTE_VALID != 0
    }
}

/// SMEH value for `address` in `asid`
#[inline]
pub const fn smeh(asid: u16, address: usize) -> u64 {
    let vpn = (address >> PAGE_SHIFT) as u64;
    asid as u64 | SMEH_PAGE_4K | (vpn << SMEH_VPN_SHIFT)
}

/// SMEL value for a PTE
#[inline]
pub const fn smel(pte: u64) -> u64 {
    let pfn = (pte >> PTE_PFN_SHIFT) & PTE_PFN_MASK;
    SmelFlags::NORMAL.bits() | (pfn << SMEL_PFN_SHIFT) | (pte & PTE_PERMISSION_MASK)
}

/// Load the entry for `fault` into the current hart's TLB
///
/// The caller holds the page-table lock covering `fault.address`.
///
/// # Panics
///
/// Panics if the core rejects the write.
pub fn load_tlb<R, P, A>(
    regs: &R,
    cpus: &P,
    tagging: AsidTagging,
    mm: &A,
    fault: FaultEntry,
) -> Result<(), ReloadError>
where
    R: TlbRegisters + ?Sized,
    P: Processors + ?Sized,
    A: AddressSpace + ?Sized,
{
    if !fault.is_present() {
        return Err(ReloadError::NotPresent);
    }

    let asid = tagging.asid_of(mm).map_or(0, |asid| asid.value());
    let pin = CpuPin::new(cpus);

    log::trace!(
        "TLB: reload {:#x} -> pfn {:#x} asid {} on CPU {}",
        fault.address,
        fault.pfn(),
        asid,
        pin.cpu()
    );

    regs.write_smeh(smeh(asid, fault.address));
    regs.write_smel(smel(fault.pte));
    if let Err(err) = regs.commit(SMCIR_TLBWR) {
        log::error!("TLB: reload of {:#x} failed: {}", fault.address, err);
        panic!("XuanTie TLB reload failed: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::MmContext;
    use crate::testing::FakeProcessors;
    use spin::Mutex;

    #[derive(Default)]
    struct RecordingRegs {
        writes: Mutex<Vec<(u16, u64)>>,
        reject: bool,
    }

    impl TlbRegisters for RecordingRegs {
        fn write_smeh(&self, value: u64) {
            self.writes.lock().push((csr::SMEH, value));
        }

        fn write_smel(&self, value: u64) {
            self.writes.lock().push((csr::SMEL, value));
        }

        fn commit(&self, smcir: u64) -> Result<(), ReloadError> {
            self.writes.lock().push((csr::SMCIR, smcir));
            if self.reject {
                Err(ReloadError::CommitFailed)
            } else {
                Ok(())
            }
        }
    }

    // pfn 0x80123, R|W|A|D|V
    const PTE: u64 = (0x80123 << 10) | 0xC7;

    #[test]
    fn test_smeh_layout() {
        assert_eq!(smeh(5, 0x1234_5000), 5 | (1 << 16) | (0x12345 << 19));
    }

    #[test]
    fn test_smel_layout() {
        let value = smel(PTE);
        assert_eq!(value & (1 << 63), 0);
        assert_eq!(value >> 59 & 0xF, 0xF);
        assert_eq!(value >> SMEL_PFN_SHIFT & PTE_PFN_MASK, 0x80123);
        assert_eq!(value & 0x3FF, 0xC7);
    }

    #[test]
    fn test_load_writes_sequence_under_pin() {
        let regs = RecordingRegs::default();
        let cpus = FakeProcessors::new(1);
        let mm = MmContext::with_id(0x1_0007);
        let fault = FaultEntry {
            address: 0x4000_2000,
            pte: PTE,
        };

        load_tlb(&regs, &cpus, AsidTagging::enabled(16), &mm, fault).unwrap();

        assert_eq!(
            *regs.writes.lock(),
            vec![
                (csr::SMEH, smeh(7, 0x4000_2000)),
                (csr::SMEL, smel(PTE)),
                (csr::SMCIR, SMCIR_TLBWR),
            ]
        );
        assert_eq!(cpus.pin_count(), 1);
        assert_eq!(cpus.preempt_depth(), 0);
    }

    #[test]
    fn test_disabled_tagging_loads_asid_zero() {
        let regs = RecordingRegs::default();
        let cpus = FakeProcessors::new(1);
        let mm = MmContext::with_id(9);
        let fault = FaultEntry {
            address: 0x1000,
            pte: PTE,
        };

        load_tlb(&regs, &cpus, AsidTagging::disabled(), &mm, fault).unwrap();
        assert_eq!(regs.writes.lock()[0].1, smeh(0, 0x1000));
    }

    #[test]
    fn test_invalid_pte_is_rejected() {
        let regs = RecordingRegs::default();
        let cpus = FakeProcessors::new(1);
        let fault = FaultEntry {
            address: 0x1000,
            pte: PTE & !1,
        };

        let result = load_tlb(&regs, &cpus, AsidTagging::disabled(), &MmContext::new(), fault);
        assert_eq!(result, Err(ReloadError::NotPresent));
        assert!(regs.writes.lock().is_empty());
        assert_eq!(cpus.pin_count(), 0);
    }

    #[test]
    #[should_panic(expected = "XuanTie TLB reload failed")]
    fn test_commit_failure_is_fatal() {
        let regs = RecordingRegs {
            reject: true,
            ..Default::default()
        };
        let cpus = FakeProcessors::new(1);
        let fault = FaultEntry {
            address: 0x1000,
            pte: PTE,
        };
        let _ = load_tlb(&regs, &cpus, AsidTagging::disabled(), &MmContext::new(), fault);
    }
}
