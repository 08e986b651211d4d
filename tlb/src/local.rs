//! # Local TLB Operations
//!
//! Invalidation on the calling hart only, using SFENCE.VMA.
//!
//! ```text
//! SFENCE.VMA x0, x0     - Flush entire TLB
//! SFENCE.VMA rs1, x0    - Flush TLB entries for address in rs1 (all ASIDs)
//! SFENCE.VMA x0, rs2    - Flush all entries for ASID in rs2
//! SFENCE.VMA rs1, rs2   - Flush entry for specific (address, ASID)
//! ```
//!
//! Every variant also orders the hart's earlier page-table stores before
//! its later implicit page-table reads.

use crate::asid::Asid;
use crate::config;
use crate::plan::FlushRequest;

/// TLB invalidation on the current hart
///
/// Both operations are unconditional and act as memory barriers for
/// address translation.
pub trait LocalTlb: Sync {
    /// Flush every entry, or every entry of `asid`
    fn flush_all(&self, asid: Option<Asid>);

    /// Flush the entries translating `addr`, in all address spaces or in `asid`
    fn flush_page(&self, addr: usize, asid: Option<Asid>);
}

impl<T: LocalTlb + ?Sized> LocalTlb for &T {
    #[inline]
    fn flush_all(&self, asid: Option<Asid>) {
        (**self).flush_all(asid);
    }

    #[inline]
    fn flush_page(&self, addr: usize, asid: Option<Asid>) {
        (**self).flush_page(addr, asid);
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        use core::arch::asm;

        /// SFENCE.VMA on the executing hart
        #[derive(Debug, Clone, Copy, Default)]
        pub struct Sfence;

        impl LocalTlb for Sfence {
            #[inline]
            fn flush_all(&self, asid: Option<Asid>) {
                // No `nomem`: the asm is also a compiler barrier.
                match asid {
                    Some(asid) => unsafe {
                        asm!("sfence.vma zero, {0}", in(reg) asid.as_usize(), options(nostack));
                    },
                    None => unsafe {
                        asm!("sfence.vma zero, zero", options(nostack));
                    },
                }
            }

            #[inline]
            fn flush_page(&self, addr: usize, asid: Option<Asid>) {
                match asid {
                    Some(asid) => unsafe {
                        asm!(
                            "sfence.vma {0}, {1}",
                            in(reg) addr,
                            in(reg) asid.as_usize(),
                            options(nostack)
                        );
                    },
                    None => unsafe {
                        asm!("sfence.vma {0}, zero", in(reg) addr, options(nostack));
                    },
                }
            }
        }
    }
}

/// Plan `request` against the current threshold and run it on this hart
///
/// This is also what each target runs when a shootdown is delivered by IPI.
#[inline]
pub fn local_flush_range<T: LocalTlb + ?Sized>(tlb: &T, request: &FlushRequest) {
    request.plan(config::flush_all_threshold()).execute(tlb);
}
