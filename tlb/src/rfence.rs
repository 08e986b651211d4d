//! # Remote Fences
//!
//! Strategies for running a flush on other harts. Both block until every
//! target has finished; neither has a partial-success outcome.
//!
//! - [`SbiRfence`]: one SBI RFENCE call per 64-hart window of the target set
//! - [`IpiRfence`]: a cross-call that runs the local flush on every target
//!
//! [`Rfence`] holds whichever one was picked at boot.

use crate::config::BroadcastPreference;
use crate::cpumask::Cpus;
use crate::error::FenceError;
use crate::local::{local_flush_range, LocalTlb};
use crate::plan::FlushRequest;
use crate::sbi::{self, eid, rfence_fid, SbiEcall, SbiError, HART_MASK_BASE_ALL};
use crate::stats;

/// Synchronous remote SFENCE.VMA
pub trait RemoteFence: Sync {
    /// Apply `request` on every CPU in `cpus` and wait for all of them
    fn sfence_vma(&self, cpus: Cpus<'_>, request: &FlushRequest) -> Result<(), FenceError>;
}

// ============================================================================
// Firmware (SBI RFENCE)
// ============================================================================

/// Remote fences through the SBI RFENCE extension
#[derive(Debug)]
pub struct SbiRfence<E> {
    sbi: E,
}

impl<E: SbiEcall> SbiRfence<E> {
    /// Use `sbi` without probing
    pub const fn new(sbi: E) -> Self {
        Self { sbi }
    }

    /// Use `sbi` if it implements RFENCE
    pub fn probe(sbi: E) -> Option<Self> {
        if sbi::probe_extension(&sbi, eid::RFENCE) {
            Some(Self::new(sbi))
        } else {
            None
        }
    }

    fn remote_sfence_vma(
        &self,
        hart_mask: usize,
        hart_mask_base: usize,
        request: &FlushRequest,
    ) -> Result<(), SbiError> {
        let ret = match request.asid {
            Some(asid) => self.sbi.ecall(
                eid::RFENCE,
                rfence_fid::REMOTE_SFENCE_VMA_ASID,
                [
                    hart_mask,
                    hart_mask_base,
                    request.start,
                    request.size,
                    asid.as_usize(),
                    0,
                ],
            ),
            None => self.sbi.ecall(
                eid::RFENCE,
                rfence_fid::REMOTE_SFENCE_VMA,
                [hart_mask, hart_mask_base, request.start, request.size, 0, 0],
            ),
        };
        ret.into_result().map(|_| ())
    }
}

impl<E: SbiEcall> RemoteFence for SbiRfence<E> {
    fn sfence_vma(&self, cpus: Cpus<'_>, request: &FlushRequest) -> Result<(), FenceError> {
        match cpus {
            Cpus::Online => self.remote_sfence_vma(0, HART_MASK_BASE_ALL, request)?,
            Cpus::Mask(mask) => {
                for (window, bits) in mask.words().iter().enumerate() {
                    if *bits == 0 {
                        continue;
                    }
                    self.remote_sfence_vma(*bits as usize, window * 64, request)?;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// IPI
// ============================================================================

/// Run a function on a set of CPUs
pub trait CrossCall: Sync {
    /// Run `func` on every CPU in `cpus` (the caller included, if it is a
    /// member) and return once all of them have finished
    fn on_each_cpu_mask(&self, cpus: Cpus<'_>, func: &(dyn Fn() + Sync)) -> Result<(), FenceError>;
}

impl<T: CrossCall + ?Sized> CrossCall for &T {
    #[inline]
    fn on_each_cpu_mask(&self, cpus: Cpus<'_>, func: &(dyn Fn() + Sync)) -> Result<(), FenceError> {
        (**self).on_each_cpu_mask(cpus, func)
    }
}

/// Remote fences through IPIs: every target plans and flushes locally
#[derive(Debug)]
pub struct IpiRfence<X, L> {
    ipi: X,
    local: L,
}

impl<X: CrossCall, L: LocalTlb> IpiRfence<X, L> {
    /// Create the IPI strategy
    pub const fn new(ipi: X, local: L) -> Self {
        Self { ipi, local }
    }
}

impl<X: CrossCall, L: LocalTlb> RemoteFence for IpiRfence<X, L> {
    fn sfence_vma(&self, cpus: Cpus<'_>, request: &FlushRequest) -> Result<(), FenceError> {
        let request = *request;
        let local = &self.local;
        self.ipi
            .on_each_cpu_mask(cpus, &move || local_flush_range(local, &request))
    }
}

// ============================================================================
// Boot-time Selection
// ============================================================================

/// Broadcast strategy chosen once at boot
#[derive(Debug)]
pub enum Rfence<E, X, L> {
    /// SBI RFENCE
    Firmware(SbiRfence<E>),
    /// IPI cross-calls
    Ipi(IpiRfence<X, L>),
}

impl<E: SbiEcall, X: CrossCall, L: LocalTlb> Rfence<E, X, L> {
    /// Pick the strategy for `preference`
    ///
    /// Firmware is used when preferred and the RFENCE extension is present;
    /// everything else goes through IPIs.
    pub fn select(preference: BroadcastPreference, sbi: E, ipi: X, local: L) -> Self {
        match preference {
            BroadcastPreference::Firmware => match SbiRfence::probe(sbi) {
                Some(firmware) => {
                    log::info!("TLB: remote fences through SBI RFENCE");
                    Rfence::Firmware(firmware)
                }
                None => {
                    log::warn!("TLB: SBI RFENCE extension missing, using IPIs");
                    Rfence::Ipi(IpiRfence::new(ipi, local))
                }
            },
            BroadcastPreference::Ipi => {
                log::info!("TLB: remote fences through IPIs");
                Rfence::Ipi(IpiRfence::new(ipi, local))
            }
        }
    }

    /// Strategy in use
    pub fn kind(&self) -> BroadcastPreference {
        match self {
            Rfence::Firmware(_) => BroadcastPreference::Firmware,
            Rfence::Ipi(_) => BroadcastPreference::Ipi,
        }
    }
}

impl<E: SbiEcall, X: CrossCall, L: LocalTlb> RemoteFence for Rfence<E, X, L> {
    fn sfence_vma(&self, cpus: Cpus<'_>, request: &FlushRequest) -> Result<(), FenceError> {
        match self {
            Rfence::Firmware(firmware) => {
                stats::record_firmware_broadcast();
                firmware.sfence_vma(cpus, request)
            }
            Rfence::Ipi(ipi) => {
                stats::record_ipi_broadcast();
                ipi.sfence_vma(cpus, request)
            }
        }
    }
}
