//! # TLB Shootdown Dispatcher
//!
//! Entry point for page-table code. Each request is resolved to a target
//! CPU set and an ASID, then either flushed on the calling hart alone or
//! broadcast through the [`RemoteFence`] strategy chosen at boot.
//!
//! ## Broadcast Decision
//!
//! ```text
//! target set empty            -> nothing to do
//! target is every online CPU  -> broadcast
//! set == { current CPU }      -> local plan + SFENCE.VMA
//! anything else               -> broadcast (caller pinned while deciding)
//! ```
//!
//! A broadcast returns only after every target has flushed. Transport
//! failures are fatal.

use spin::Once;

use crate::asid::{Asid, AsidTagging};
use crate::batch::UnmapBatch;
use crate::config::{self, TlbConfig};
use crate::cpu::{CpuPin, Processors};
use crate::cpumask::Cpus;
use crate::error;
use crate::local::{local_flush_range, LocalTlb};
use crate::mm::{self, AddressSpace, Mapping, PagingMode};
use crate::plan::{self, FlushRequest};
use crate::rfence::RemoteFence;
use crate::{FLUSH_TLB_MAX_SIZE, PAGE_SIZE, PMD_SIZE};

// ============================================================================
// Shootdown Operations
// ============================================================================

/// TLB maintenance operations offered to page-table code
///
/// One operation per kind of page-table change. `end` bounds are exclusive.
pub trait TlbShootdown: Sync {
    /// Flush every translation on every online CPU
    fn flush_tlb_all(&self);

    /// Flush all user translations of `mm`
    fn flush_tlb_mm(&self, mm: &dyn AddressSpace);

    /// Flush `start..end` of `mm`, mapped with pages of `page_size`
    fn flush_tlb_mm_range(&self, mm: &dyn AddressSpace, start: usize, end: usize, page_size: usize);

    /// Flush one base page of `mm`
    fn flush_tlb_page(&self, mm: &dyn AddressSpace, addr: usize);

    /// Flush `start..end` of `mm`, widening the stride for NAPOT huge pages
    fn flush_tlb_range(&self, mm: &dyn AddressSpace, start: usize, end: usize, mapping: Mapping);

    /// Flush `start..end` of `mm` mapped with PMD-level huge pages
    fn flush_pmd_tlb_range(&self, mm: &dyn AddressSpace, start: usize, end: usize);

    /// Flush kernel mappings in `start..end` on every online CPU
    fn flush_tlb_kernel_range(&self, start: usize, end: usize);

    /// Flush kernel mappings in `start..end` on the calling CPU only
    fn local_flush_tlb_kernel_range(&self, start: usize, end: usize);

    /// Flush `mm` now instead of waiting for a pending batch
    fn flush_batched_pending(&self, mm: &dyn AddressSpace);

    /// Flush every CPU an unmap batch touched, then empty the batch
    fn flush_batch(&self, batch: &mut UnmapBatch);
}

// ============================================================================
// Dispatcher
// ============================================================================

/// TLB shootdown dispatcher
///
/// - `P`: scheduler services (current CPU, pinning)
/// - `L`: local SFENCE.VMA
/// - `R`: broadcast strategy
#[derive(Debug)]
pub struct Shootdown<P, L, R> {
    cpus: P,
    local: L,
    remote: R,
    tagging: AsidTagging,
    has_svnapot: bool,
    paging_mode: PagingMode,
}

impl<P: Processors, L: LocalTlb, R: RemoteFence> Shootdown<P, L, R> {
    /// Create a dispatcher
    ///
    /// Also applies `config.flush_all_threshold` as the process-wide
    /// threshold, which every CPU uses when it plans a flush.
    pub fn new(config: &TlbConfig, cpus: P, local: L, remote: R) -> Self {
        config::init(config);
        Self {
            cpus,
            local,
            remote,
            tagging: AsidTagging::from_config(config),
            has_svnapot: config.has_svnapot,
            paging_mode: config.paging_mode,
        }
    }

    /// ASID tagging in effect
    #[inline]
    pub fn tagging(&self) -> AsidTagging {
        self.tagging
    }

    /// ASID flushes for `mm` carry
    #[inline]
    pub fn asid_of<A: AddressSpace + ?Sized>(&self, mm: &A) -> Option<Asid> {
        self.tagging.asid_of(mm)
    }

    /// Stride used to flush `mapping`
    pub fn stride_for(&self, mapping: Mapping) -> usize {
        match mapping {
            Mapping::Base => PAGE_SIZE,
            Mapping::Huge(size) if self.has_svnapot => mm::hugetlb_stride(size, self.paging_mode),
            Mapping::Huge(size) => size,
        }
    }

    /// Invalidate `start..start + size` on `cpus`
    ///
    /// Returns once every CPU in `cpus` has applied an invalidation covering
    /// the range.
    pub fn flush_range(
        &self,
        cpus: Cpus<'_>,
        asid: Option<Asid>,
        start: usize,
        size: usize,
        stride: usize,
    ) {
        let request = FlushRequest::new(start, size, stride, asid);

        let mask = match cpus {
            Cpus::Online => {
                self.broadcast(cpus, &request);
                return;
            }
            Cpus::Mask(mask) => mask,
        };

        if mask.is_empty() {
            return;
        }

        let pin = CpuPin::new(&self.cpus);
        if mask.any_but(pin.cpu()).is_some() {
            self.broadcast(cpus, &request);
        } else {
            log::trace!(
                "TLB: local flush {:#x}+{:#x} stride {:#x} asid {:?} on CPU {}",
                start,
                size,
                stride,
                asid,
                pin.cpu()
            );
            local_flush_range(&self.local, &request);
        }
    }

    fn broadcast(&self, cpus: Cpus<'_>, request: &FlushRequest) {
        log::trace!(
            "TLB: broadcast {:#x}+{:#x} stride {:#x} asid {:?} to {:?}",
            request.start,
            request.size,
            request.stride,
            request.asid,
            cpus
        );
        if let Err(err) = self.remote.sfence_vma(cpus, request) {
            error::fence_failed(err, request);
        }
    }

    fn flush_mm_range(&self, mm: &dyn AddressSpace, start: usize, end: usize, stride: usize) {
        let size = range_size(start, end);
        let cpus = mm.cpumask();
        self.flush_range(Cpus::Mask(&cpus), self.asid_of(mm), start, size, stride);
    }
}

/// Size of `start..end`; a reversed range flushes everything
#[inline]
fn range_size(start: usize, end: usize) -> usize {
    debug_assert!(end >= start, "TLB flush range {:#x}..{:#x} is reversed", start, end);
    plan::range_size(start, end)
}

impl<P: Processors, L: LocalTlb, R: RemoteFence> TlbShootdown for Shootdown<P, L, R> {
    fn flush_tlb_all(&self) {
        self.broadcast(Cpus::Online, &FlushRequest::all(None));
    }

    fn flush_tlb_mm(&self, mm: &dyn AddressSpace) {
        let cpus = mm.cpumask();
        self.flush_range(
            Cpus::Mask(&cpus),
            self.asid_of(mm),
            0,
            FLUSH_TLB_MAX_SIZE,
            PAGE_SIZE,
        );
    }

    fn flush_tlb_mm_range(&self, mm: &dyn AddressSpace, start: usize, end: usize, page_size: usize) {
        self.flush_mm_range(mm, start, end, page_size);
    }

    fn flush_tlb_page(&self, mm: &dyn AddressSpace, addr: usize) {
        let cpus = mm.cpumask();
        self.flush_range(Cpus::Mask(&cpus), self.asid_of(mm), addr, PAGE_SIZE, PAGE_SIZE);
    }

    fn flush_tlb_range(&self, mm: &dyn AddressSpace, start: usize, end: usize, mapping: Mapping) {
        self.flush_mm_range(mm, start, end, self.stride_for(mapping));
    }

    fn flush_pmd_tlb_range(&self, mm: &dyn AddressSpace, start: usize, end: usize) {
        self.flush_mm_range(mm, start, end, PMD_SIZE);
    }

    fn flush_tlb_kernel_range(&self, start: usize, end: usize) {
        self.flush_range(Cpus::Online, None, start, range_size(start, end), PAGE_SIZE);
    }

    fn local_flush_tlb_kernel_range(&self, start: usize, end: usize) {
        let request = FlushRequest::new(start, range_size(start, end), PAGE_SIZE, None);
        local_flush_range(&self.local, &request);
    }

    fn flush_batched_pending(&self, mm: &dyn AddressSpace) {
        self.flush_tlb_mm(mm);
    }

    fn flush_batch(&self, batch: &mut UnmapBatch) {
        // Several address spaces may be pending, so no ASID
        self.flush_range(
            Cpus::Mask(batch.cpus()),
            None,
            0,
            FLUSH_TLB_MAX_SIZE,
            PAGE_SIZE,
        );
        batch.clear();
    }
}

// ============================================================================
// Kernel-wide Dispatcher
// ============================================================================

static SHOOTDOWN: Once<&'static dyn TlbShootdown> = Once::new();

/// Install the kernel's dispatcher
///
/// Only the first call has an effect.
pub fn install(shootdown: &'static dyn TlbShootdown) {
    if SHOOTDOWN.is_completed() {
        log::warn!("TLB: shootdown dispatcher already installed");
        return;
    }
    SHOOTDOWN.call_once(|| shootdown);
}

/// The installed dispatcher
///
/// # Panics
///
/// Panics if [`install`] has not run yet.
pub fn get() -> &'static dyn TlbShootdown {
    match SHOOTDOWN.get() {
        Some(shootdown) => *shootdown,
        None => {
            log::error!("TLB: shootdown requested before a dispatcher was installed");
            panic!("TLB shootdown dispatcher not installed");
        }
    }
}

/// See [`TlbShootdown::flush_tlb_all`]
pub fn flush_tlb_all() {
    get().flush_tlb_all();
}

/// See [`TlbShootdown::flush_tlb_mm`]
pub fn flush_tlb_mm(mm: &dyn AddressSpace) {
    get().flush_tlb_mm(mm);
}

/// See [`TlbShootdown::flush_tlb_mm_range`]
pub fn flush_tlb_mm_range(mm: &dyn AddressSpace, start: usize, end: usize, page_size: usize) {
    get().flush_tlb_mm_range(mm, start, end, page_size);
}

/// See [`TlbShootdown::flush_tlb_page`]
pub fn flush_tlb_page(mm: &dyn AddressSpace, addr: usize) {
    get().flush_tlb_page(mm, addr);
}

/// See [`TlbShootdown::flush_tlb_range`]
pub fn flush_tlb_range(mm: &dyn AddressSpace, start: usize, end: usize, mapping: Mapping) {
    get().flush_tlb_range(mm, start, end, mapping);
}

/// See [`TlbShootdown::flush_pmd_tlb_range`]
pub fn flush_pmd_tlb_range(mm: &dyn AddressSpace, start: usize, end: usize) {
    get().flush_pmd_tlb_range(mm, start, end);
}

/// See [`TlbShootdown::flush_tlb_kernel_range`]
pub fn flush_tlb_kernel_range(start: usize, end: usize) {
    get().flush_tlb_kernel_range(start, end);
}

/// See [`TlbShootdown::local_flush_tlb_kernel_range`]
pub fn local_flush_tlb_kernel_range(start: usize, end: usize) {
    get().local_flush_tlb_kernel_range(start, end);
}

/// See [`TlbShootdown::flush_batched_pending`]
pub fn flush_batched_pending(mm: &dyn AddressSpace) {
    get().flush_batched_pending(mm);
}

/// See [`TlbShootdown::flush_batch`]
pub fn flush_batch(batch: &mut UnmapBatch) {
    get().flush_batch(batch);
}
