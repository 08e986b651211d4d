//! # Deferred Unmap Flushing
//!
//! Reclaim can unmap pages from many address spaces in a row. Instead of a
//! shootdown per page, each unmap adds the CPUs of its address space to an
//! [`UnmapBatch`], and one flush of the union follows at the end.
//!
//! The batch has no ASID, so the closing flush invalidates everything on
//! every CPU that was recorded.

use crate::cpumask::CpuMask;
use crate::mm::AddressSpace;

/// CPUs that still hold translations removed by a batched unmap
#[derive(Debug, Clone, Default)]
pub struct UnmapBatch {
    cpus: CpuMask,
}

impl UnmapBatch {
    /// Empty batch
    pub const fn new() -> Self {
        Self {
            cpus: CpuMask::new(),
        }
    }

    /// Record an unmap of `uaddr` in `mm`
    pub fn add_pending<A: AddressSpace + ?Sized>(&mut self, mm: &A, uaddr: usize) {
        let cpus = mm.cpumask();
        log::trace!("TLB: batching unmap at {:#x} for {:?}", uaddr, cpus);
        self.cpus.union_with(&cpus);
    }

    /// CPUs the closing flush must reach
    #[inline]
    pub fn cpus(&self) -> &CpuMask {
        &self.cpus
    }

    /// Check if nothing is pending
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.cpus.clear_all();
    }
}

/// Check if unmaps in `mm` may be batched
///
/// Always allowed: the batch flush is broad enough for any address space.
#[inline]
pub fn should_defer<A: AddressSpace + ?Sized>(_mm: &A) -> bool {
    true
}
