//! # Address Spaces
//!
//! What the shootdown layer needs to know about an address space: the CPUs
//! that may cache its translations and the context id carrying its ASID.
//! Both are owned and updated elsewhere (scheduler, ASID allocator).

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::cpumask::{AtomicCpuMask, CpuMask};
use crate::{P4D_SIZE, PAGE_SIZE, PMD_SIZE, PUD_SIZE, SV57_PGDIR_SIZE};

/// Address space as seen by TLB shootdown
pub trait AddressSpace {
    /// CPUs that have run this address space since its TLB state was last reset
    fn cpumask(&self) -> CpuMask;

    /// Raw context id; its low bits are the ASID
    fn context_id(&self) -> usize;
}

// ============================================================================
// MmContext
// ============================================================================

/// Per-address-space MMU context
#[derive(Debug, Default)]
pub struct MmContext {
    id: AtomicUsize,
    cpus: AtomicCpuMask,
}

impl MmContext {
    /// Context with id 0 that has not run anywhere yet
    pub const fn new() -> Self {
        Self {
            id: AtomicUsize::new(0),
            cpus: AtomicCpuMask::new(),
        }
    }

    /// Context with a given id
    pub const fn with_id(id: usize) -> Self {
        Self {
            id: AtomicUsize::new(id),
            cpus: AtomicCpuMask::new(),
        }
    }

    /// Store a new context id (ASID allocator)
    #[inline]
    pub fn set_context_id(&self, id: usize) {
        self.id.store(id, Ordering::Release);
    }

    /// Record that `cpu` is about to run this address space (scheduler)
    #[inline]
    pub fn mark_cpu(&self, cpu: usize) {
        self.cpus.set(cpu);
    }

    /// Forget `cpu` after its TLB was flushed for this address space
    #[inline]
    pub fn clear_cpu(&self, cpu: usize) {
        self.cpus.clear(cpu);
    }

    /// The live CPU set
    #[inline]
    pub fn cpus(&self) -> &AtomicCpuMask {
        &self.cpus
    }
}

impl AddressSpace for MmContext {
    #[inline]
    fn cpumask(&self) -> CpuMask {
        self.cpus.load()
    }

    #[inline]
    fn context_id(&self) -> usize {
        self.id.load(Ordering::Acquire)
    }
}

// ============================================================================
// Huge Page Strides
// ============================================================================

/// Sv39/Sv48/Sv57 translation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// 3 levels, 39-bit VA
    Sv39,
    /// 4 levels, 48-bit VA
    Sv48,
    /// 5 levels, 57-bit VA
    Sv57,
}

impl PagingMode {
    /// Leaf sizes above the base page, largest first
    pub const fn huge_leaf_sizes(self) -> &'static [usize] {
        match self {
            PagingMode::Sv39 => &[PUD_SIZE, PMD_SIZE],
            PagingMode::Sv48 => &[P4D_SIZE, PUD_SIZE, PMD_SIZE],
            PagingMode::Sv57 => &[SV57_PGDIR_SIZE, P4D_SIZE, PUD_SIZE, PMD_SIZE],
        }
    }
}

/// Kind of mapping a range flush covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// Base pages
    Base,
    /// Huge pages of the given size (hugetlb)
    Huge(usize),
}

/// Stride for flushing huge mappings of `page_size` when Svnapot is present
///
/// Every PTE of a NAPOT region must be invalidated, and a NAPOT huge page is
/// built from leaves of the next smaller level. The stride is therefore the
/// largest real leaf size not above `page_size`, down to the base page.
pub fn hugetlb_stride(page_size: usize, mode: PagingMode) -> usize {
    mode.huge_leaf_sizes()
        .iter()
        .copied()
        .find(|&leaf| page_size >= leaf)
        .unwrap_or(PAGE_SIZE)
}
