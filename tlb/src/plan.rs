//! # Range Flush Planning
//!
//! Turns a `(start, size, stride, asid)` request into the local operation
//! that covers it most cheaply:
//!
//! - `size <= stride`: one single-address flush at `start`
//! - `size == FLUSH_TLB_MAX_SIZE`: one full flush
//! - more than `threshold` strides: one full flush
//! - otherwise one single-address flush per stride
//!
//! Every choice covers at least the requested range. Falling back to a full
//! flush only ever widens it.

use crate::asid::Asid;
use crate::local::LocalTlb;
use crate::{config, stats, FLUSH_TLB_MAX_SIZE, PAGE_SIZE};

// ============================================================================
// Flush Request
// ============================================================================

/// One invalidation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRequest {
    /// First virtual address
    pub start: usize,
    /// Bytes to invalidate, or [`FLUSH_TLB_MAX_SIZE`] for everything
    pub size: usize,
    /// Granularity of the mappings (page or widened huge-page size)
    pub stride: usize,
    /// Address space tag, `None` for all address spaces
    pub asid: Option<Asid>,
}

impl FlushRequest {
    /// Create a request
    #[inline]
    pub const fn new(start: usize, size: usize, stride: usize, asid: Option<Asid>) -> Self {
        Self {
            start,
            size,
            stride,
            asid,
        }
    }

    /// One base page at `addr`
    #[inline]
    pub const fn page(addr: usize, asid: Option<Asid>) -> Self {
        Self::new(addr, PAGE_SIZE, PAGE_SIZE, asid)
    }

    /// The whole address space (or every address space with `None`)
    #[inline]
    pub const fn all(asid: Option<Asid>) -> Self {
        Self::new(0, FLUSH_TLB_MAX_SIZE, PAGE_SIZE, asid)
    }

    /// Check if this request covers the whole address space
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.size == FLUSH_TLB_MAX_SIZE
    }

    /// Choose the local operation for this request
    ///
    /// `threshold` is the largest number of single-address flushes allowed
    /// before a full flush is used instead.
    pub fn plan(&self, threshold: usize) -> FlushPlan {
        debug_assert!(
            self.stride.is_power_of_two(),
            "TLB flush stride {:#x} is not a power of two",
            self.stride
        );

        let asid = self.asid;

        if self.size <= self.stride {
            return FlushPlan::Page {
                addr: self.start,
                asid,
            };
        }

        if self.is_full() {
            return FlushPlan::All { asid };
        }

        let count = self.size.div_ceil(self.stride);
        if count > threshold {
            FlushPlan::All { asid }
        } else {
            FlushPlan::Pages {
                start: self.start,
                count,
                stride: self.stride,
                asid,
            }
        }
    }
}

/// Bytes covered by `start..end`
///
/// A reversed range has no meaningful size, so it is widened to
/// [`FLUSH_TLB_MAX_SIZE`].
#[inline]
pub const fn range_size(start: usize, end: usize) -> usize {
    if end < start {
        FLUSH_TLB_MAX_SIZE
    } else {
        end - start
    }
}

/// Plan a request against the current process-wide threshold
#[inline]
pub fn plan(start: usize, size: usize, stride: usize, asid: Option<Asid>) -> FlushPlan {
    FlushRequest::new(start, size, stride, asid).plan(config::flush_all_threshold())
}

// ============================================================================
// Flush Plan
// ============================================================================

/// Local operation chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPlan {
    /// Single-address flush
    Page {
        /// Address to flush
        addr: usize,
        /// Address space tag
        asid: Option<Asid>,
    },
    /// `count` single-address flushes, `stride` apart
    Pages {
        /// First address
        start: usize,
        /// Number of flushes
        count: usize,
        /// Distance between flushed addresses
        stride: usize,
        /// Address space tag
        asid: Option<Asid>,
    },
    /// Full flush
    All {
        /// Address space tag
        asid: Option<Asid>,
    },
}

impl FlushPlan {
    /// Address space tag of the plan
    #[inline]
    pub const fn asid(&self) -> Option<Asid> {
        match *self {
            FlushPlan::Page { asid, .. }
            | FlushPlan::Pages { asid, .. }
            | FlushPlan::All { asid } => asid,
        }
    }

    /// Number of SFENCE.VMA instructions the plan issues
    #[inline]
    pub const fn fence_count(&self) -> usize {
        match *self {
            FlushPlan::Page { .. } | FlushPlan::All { .. } => 1,
            FlushPlan::Pages { count, .. } => count,
        }
    }

    /// Check if the plan invalidates the entry for `addr`
    ///
    /// `addr` is compared against the flushed addresses themselves, so it
    /// should be stride-aligned relative to the request start.
    pub fn covers(&self, addr: usize) -> bool {
        match *self {
            FlushPlan::All { .. } => true,
            FlushPlan::Page { addr: page, .. } => addr == page,
            FlushPlan::Pages {
                start,
                count,
                stride,
                ..
            } => {
                let offset = addr.wrapping_sub(start);
                addr >= start && offset % stride == 0 && offset / stride < count
            }
        }
    }

    /// Run the plan on the current hart
    pub fn execute<T: LocalTlb + ?Sized>(&self, tlb: &T) {
        match *self {
            FlushPlan::Page { addr, asid } => {
                stats::record_page_flushes(1);
                tlb.flush_page(addr, asid);
            }
            FlushPlan::Pages {
                start,
                count,
                stride,
                asid,
            } => {
                stats::record_page_flushes(count);
                let mut addr = start;
                for _ in 0..count {
                    tlb.flush_page(addr, asid);
                    addr = addr.wrapping_add(stride);
                }
            }
            FlushPlan::All { asid } => {
                stats::record_full_flush();
                tlb.flush_all(asid);
            }
        }
    }
}
