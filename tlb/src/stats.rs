//! # TLB Flush Statistics
//!
//! Counters for performance monitoring. Without the `tlb_stats` feature
//! the recording functions compile to nothing and [`snapshot`] reads zero.

/// Flush counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlbStats {
    /// Single-address SFENCE.VMA executed locally
    pub page_flushes: u64,
    /// Full SFENCE.VMA executed locally
    pub full_flushes: u64,
    /// Broadcasts through SBI RFENCE
    pub firmware_broadcasts: u64,
    /// Broadcasts through IPIs
    pub ipi_broadcasts: u64,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "tlb_stats")] {
        use core::sync::atomic::{AtomicU64, Ordering};

        static PAGE_FLUSHES: AtomicU64 = AtomicU64::new(0);
        static FULL_FLUSHES: AtomicU64 = AtomicU64::new(0);
        static FIRMWARE_BROADCASTS: AtomicU64 = AtomicU64::new(0);
        static IPI_BROADCASTS: AtomicU64 = AtomicU64::new(0);

        #[inline]
        pub(crate) fn record_page_flushes(count: usize) {
            PAGE_FLUSHES.fetch_add(count as u64, Ordering::Relaxed);
        }

        #[inline]
        pub(crate) fn record_full_flush() {
            FULL_FLUSHES.fetch_add(1, Ordering::Relaxed);
        }

        #[inline]
        pub(crate) fn record_firmware_broadcast() {
            FIRMWARE_BROADCASTS.fetch_add(1, Ordering::Relaxed);
        }

        #[inline]
        pub(crate) fn record_ipi_broadcast() {
            IPI_BROADCASTS.fetch_add(1, Ordering::Relaxed);
        }

        /// Read all counters
        pub fn snapshot() -> TlbStats {
            TlbStats {
                page_flushes: PAGE_FLUSHES.load(Ordering::Relaxed),
                full_flushes: FULL_FLUSHES.load(Ordering::Relaxed),
                firmware_broadcasts: FIRMWARE_BROADCASTS.load(Ordering::Relaxed),
                ipi_broadcasts: IPI_BROADCASTS.load(Ordering::Relaxed),
            }
        }

        /// Reset all counters
        pub fn reset() {
            PAGE_FLUSHES.store(0, Ordering::Relaxed);
            FULL_FLUSHES.store(0, Ordering::Relaxed);
            FIRMWARE_BROADCASTS.store(0, Ordering::Relaxed);
            IPI_BROADCASTS.store(0, Ordering::Relaxed);
        }
    } else {
        #[inline(always)]
        pub(crate) fn record_page_flushes(_count: usize) {}

        #[inline(always)]
        pub(crate) fn record_full_flush() {}

        #[inline(always)]
        pub(crate) fn record_firmware_broadcast() {}

        #[inline(always)]
        pub(crate) fn record_ipi_broadcast() {}

        /// Read all counters
        pub fn snapshot() -> TlbStats {
            TlbStats::default()
        }

        /// Reset all counters
        pub fn reset() {}
    }
}
