//! # TLB Configuration
//!
//! Boot-time settings for the shootdown layer and the one runtime tunable,
//! the flush-all threshold.

use core::sync::atomic::{AtomicUsize, Ordering};

use static_assertions::const_assert;

use crate::asid::MAX_ASID_BITS;
use crate::mm::PagingMode;

// ============================================================================
// Flush-All Threshold
// ============================================================================

/// Default number of single-page flushes issued before flushing everything
pub const DEFAULT_FLUSH_ALL_THRESHOLD: usize = 64;

const_assert!(DEFAULT_FLUSH_ALL_THRESHOLD > 0);

/// Flush entire TLB if number of entries to be flushed is greater than this
///
/// Read on every range flush without synchronization. A stale value only
/// changes which correct plan is chosen.
static TLB_FLUSH_ALL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_FLUSH_ALL_THRESHOLD);

/// Current flush-all threshold (in flushes)
#[inline]
pub fn flush_all_threshold() -> usize {
    TLB_FLUSH_ALL_THRESHOLD.load(Ordering::Relaxed)
}

/// Change the flush-all threshold
///
/// Safe at any time, from any CPU.
pub fn set_flush_all_threshold(flushes: usize) {
    let old = TLB_FLUSH_ALL_THRESHOLD.swap(flushes, Ordering::Relaxed);
    if old != flushes {
        log::debug!("TLB: flush-all threshold {} -> {}", old, flushes);
    }
}

// ============================================================================
// Boot Configuration
// ============================================================================

/// How remote harts are reached for a shootdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastPreference {
    /// SBI RFENCE calls (default; falls back to IPIs if the extension is missing)
    Firmware,
    /// Direct IPIs running the local flush on each target
    Ipi,
}

/// TLB shootdown configuration
#[derive(Debug, Clone, Copy)]
pub struct TlbConfig {
    /// Single-page flushes allowed before a full flush is used instead
    pub flush_all_threshold: usize,
    /// Tag flushes with ASIDs
    pub use_asid: bool,
    /// Implemented ASID bits (as detected through `satp`)
    pub asid_bits: u32,
    /// Broadcast mechanism
    pub broadcast: BroadcastPreference,
    /// Svnapot extension present
    pub has_svnapot: bool,
    /// Translation mode in `satp`
    pub paging_mode: PagingMode,
}

impl TlbConfig {
    /// Default configuration
    pub const fn default() -> Self {
        Self {
            flush_all_threshold: DEFAULT_FLUSH_ALL_THRESHOLD,
            use_asid: false,
            asid_bits: MAX_ASID_BITS,
            broadcast: BroadcastPreference::Firmware,
            has_svnapot: false,
            paging_mode: PagingMode::Sv39,
        }
    }
}

/// Apply the process-wide parts of `config`
///
/// `Shootdown::new` calls this, so building the dispatcher on the boot hart
/// before secondary harts start is enough.
pub fn init(config: &TlbConfig) {
    set_flush_all_threshold(config.flush_all_threshold);
    log::info!(
        "TLB: threshold {}, ASIDs {}, broadcast {:?}, {:?}{}",
        config.flush_all_threshold,
        if config.use_asid { "on" } else { "off" },
        config.broadcast,
        config.paging_mode,
        if config.has_svnapot { " + Svnapot" } else { "" },
    );
}
