//! # Helix TLB Shootdown
//!
//! TLB invalidation coordination for RISC-V SMP kernels.
//!
//! After a page table changes, every hart that may still cache the old
//! translation must drop it before the change is relied upon. This crate
//! picks the cheapest correct way to do that:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  page-table code                                                     │
//! │      │  flush_tlb_mm / flush_tlb_range / flush_tlb_kernel_range ...  │
//! │      ▼                                                               │
//! │  ┌──────────────┐  ASID   ┌──────────────┐                           │
//! │  │  Shootdown   │◄────────│ AsidTagging  │                           │
//! │  │ (dispatcher) │         └──────────────┘                           │
//! │  └──────┬───────┘                                                    │
//! │   local │                 broadcast                                  │
//! │         ▼                     ▼                                      │
//! │  ┌──────────────┐      ┌──────────────┐                              │
//! │  │  FlushPlan   │      │    Rfence    │── SBI RFENCE (firmware)      │
//! │  │ + LocalTlb   │◄─────│              │── IPI cross-call             │
//! │  └──────────────┘      └──────────────┘                              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`asid`]: ASID newtype and address-space to ASID resolution
//! - [`local`]: `SFENCE.VMA` primitives on the calling hart
//! - [`plan`]: single page / page loop / full flush planning
//! - [`shootdown`]: broadcast decision and the public entry points
//! - [`rfence`]: firmware and IPI broadcast strategies
//! - [`batch`]: deferred flushes for unmap batches
//! - [`cpumask`], [`cpu`], [`mm`]: CPU sets, current-CPU pinning, address spaces
//! - [`sbi`]: SBI calls used by the firmware strategy
//! - [`config`], [`error`], [`stats`]: tunables, fatal errors, counters
//! - `xuantie` (feature `xuantie`): T-Head C9xx TLB reload

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod asid;
pub mod batch;
pub mod config;
pub mod cpu;
pub mod cpumask;
pub mod error;
pub mod local;
pub mod mm;
pub mod plan;
pub mod rfence;
pub mod sbi;
pub mod shootdown;
pub mod stats;

#[cfg(feature = "xuantie")]
pub mod xuantie;

#[cfg(test)]
mod testing;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum number of supported CPUs (harts)
pub const MAX_CPUS: usize = 256;

/// Page shift (log2 of page size)
pub const PAGE_SHIFT: usize = 12;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Mega page size (2MB, PMD level)
pub const PMD_SIZE: usize = 2 * 1024 * 1024;

/// Giga page size (1GB, PUD level)
pub const PUD_SIZE: usize = 1024 * 1024 * 1024;

/// Tera page size (512GB, P4D level on Sv48/Sv57)
pub const P4D_SIZE: usize = 512 * PUD_SIZE;

/// Peta page size (256TB, top level on Sv57)
pub const SV57_PGDIR_SIZE: usize = 512 * P4D_SIZE;

/// Size sentinel meaning "the whole address space"
///
/// SBI implementations treat this value as a request for a full flush too.
pub const FLUSH_TLB_MAX_SIZE: usize = usize::MAX;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use asid::{Asid, AsidTagging};
pub use batch::UnmapBatch;
pub use config::{flush_all_threshold, set_flush_all_threshold, BroadcastPreference, TlbConfig};
pub use cpu::{CpuPin, Processors};
pub use cpumask::{AtomicCpuMask, CpuMask, Cpus};
pub use error::FenceError;
pub use local::{local_flush_range, LocalTlb};
pub use mm::{AddressSpace, Mapping, MmContext, PagingMode};
pub use plan::{FlushPlan, FlushRequest};
pub use rfence::{CrossCall, IpiRfence, RemoteFence, Rfence, SbiRfence};
pub use shootdown::{Shootdown, TlbShootdown};
