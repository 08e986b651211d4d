//! # Shootdown Errors
//!
//! A shootdown that cannot be confirmed on every target leaves stale
//! translations behind, so none of these errors is returned to page-table
//! code: they end in [`fence_failed`].

use core::fmt;

use crate::plan::FlushRequest;
use crate::sbi::SbiError;

/// Broadcast transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceError {
    /// The SBI RFENCE call returned an error
    Sbi(SbiError),
    /// A cross-call did not complete on a CPU
    CrossCall {
        /// CPU that did not acknowledge
        cpu: usize,
    },
}

impl fmt::Display for FenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceError::Sbi(err) => write!(f, "SBI remote fence failed: {}", err),
            FenceError::CrossCall { cpu } => write!(f, "cross-call to CPU {} did not complete", cpu),
        }
    }
}

impl From<SbiError> for FenceError {
    fn from(err: SbiError) -> Self {
        FenceError::Sbi(err)
    }
}

/// Abort after a failed shootdown
#[cold]
#[track_caller]
pub fn fence_failed(err: FenceError, request: &FlushRequest) -> ! {
    log::error!(
        "TLB: shootdown failed: {} (start {:#x}, size {:#x}, stride {:#x}, asid {:?})",
        err,
        request.start,
        request.size,
        request.stride,
        request.asid,
    );
    panic!("TLB shootdown did not complete: {}", err);
}
