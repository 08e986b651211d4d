//! # SBI Interface
//!
//! The part of the Supervisor Binary Interface the firmware broadcast
//! strategy uses: the base extension for probing and the RFENCE extension
//! for remote SFENCE.VMA.
//!
//! ## Calling Convention
//!
//! ```text
//! a7 = extension ID, a6 = function ID, a0..a5 = arguments
//! ecall
//! a0 = error code, a1 = value
//! ```

use core::fmt;

// ============================================================================
// Extension and Function IDs
// ============================================================================

/// Extension IDs
pub mod eid {
    /// Base extension
    pub const BASE: usize = 0x10;
    /// Remote fence extension ("RFNC")
    pub const RFENCE: usize = 0x5246_4E43;
}

/// Base extension function IDs
pub mod base_fid {
    /// Probe an extension
    pub const PROBE_EXTENSION: usize = 3;
}

/// RFENCE extension function IDs
pub mod rfence_fid {
    /// Remote SFENCE.VMA
    pub const REMOTE_SFENCE_VMA: usize = 1;
    /// Remote SFENCE.VMA with ASID
    pub const REMOTE_SFENCE_VMA_ASID: usize = 2;
}

/// `hart_mask_base` value selecting every hart
pub const HART_MASK_BASE_ALL: usize = usize::MAX;

// ============================================================================
// SBI Return Type
// ============================================================================

/// SBI call return value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbiRet {
    /// Error code (0 = success)
    pub error: i64,
    /// Return value
    pub value: i64,
}

impl SbiRet {
    /// Successful return carrying `value`
    pub const fn success(value: i64) -> Self {
        Self { error: 0, value }
    }

    /// Check if the call succeeded
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error == 0
    }

    /// Get result as Result
    #[inline]
    pub fn into_result(self) -> Result<i64, SbiError> {
        if self.is_success() {
            Ok(self.value)
        } else {
            Err(SbiError::from_raw(self.error))
        }
    }
}

// ============================================================================
// SBI Errors
// ============================================================================

/// Standard SBI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbiError {
    /// SBI_ERR_FAILED
    Failed,
    /// SBI_ERR_NOT_SUPPORTED
    NotSupported,
    /// SBI_ERR_INVALID_PARAM
    InvalidParam,
    /// SBI_ERR_DENIED
    Denied,
    /// SBI_ERR_INVALID_ADDRESS
    InvalidAddress,
    /// SBI_ERR_ALREADY_AVAILABLE
    AlreadyAvailable,
    /// SBI_ERR_ALREADY_STARTED
    AlreadyStarted,
    /// SBI_ERR_ALREADY_STOPPED
    AlreadyStopped,
    /// SBI_ERR_NO_SHMEM
    NoShmem,
    /// Code outside the standard set
    Unknown(i64),
}

impl SbiError {
    /// Decode a raw error code
    pub const fn from_raw(code: i64) -> Self {
        match code {
            -1 => SbiError::Failed,
            -2 => SbiError::NotSupported,
            -3 => SbiError::InvalidParam,
            -4 => SbiError::Denied,
            -5 => SbiError::InvalidAddress,
            -6 => SbiError::AlreadyAvailable,
            -7 => SbiError::AlreadyStarted,
            -8 => SbiError::AlreadyStopped,
            -9 => SbiError::NoShmem,
            other => SbiError::Unknown(other),
        }
    }

    /// Raw error code
    pub const fn code(self) -> i64 {
        match self {
            SbiError::Failed => -1,
            SbiError::NotSupported => -2,
            SbiError::InvalidParam => -3,
            SbiError::Denied => -4,
            SbiError::InvalidAddress => -5,
            SbiError::AlreadyAvailable => -6,
            SbiError::AlreadyStarted => -7,
            SbiError::AlreadyStopped => -8,
            SbiError::NoShmem => -9,
            SbiError::Unknown(code) => code,
        }
    }
}

impl fmt::Display for SbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SbiError::Failed => "failed",
            SbiError::NotSupported => "not supported",
            SbiError::InvalidParam => "invalid parameter",
            SbiError::Denied => "denied",
            SbiError::InvalidAddress => "invalid address",
            SbiError::AlreadyAvailable => "already available",
            SbiError::AlreadyStarted => "already started",
            SbiError::AlreadyStopped => "already stopped",
            SbiError::NoShmem => "no shared memory",
            SbiError::Unknown(code) => return write!(f, "unknown error {}", code),
        };
        f.write_str(name)
    }
}

// ============================================================================
// SBI Transport
// ============================================================================

/// Raw SBI call
///
/// Calls are synchronous: when `ecall` returns, the firmware has finished
/// the requested operation on every addressed hart.
pub trait SbiEcall: Sync {
    /// Issue `ecall` with up to six arguments
    fn ecall(&self, eid: usize, fid: usize, args: [usize; 6]) -> SbiRet;
}

impl<T: SbiEcall + ?Sized> SbiEcall for &T {
    #[inline]
    fn ecall(&self, eid: usize, fid: usize, args: [usize; 6]) -> SbiRet {
        (**self).ecall(eid, fid, args)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        /// The real firmware, reached through `ecall`
        #[derive(Debug, Clone, Copy, Default)]
        pub struct Ecall;

        impl SbiEcall for Ecall {
            #[inline]
            fn ecall(&self, eid: usize, fid: usize, args: [usize; 6]) -> SbiRet {
                let error: i64;
                let value: i64;

                unsafe {
                    core::arch::asm!(
                        "ecall",
                        in("a7") eid,
                        in("a6") fid,
                        inlateout("a0") args[0] => error,
                        inlateout("a1") args[1] => value,
                        in("a2") args[2],
                        in("a3") args[3],
                        in("a4") args[4],
                        in("a5") args[5],
                        options(nostack)
                    );
                }

                SbiRet { error, value }
            }
        }
    }
}

/// Check if an extension is available
pub fn probe_extension<E: SbiEcall + ?Sized>(sbi: &E, extension: usize) -> bool {
    sbi.ecall(eid::BASE, base_fid::PROBE_EXTENSION, [extension, 0, 0, 0, 0, 0])
        .into_result()
        .map(|value| value != 0)
        .unwrap_or(false)
}
