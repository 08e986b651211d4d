//! Host-side fakes for the hardware and scheduler interfaces.
//!
//! Each test thread plays one CPU; [`set_current_cpu`] picks which.
//! [`ThreadCrossCall`] runs every target on its own scoped thread.

use std::cell::Cell;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use spin::{Mutex, MutexGuard};

use crate::asid::Asid;
use crate::cpu::Processors;
use crate::cpumask::Cpus;
use crate::error::FenceError;
use crate::local::LocalTlb;
use crate::sbi::{base_fid, eid, SbiEcall, SbiRet};

std::thread_local! {
    static CURRENT_CPU: Cell<usize> = const { Cell::new(0) };
}

/// Make the calling thread act as `cpu`
pub fn set_current_cpu(cpu: usize) {
    CURRENT_CPU.with(|current| current.set(cpu));
}

fn current_cpu() -> usize {
    CURRENT_CPU.with(Cell::get)
}

static THRESHOLD: Mutex<()> = Mutex::new(());

/// Serialize tests that write or depend on the process-wide threshold
///
/// `Shootdown::new` writes it too, so every test building a dispatcher
/// holds this.
pub fn threshold_lock() -> MutexGuard<'static, ()> {
    THRESHOLD.lock()
}

// ============================================================================
// Local TLB
// ============================================================================

/// A recorded SFENCE.VMA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    All(Option<Asid>),
    Page(usize, Option<Asid>),
}

impl Op {
    pub fn asid(&self) -> Option<Asid> {
        match *self {
            Op::All(asid) | Op::Page(_, asid) => asid,
        }
    }
}

/// Records every local flush with the CPU that issued it
#[derive(Debug, Default)]
pub struct RecordingTlb {
    ops: Mutex<Vec<(usize, Op)>>,
}

impl RecordingTlb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<(usize, Op)> {
        self.ops.lock().clone()
    }

    pub fn ops_on(&self, cpu: usize) -> Vec<Op> {
        self.ops
            .lock()
            .iter()
            .filter(|(on, _)| *on == cpu)
            .map(|(_, op)| *op)
            .collect()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}

impl LocalTlb for RecordingTlb {
    fn flush_all(&self, asid: Option<Asid>) {
        self.ops.lock().push((current_cpu(), Op::All(asid)));
    }

    fn flush_page(&self, addr: usize, asid: Option<Asid>) {
        self.ops.lock().push((current_cpu(), Op::Page(addr, asid)));
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Scheduler that counts preemption toggles
#[derive(Debug)]
pub struct FakeProcessors {
    online: usize,
    depth: AtomicIsize,
    pins: AtomicUsize,
}

impl FakeProcessors {
    pub fn new(online: usize) -> Self {
        Self {
            online,
            depth: AtomicIsize::new(0),
            pins: AtomicUsize::new(0),
        }
    }

    /// Outstanding `preempt_disable` calls
    pub fn preempt_depth(&self) -> isize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Total `preempt_disable` calls
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }
}

impl Processors for FakeProcessors {
    fn current_cpu(&self) -> usize {
        let cpu = current_cpu();
        assert!(cpu < self.online, "CPU {} is not online", cpu);
        cpu
    }

    fn preempt_disable(&self) {
        self.pins.fetch_add(1, Ordering::SeqCst);
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    fn preempt_enable(&self) {
        let previous = self.depth.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "preempt_enable without preempt_disable");
    }
}

// ============================================================================
// Cross-calls
// ============================================================================

/// Cross-call that runs each target on a scoped thread and joins them all
#[derive(Debug)]
pub struct ThreadCrossCall {
    online: usize,
    completed: Mutex<Vec<usize>>,
}

impl ThreadCrossCall {
    pub fn new(online: usize) -> Self {
        Self {
            online,
            completed: Mutex::new(Vec::new()),
        }
    }

    /// CPUs that finished a call, sorted
    pub fn completed(&self) -> Vec<usize> {
        let mut completed = self.completed.lock().clone();
        completed.sort_unstable();
        completed
    }
}

impl crate::rfence::CrossCall for ThreadCrossCall {
    fn on_each_cpu_mask(&self, cpus: Cpus<'_>, func: &(dyn Fn() + Sync)) -> Result<(), FenceError> {
        let targets: Vec<usize> = match cpus {
            Cpus::Online => (0..self.online).collect(),
            Cpus::Mask(mask) => mask.iter().collect(),
        };

        std::thread::scope(|scope| {
            for cpu in targets {
                scope.spawn(move || {
                    set_current_cpu(cpu);
                    func();
                    self.completed.lock().push(cpu);
                });
            }
        });
        Ok(())
    }
}

/// Cross-call whose targets never acknowledge
#[derive(Debug, Clone, Copy)]
pub struct FailingCrossCall;

impl crate::rfence::CrossCall for FailingCrossCall {
    fn on_each_cpu_mask(&self, cpus: Cpus<'_>, _func: &(dyn Fn() + Sync)) -> Result<(), FenceError> {
        let cpu = match cpus {
            Cpus::Online => 0,
            Cpus::Mask(mask) => mask.iter().next().unwrap_or(0),
        };
        Err(FenceError::CrossCall { cpu })
    }
}

// ============================================================================
// Firmware
// ============================================================================

/// A recorded RFENCE call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbiCall {
    pub eid: usize,
    pub fid: usize,
    pub args: [usize; 6],
}

/// Firmware that records RFENCE calls
#[derive(Debug)]
pub struct RecordingSbi {
    rfence_present: bool,
    error: i64,
    calls: Mutex<Vec<SbiCall>>,
}

impl RecordingSbi {
    pub fn new(rfence_present: bool) -> Self {
        Self {
            rfence_present,
            error: 0,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// RFENCE present, but every call fails with `error`
    pub fn failing(error: i64) -> Self {
        Self {
            error,
            ..Self::new(true)
        }
    }

    pub fn rfence_calls(&self) -> Vec<SbiCall> {
        self.calls.lock().clone()
    }
}

impl SbiEcall for RecordingSbi {
    fn ecall(&self, eid: usize, fid: usize, args: [usize; 6]) -> SbiRet {
        match (eid, fid) {
            (eid::BASE, base_fid::PROBE_EXTENSION) => {
                let present = args[0] == eid::RFENCE && self.rfence_present;
                SbiRet::success(present as i64)
            }
            (eid::RFENCE, _) => {
                self.calls.lock().push(SbiCall { eid, fid, args });
                SbiRet {
                    error: self.error,
                    value: 0,
                }
            }
            _ => SbiRet {
                error: -2,
                value: 0,
            },
        }
    }
}
