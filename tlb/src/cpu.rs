//! # Current CPU
//!
//! The dispatcher needs to know which CPU it runs on, and that answer must
//! stay true while it decides between a local flush and a broadcast. The
//! scheduler provides that through [`Processors`]; [`CpuPin`] holds
//! preemption off for the duration of the decision.

/// Scheduler and SMP services consumed by the shootdown layer
pub trait Processors: Sync {
    /// Id of the CPU executing the caller
    fn current_cpu(&self) -> usize;

    /// Disable preemption (nests)
    fn preempt_disable(&self);

    /// Re-enable preemption
    fn preempt_enable(&self);
}

impl<T: Processors + ?Sized> Processors for &T {
    #[inline]
    fn current_cpu(&self) -> usize {
        (**self).current_cpu()
    }

    #[inline]
    fn preempt_disable(&self) {
        (**self).preempt_disable();
    }

    #[inline]
    fn preempt_enable(&self) {
        (**self).preempt_enable();
    }
}

/// Keeps the caller on its current CPU until dropped
///
/// Preemption is re-enabled on every exit path, including early returns and
/// unwinding out of a failed broadcast.
#[derive(Debug)]
pub struct CpuPin<'a, P: Processors + ?Sized> {
    cpus: &'a P,
    cpu: usize,
}

impl<'a, P: Processors + ?Sized> CpuPin<'a, P> {
    /// Pin to the current CPU
    pub fn new(cpus: &'a P) -> Self {
        cpus.preempt_disable();
        let cpu = cpus.current_cpu();
        Self { cpus, cpu }
    }

    /// CPU the caller is pinned to
    #[inline]
    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

impl<P: Processors + ?Sized> Drop for CpuPin<'_, P> {
    fn drop(&mut self) {
        self.cpus.preempt_enable();
    }
}
