//! # CPU Masks
//!
//! Fixed-capacity CPU sets. Bit `n` of word `n / 64` stands for hart `n`,
//! which is also the layout SBI expects for `hart_mask` windows.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use static_assertions::const_assert_eq;

use crate::MAX_CPUS;

/// Number of 64-bit words in a mask
pub const MASK_WORDS: usize = MAX_CPUS / 64;

const_assert_eq!(MAX_CPUS % 64, 0);

// ============================================================================
// CpuMask
// ============================================================================

/// Set of CPUs
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuMask {
    bits: [u64; MASK_WORDS],
}

impl CpuMask {
    /// Empty mask (no CPUs)
    pub const fn new() -> Self {
        Self {
            bits: [0; MASK_WORDS],
        }
    }

    /// Mask holding a single CPU
    pub fn single(cpu: usize) -> Self {
        let mut mask = Self::new();
        mask.set(cpu);
        mask
    }

    /// Add a CPU to the mask
    ///
    /// Ids at or above [`MAX_CPUS`] are ignored.
    #[inline]
    pub fn set(&mut self, cpu: usize) {
        if cpu < MAX_CPUS {
            self.bits[cpu / 64] |= 1 << (cpu % 64);
        }
    }

    /// Remove a CPU from the mask
    #[inline]
    pub fn clear(&mut self, cpu: usize) {
        if cpu < MAX_CPUS {
            self.bits[cpu / 64] &= !(1 << (cpu % 64));
        }
    }

    /// Check if a CPU is in the mask
    #[inline]
    pub fn contains(&self, cpu: usize) -> bool {
        cpu < MAX_CPUS && (self.bits[cpu / 64] >> (cpu % 64)) & 1 != 0
    }

    /// Check if mask is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }

    /// Count set bits
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|word| word.count_ones()).sum()
    }

    /// Remove every CPU
    #[inline]
    pub fn clear_all(&mut self) {
        self.bits = [0; MASK_WORDS];
    }

    /// Add every CPU of `other`
    #[inline]
    pub fn union_with(&mut self, other: &CpuMask) {
        for (word, theirs) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word |= *theirs;
        }
    }

    /// Any CPU in the mask other than `cpu`
    pub fn any_but(&self, cpu: usize) -> Option<usize> {
        self.iter().find(|&other| other != cpu)
    }

    /// Raw 64-CPU windows, lowest CPUs first
    #[inline]
    pub fn words(&self) -> &[u64; MASK_WORDS] {
        &self.bits
    }

    /// Iterate over the CPUs in the mask in ascending order
    pub fn iter(&self) -> Iter<'_> {
        Iter { mask: self, next: 0 }
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for CpuMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::new();
        for cpu in iter {
            mask.set(cpu);
        }
        mask
    }
}

impl<'a> IntoIterator for &'a CpuMask {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the CPUs of a [`CpuMask`]
#[derive(Debug)]
pub struct Iter<'a> {
    mask: &'a CpuMask,
    next: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < MAX_CPUS {
            let word = self.mask.bits[self.next / 64] >> (self.next % 64);
            if word == 0 {
                // Rest of this word is empty
                self.next = (self.next / 64 + 1) * 64;
                continue;
            }
            let cpu = self.next + word.trailing_zeros() as usize;
            self.next = cpu + 1;
            return Some(cpu);
        }
        None
    }
}

// ============================================================================
// AtomicCpuMask
// ============================================================================

/// CPU set updated concurrently by scheduling code
///
/// Updates and snapshots are `SeqCst`: a hart that marks itself before
/// walking the page table and a flusher that snapshots the mask after
/// writing the table cannot both miss each other.
pub struct AtomicCpuMask {
    bits: [AtomicU64; MASK_WORDS],
}

impl AtomicCpuMask {
    /// Empty mask
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            bits: [ZERO; MASK_WORDS],
        }
    }

    /// Add a CPU
    #[inline]
    pub fn set(&self, cpu: usize) {
        if cpu < MAX_CPUS {
            self.bits[cpu / 64].fetch_or(1 << (cpu % 64), Ordering::SeqCst);
        }
    }

    /// Remove a CPU
    #[inline]
    pub fn clear(&self, cpu: usize) {
        if cpu < MAX_CPUS {
            self.bits[cpu / 64].fetch_and(!(1 << (cpu % 64)), Ordering::SeqCst);
        }
    }

    /// Check if a CPU is set
    #[inline]
    pub fn contains(&self, cpu: usize) -> bool {
        cpu < MAX_CPUS && (self.bits[cpu / 64].load(Ordering::SeqCst) >> (cpu % 64)) & 1 != 0
    }

    /// Snapshot the mask
    pub fn load(&self) -> CpuMask {
        let mut mask = CpuMask::new();
        for (word, atomic) in mask.bits.iter_mut().zip(self.bits.iter()) {
            *word = atomic.load(Ordering::SeqCst);
        }
        mask
    }
}

impl Default for AtomicCpuMask {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicCpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

// ============================================================================
// Flush Targets
// ============================================================================

/// CPUs a flush is aimed at
#[derive(Debug, Clone, Copy)]
pub enum Cpus<'a> {
    /// Every online CPU (kernel mappings, global flushes)
    Online,
    /// An explicit set (an address space's CPUs, an unmap batch)
    Mask(&'a CpuMask),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_contains() {
        let mut mask = CpuMask::new();
        assert!(mask.is_empty());
        mask.set(3);
        mask.set(70);
        mask.set(MAX_CPUS);
        assert!(mask.contains(3));
        assert!(mask.contains(70));
        assert!(!mask.contains(MAX_CPUS));
        assert_eq!(mask.count(), 2);
        mask.clear(3);
        assert!(!mask.contains(3));
    }

    #[test]
    fn test_iter_crosses_words() {
        let mask: CpuMask = [0, 63, 64, 255].into_iter().collect();
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 63, 64, 255]);
    }

    #[test]
    fn test_any_but() {
        let mask = CpuMask::single(2);
        assert_eq!(mask.any_but(2), None);
        assert_eq!(mask.any_but(0), Some(2));

        let pair: CpuMask = [2, 5].into_iter().collect();
        assert_eq!(pair.any_but(2), Some(5));
    }

    #[test]
    fn test_union() {
        let mut a = CpuMask::single(1);
        a.union_with(&CpuMask::single(130));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 130]);
    }

    #[test]
    fn test_atomic_snapshot() {
        let mask = AtomicCpuMask::new();
        mask.set(4);
        mask.set(100);
        mask.clear(4);
        assert!(mask.contains(100));
        assert_eq!(mask.load(), CpuMask::single(100));
    }
}
