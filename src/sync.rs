// SPDX-License-Identifier: GPL-2.0

//! Locks serializing accesses to a falcon memory.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

/// Mutual exclusion for one falcon memory region.
///
/// Memory ports are programmed with a control write followed by a stream of data accesses, so two
/// users interleaving on the same region would corrupt each other's transfer.
pub(crate) struct MemLock {
    lock: Mutex<()>,
    acquisitions: AtomicU64,
}

impl MemLock {
    pub(crate) const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Acquires the lock, released when the returned guard is dropped.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        let guard = self.lock.lock();
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        guard
    }

    /// Number of times the lock has been acquired since creation.
    pub(crate) fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}
