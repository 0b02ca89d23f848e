//! Instrumented critical section
//!
//! A named `tokio::sync::Mutex` around one owned region of shared state.
//! Every acquisition is counted, and the number of simultaneous holders is
//! tracked so tests can check it never exceeds one.
//!
//! Waiters are woken in FIFO order, so no TA waits forever while others keep
//! re-acquiring. Acquiring the same section twice from one task deadlocks;
//! callers must drop the guard first.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Point-in-time counters for one critical section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub name: String,
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Acquisitions that had to wait for another holder
    pub contended: u64,
    /// Highest number of holders ever seen at once
    pub max_concurrent_holders: usize,
}

/// Mutual exclusion over a single value of type `T`
pub struct CriticalSection<T> {
    name: &'static str,
    inner: Mutex<T>,
    holders: AtomicUsize,
    max_holders: AtomicUsize,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

impl<T> CriticalSection<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
            holders: AtomicUsize::new(0),
            max_holders: AtomicUsize::new(0),
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait until this task owns the section.
    ///
    /// Dropping the returned guard releases it.
    pub async fn acquire(&self) -> SectionGuard<'_, T> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                trace!(section = self.name, "waiting for critical section");
                self.inner.lock().await
            }
        };
        self.enter(guard)
    }

    /// Take the section only if nobody holds it
    pub fn try_acquire(&self) -> Option<SectionGuard<'_, T>> {
        self.inner.try_lock().ok().map(|guard| self.enter(guard))
    }

    fn enter<'a>(&'a self, guard: MutexGuard<'a, T>) -> SectionGuard<'a, T> {
        let now = self.holders.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_holders.fetch_max(now, Ordering::AcqRel);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        SectionGuard {
            guard,
            holders: &self.holders,
        }
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            name: self.name.to_string(),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            max_concurrent_holders: self.max_holders.load(Ordering::Acquire),
        }
    }

    /// Consume the section and return the protected value
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> std::fmt::Debug for CriticalSection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticalSection")
            .field("name", &self.name)
            .field("holders", &self.holders.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the value inside a [`CriticalSection`]
pub struct SectionGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    holders: &'a AtomicUsize,
}

impl<T> Deref for SectionGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SectionGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SectionGuard<'_, T> {
    fn drop(&mut self) {
        // Runs before the inner MutexGuard field is dropped.
        self.holders.fetch_sub(1, Ordering::AcqRel);
    }
}
