use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::MemoryEstimator;

const RETIRING: u32 = 1 << 31;
const LEASE_MASK: u32 = RETIRING - 1;

/// Wakes retiring threads whenever a retiring value loses its last lease.
///
/// A single process-wide pair is enough: retirement is rare and waiters
/// re-check their own value's count after every wake-up.
static RETIRE_SIGNAL: Lazy<(Mutex<()>, Condvar)> = Lazy::new(|| (Mutex::new(()), Condvar::new()));

/// A cached payload with an atomic lease count.
///
/// Tables store values as `Arc<CachedValue<V>>`. Readers never touch the
/// payload without a lease, which they take through a [`Handle`](crate::Handle)
/// while the value is still reachable from a table. Once a value has been
/// unlinked, [`retire`] waits for the lease count to drop to zero before
/// releasing it.
///
/// # Examples
///
/// ```
/// use cachelease_core::CachedValue;
///
/// let value = CachedValue::new(String::from("payload"));
/// assert_eq!(value.ref_count(), 0);
///
/// value.lease();
/// assert_eq!(value.ref_count(), 1);
/// value.release();
/// assert_eq!(value.ref_count(), 0);
/// ```
pub struct CachedValue<V> {
    value: V,
    size: usize,
    ref_count: AtomicU32,
}

impl<V> CachedValue<V> {
    /// Wraps `value`, accounting it at its estimated memory footprint.
    pub fn new(value: V) -> Self
    where
        V: MemoryEstimator,
    {
        // The inline part of `value` is already counted in `size_of::<Self>()`
        let size = std::mem::size_of::<Self>()
            + value
                .estimate_memory()
                .saturating_sub(std::mem::size_of_val(&value));
        Self::with_size(value, size)
    }

    /// Wraps `value` with an explicit accounted size.
    pub fn with_size(value: V, size: usize) -> Self {
        Self {
            value,
            size,
            ref_count: AtomicU32::new(0),
        }
    }

    /// Takes one lease.
    #[inline]
    pub fn lease(&self) {
        let previous = self.ref_count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(
            previous & LEASE_MASK != LEASE_MASK,
            "lease count overflow"
        );
    }

    /// Gives back one lease.
    ///
    /// # Panics
    ///
    /// Panics when no lease is outstanding. A negative count means some
    /// holder released twice and the value may already be gone.
    #[inline]
    pub fn release(&self) {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(
            previous & LEASE_MASK != 0,
            "lease count underflow: value released more often than leased"
        );
        if previous == (RETIRING | 1) {
            let (lock, signal) = &*RETIRE_SIGNAL;
            let _guard = lock.lock();
            signal.notify_all();
        }
    }

    /// Number of outstanding leases.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire) & LEASE_MASK
    }

    /// Accounted size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    fn is_retiring(&self) -> bool {
        self.ref_count.load(Ordering::Acquire) & RETIRING != 0
    }
}

impl<V: fmt::Debug> fmt::Debug for CachedValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedValue")
            .field("value", &self.value)
            .field("size", &self.size)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Releases a value that has been unlinked from every table.
///
/// Blocks until every outstanding lease has been released, then drops the
/// caller's reference. Returns the accounted size so the caller can reclaim
/// it from the usage budget.
///
/// Must not be called by a thread that itself still holds a lease on
/// `value`: it would wait for itself forever.
pub fn retire<V>(value: Arc<CachedValue<V>>) -> usize {
    debug_assert!(!value.is_retiring(), "value retired twice");
    value.ref_count.fetch_or(RETIRING, Ordering::AcqRel);

    if value.ref_count() > 0 {
        let (lock, signal) = &*RETIRE_SIGNAL;
        let mut guard = lock.lock();
        while value.ref_count() > 0 {
            signal.wait(&mut guard);
        }
    }

    let size = value.size();
    drop(value);
    size
}

/// Releases a value that has been unlinked from every table without waiting
/// for its leases.
///
/// The caller's reference is dropped at once. A value still leased is freed
/// by whichever [`Handle`](crate::Handle) lets go of it last. Returns the
/// accounted size.
pub fn detach<V>(value: Arc<CachedValue<V>>) -> usize {
    debug_assert!(!value.is_retiring(), "value retired twice");
    value.ref_count.fetch_or(RETIRING, Ordering::AcqRel);
    value.size()
}
