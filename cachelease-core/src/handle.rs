use std::fmt;
use std::sync::Arc;

use crate::CachedValue;

/// Result of a cache lookup: an optional, leased reference to a cached value.
///
/// A found handle owns exactly one lease on its value for as long as it lives:
///
/// - construction leases once,
/// - [`Clone`] leases again (two handles, two leases),
/// - a Rust move transfers the lease without touching the count,
/// - [`take`](Self::take) moves the lease out and leaves an empty handle,
/// - dropping releases once.
///
/// While any handle is alive the value cannot be freed, even if it has been
/// removed from the cache in the meantime.
///
/// # Examples
///
/// ```
/// use cachelease_core::{CachedValue, Handle};
/// use std::sync::Arc;
///
/// let value = Arc::new(CachedValue::new(7u32));
///
/// let handle = Handle::new(Some(Arc::clone(&value)));
/// assert!(handle.found());
/// assert_eq!(handle.get(), Some(&7));
/// assert_eq!(value.ref_count(), 1);
///
/// let copy = handle.clone();
/// assert_eq!(value.ref_count(), 2);
///
/// drop(handle);
/// drop(copy);
/// assert_eq!(value.ref_count(), 0);
///
/// let missing: Handle<u32> = Handle::empty();
/// assert!(!missing.found());
/// ```
pub struct Handle<V> {
    value: Option<Arc<CachedValue<V>>>,
}

impl<V> Handle<V> {
    /// Wraps `value`, taking one lease when it is `Some`.
    pub fn new(value: Option<Arc<CachedValue<V>>>) -> Self {
        if let Some(v) = &value {
            v.lease();
        }
        Self { value }
    }

    /// A handle that refers to nothing.
    #[inline]
    pub const fn empty() -> Self {
        Self { value: None }
    }

    /// Returns `true` if the handle refers to a value.
    #[inline]
    pub fn found(&self) -> bool {
        self.value.is_some()
    }

    /// The leased value wrapper, if any.
    #[inline]
    pub fn value(&self) -> Option<&CachedValue<V>> {
        self.value.as_deref()
    }

    /// The leased payload, if any.
    #[inline]
    pub fn get(&self) -> Option<&V> {
        self.value.as_deref().map(CachedValue::value)
    }

    /// Releases the current value (if any) and leases `value` instead.
    pub fn reset(&mut self, value: Option<Arc<CachedValue<V>>>) {
        if let Some(v) = &value {
            v.lease();
        }
        if let Some(previous) = std::mem::replace(&mut self.value, value) {
            previous.release();
        }
    }

    /// Moves the lease into a new handle, leaving this one empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            value: self.value.take(),
        }
    }

    /// Clones the payload out so it can outlive the lease.
    pub fn copy(&self) -> Option<V>
    where
        V: Clone,
    {
        self.get().cloned()
    }
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<V> Default for Handle<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V> Drop for Handle<V> {
    fn drop(&mut self) {
        if let Some(v) = self.value.take() {
            v.release();
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("value", &self.get()).finish()
    }
}
