use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

const LOCK_BIT: u32 = 0x01;
const SPINS_BEFORE_YIELD: u32 = 64;

/// Lifecycle flags packed next to the lock bit of a [`GuardedFlags`].
///
/// The same flag set is reused by the coordinator-owned
/// [`Metadata`](crate::Metadata) record, where only `Resizing` and
/// `Migrating` are meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flag {
    Shutdown,
    ShuttingDown,
    Migrating,
    Resizing,
}

impl Flag {
    #[inline]
    pub(crate) const fn bit(self) -> u32 {
        match self {
            Flag::Shutdown => 0x02,
            Flag::ShuttingDown => 0x04,
            Flag::Migrating => 0x08,
            Flag::Resizing => 0x10,
        }
    }
}

/// A spin lock and a flag bitset sharing one atomic word.
///
/// The lock protects both the flags and an optional payload `T`. Flags and
/// payload are only reachable through a [`FlagsGuard`], so they can never be
/// observed without the lock held.
///
/// # Lock attempts
///
/// [`lock_with_tries`](Self::lock_with_tries) follows the classic
/// `lock(maxTries)` contract:
///
/// * `max_tries < 0` - spin until acquired
/// * `max_tries == 0` - exactly one attempt
/// * `max_tries > 0` - up to `max_tries` attempts
///
/// A failed acquisition returns `None` and leaves no trace.
///
/// # Examples
///
/// ```
/// use cachelease_core::{Flag, GuardedFlags};
///
/// let state = GuardedFlags::new(0u32);
/// {
///     let mut guard = state.lock();
///     guard.toggle_flag(Flag::ShuttingDown);
///     *guard += 1;
///     assert!(guard.is_set(Flag::ShuttingDown));
/// }
///
/// let guard = state.lock_with_tries(0).unwrap();
/// assert_eq!(*guard, 1);
/// assert!(state.lock_with_tries(10).is_none());
/// ```
pub struct GuardedFlags<T = ()> {
    word: AtomicU32,
    data: UnsafeCell<T>,
}

// The payload is only handed out through a guard holding the lock bit.
unsafe impl<T: Send> Send for GuardedFlags<T> {}
unsafe impl<T: Send> Sync for GuardedFlags<T> {}

impl<T> GuardedFlags<T> {
    /// Creates an unlocked instance with every flag cleared.
    pub const fn new(data: T) -> Self {
        Self {
            word: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Spins until the lock is acquired.
    pub fn lock(&self) -> FlagsGuard<'_, T> {
        let mut spins = 0u32;
        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            backoff(&mut spins);
        }
    }

    /// Attempts to acquire the lock with bounded or unbounded retries.
    pub fn lock_with_tries(&self, max_tries: i64) -> Option<FlagsGuard<'_, T>> {
        if max_tries < 0 {
            return Some(self.lock());
        }

        let attempts = max_tries.max(1);
        let mut spins = 0u32;
        for attempt in 0..attempts {
            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }
            if attempt + 1 < attempts {
                backoff(&mut spins);
            }
        }
        None
    }

    /// Reports whether some thread currently holds the lock.
    ///
    /// Only meant for debug assertions: the answer may be stale as soon as it
    /// is returned.
    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Relaxed) & LOCK_BIT != 0
    }

    /// Consumes the lock and returns the payload.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn try_acquire(&self) -> Option<FlagsGuard<'_, T>> {
        let current = self.word.load(Ordering::Relaxed);
        if current & LOCK_BIT != 0 {
            return None;
        }
        // A strong exchange: a free lock must not fail a bounded attempt.
        self.word
            .compare_exchange(
                current,
                current | LOCK_BIT,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
            .map(|_| FlagsGuard { owner: self })
    }
}

impl<T: Default> Default for GuardedFlags<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for GuardedFlags<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedFlags")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

#[inline]
fn backoff(spins: &mut u32) {
    if *spins < SPINS_BEFORE_YIELD {
        *spins += 1;
        std::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
}

/// Proof of holding a [`GuardedFlags`] lock. Unlocks on drop.
pub struct FlagsGuard<'a, T> {
    owner: &'a GuardedFlags<T>,
}

impl<'a, T> FlagsGuard<'a, T> {
    /// Returns whether `flag` is set.
    #[inline]
    pub fn is_set(&self, flag: Flag) -> bool {
        self.owner.word.load(Ordering::Relaxed) & flag.bit() != 0
    }

    /// Flips `flag`.
    #[inline]
    pub fn toggle_flag(&mut self, flag: Flag) {
        self.owner.word.fetch_xor(flag.bit(), Ordering::Relaxed);
    }

    /// Sets `flag` if it is not set yet.
    #[inline]
    pub fn set_flag(&mut self, flag: Flag) {
        self.owner.word.fetch_or(flag.bit(), Ordering::Relaxed);
    }

    /// Clears every flag, keeping the lock held.
    #[inline]
    pub fn clear(&mut self) {
        self.owner.word.store(LOCK_BIT, Ordering::Relaxed);
    }

    /// Releases the lock. Equivalent to dropping the guard.
    #[inline]
    pub fn unlock(self) {}
}

impl<T> Deref for FlagsGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while the lock bit is held by us.
        unsafe { &*self.owner.data.get() }
    }
}

impl<T> DerefMut for FlagsGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while the lock bit is held by us.
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<T> Drop for FlagsGuard<'_, T> {
    fn drop(&mut self) {
        self.owner.word.fetch_and(!LOCK_BIT, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_unlock() {
        let state = GuardedFlags::new(());
        assert!(!state.is_locked());

        let guard = state.lock();
        assert!(state.is_locked());
        guard.unlock();
        assert!(!state.is_locked());
    }

    #[test]
    fn test_bounded_lock_fails_while_held() {
        let state = GuardedFlags::new(());
        let _guard = state.lock();

        assert!(state.lock_with_tries(0).is_none());
        assert!(state.lock_with_tries(10).is_none());
        // Failed attempts must not release or alter the held lock
        assert!(state.is_locked());
    }

    #[test]
    fn test_bounded_lock_succeeds_when_free() {
        let state = GuardedFlags::new(());
        assert!(state.lock_with_tries(0).is_some());
        assert!(state.lock_with_tries(1).is_some());
        assert!(state.lock_with_tries(-1).is_some());
    }

    #[test]
    fn test_single_attempt_on_free_lock_never_fails() {
        let state = GuardedFlags::new(0u32);
        {
            let mut guard = state.lock();
            guard.set_flag(Flag::Migrating);
        }
        for _ in 0..100_000 {
            let guard = state.lock_with_tries(0);
            assert!(guard.is_some());
        }
        assert!(state.lock().is_set(Flag::Migrating));
    }

    #[test]
    fn test_flags_toggle_independently() {
        let state = GuardedFlags::new(());
        let mut guard = state.lock();

        guard.toggle_flag(Flag::ShuttingDown);
        assert!(guard.is_set(Flag::ShuttingDown));
        assert!(!guard.is_set(Flag::Shutdown));

        guard.toggle_flag(Flag::Migrating);
        guard.toggle_flag(Flag::ShuttingDown);
        assert!(!guard.is_set(Flag::ShuttingDown));
        assert!(guard.is_set(Flag::Migrating));
    }

    #[test]
    fn test_flags_survive_unlock() {
        let state = GuardedFlags::new(());
        {
            let mut guard = state.lock();
            guard.set_flag(Flag::Resizing);
        }
        let guard = state.lock();
        assert!(guard.is_set(Flag::Resizing));
    }

    #[test]
    fn test_clear_keeps_lock() {
        let state = GuardedFlags::new(());
        let mut guard = state.lock();
        guard.set_flag(Flag::Shutdown);
        guard.set_flag(Flag::Migrating);
        guard.clear();

        assert!(state.is_locked());
        assert!(!guard.is_set(Flag::Shutdown));
        assert!(!guard.is_set(Flag::Migrating));
    }

    #[test]
    fn test_payload_mutual_exclusion() {
        let state = Arc::new(GuardedFlags::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *state.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*state.lock(), 8000);
    }
}
