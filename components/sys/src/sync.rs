//! Portable lock primitives (§4.1/§5): a thin, explicit wrapper around
//! `parking_lot` rather than `std::sync`, since `parking_lot` gives us
//! timed condvar waits and an upgradable read guard without poisoning
//! ceremony at every call site.
use parking_lot::{Condvar as PCondvar, Mutex as PMutex, RwLock as PRwLock};
use std::time::{Duration, Instant};

pub struct Mutex<T>(PMutex<T>);

impl<T> Mutex<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Mutex(PMutex::new(value))
    }

    #[inline]
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, T> {
        self.0.lock()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<parking_lot::MutexGuard<'_, T>> {
        self.0.try_lock()
    }
}

/// Writer-preferring read-write lock with try-upgrade support, matching the
/// semantics `rrwlock_t` layers on top of a plain rwlock.
pub struct RwLock<T>(PRwLock<T>);

impl<T> RwLock<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        RwLock(PRwLock::new(value))
    }

    #[inline]
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, T> {
        self.0.read()
    }

    #[inline]
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    #[inline]
    pub fn upgradable_read(&self) -> parking_lot::RwLockUpgradableReadGuard<'_, T> {
        self.0.upgradable_read()
    }

    /// Attempt to upgrade a previously-acquired upgradable read guard to a
    /// write guard without dropping it (and hence without letting another
    /// writer interleave).
    #[inline]
    pub fn try_upgrade<'a>(
        guard: parking_lot::RwLockUpgradableReadGuard<'a, T>,
    ) -> Result<parking_lot::RwLockWriteGuard<'a, T>, parking_lot::RwLockUpgradableReadGuard<'a, T>>
    {
        parking_lot::RwLockUpgradableReadGuard::try_upgrade(guard)
    }
}

/// Condition variable supporting both relative and absolute-deadline waits.
pub struct Condvar(PCondvar);

impl Condvar {
    #[inline]
    pub fn new() -> Self {
        Condvar(PCondvar::new())
    }

    #[inline]
    pub fn wait<T>(&self, guard: &mut parking_lot::MutexGuard<'_, T>) {
        self.0.wait(guard);
    }

    /// Wait for at most `timeout`, returning whether the wait timed out.
    #[inline]
    pub fn wait_timeout<T>(
        &self,
        guard: &mut parking_lot::MutexGuard<'_, T>,
        timeout: Duration,
    ) -> bool {
        self.0.wait_for(guard, timeout).timed_out()
    }

    /// Wait until an absolute deadline, returning whether it timed out.
    #[inline]
    pub fn wait_until<T>(
        &self,
        guard: &mut parking_lot::MutexGuard<'_, T>,
        deadline: Instant,
    ) -> bool {
        let now = Instant::now();
        if deadline <= now {
            return true;
        }
        self.wait_timeout(guard, deadline - now)
    }

    #[inline]
    pub fn notify_one(&self) {
        self.0.notify_one();
    }

    #[inline]
    pub fn notify_all(&self) {
        self.0.notify_all();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
