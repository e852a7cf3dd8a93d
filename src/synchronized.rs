//! Synchronized: one value behind one lock, reachable only through a scoped guard.

use crate::reentrancy::{DebugOwner, OwnerMark};
use core::fmt;
use core::ops::{Deref, DerefMut};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

/// Owns a `T` and the lock that protects it for the cell's whole lifetime.
///
/// The value is never reachable through a shared reference without a live
/// [`Access`]; the lock is released when that guard goes out of scope, on
/// early return and during unwinding alike. The lock does not poison: a panic
/// while a guard is live leaves the value as the panicking code left it.
///
/// Acquiring the lock again on a thread that already holds it is a contract
/// violation. Debug builds panic on it; release builds deadlock.
pub struct Synchronized<T> {
    owner: DebugOwner,
    value: Mutex<T>,
}

impl<T> Synchronized<T> {
    pub fn new(value: T) -> Self {
        Self {
            owner: DebugOwner::new(),
            value: Mutex::new(value),
        }
    }

    /// Block until the lock is free, then return exclusive access to the value.
    #[track_caller]
    pub fn access(&self) -> Access<'_, T> {
        self.owner.check_reentry();
        let guard = self.value.lock();
        Access {
            mark: self.owner.claim(),
            guard,
        }
    }

    /// Return exclusive access if the lock is free right now, without blocking.
    pub fn try_access(&self) -> Option<Access<'_, T>> {
        let guard = self.value.try_lock()?;
        Some(Access {
            mark: self.owner.claim(),
            guard,
        })
    }

    /// Direct access when `&mut self` already proves no guard is outstanding.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for Synchronized<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Synchronized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // parking_lot's Debug only peeks with try_lock, so this never blocks.
        f.debug_struct("Synchronized")
            .field("value", &self.value)
            .finish()
    }
}

/// Live lock plus a mutable reference to the protected value.
///
/// Move-only: there is no `Clone`, so at most one `Access` to a given cell
/// exists at any time.
pub struct Access<'a, T: ?Sized> {
    // Field order matters: the holder record is cleared before the mutex unlocks.
    mark: OwnerMark<'a>,
    guard: MutexGuard<'a, T>,
}

impl<'a, T: ?Sized> Access<'a, T> {
    /// Narrow the guard to a part of the value while keeping the same lock.
    ///
    /// An associated function rather than a method, so it cannot shadow a
    /// `map` on `T` reached through `Deref`.
    pub fn map<U, F>(this: Self, f: F) -> MappedAccess<'a, U>
    where
        U: ?Sized,
        F: FnOnce(&mut T) -> &mut U,
    {
        let Access { mark, guard } = this;
        MappedAccess {
            mark,
            guard: MutexGuard::map(guard, f),
        }
    }

    /// Narrow the guard if `f` finds a part to narrow to; otherwise hand the
    /// original guard back.
    pub fn try_map<U, F>(this: Self, f: F) -> Result<MappedAccess<'a, U>, Self>
    where
        U: ?Sized,
        F: FnOnce(&mut T) -> Option<&mut U>,
    {
        let Access { mark, guard } = this;
        match MutexGuard::try_map(guard, f) {
            Ok(guard) => Ok(MappedAccess { mark, guard }),
            Err(guard) => Err(Access { mark, guard }),
        }
    }
}

impl<T: ?Sized> Deref for Access<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized> DerefMut for Access<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Access<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Guard produced by [`Access::map`]: same lock, narrower reference.
pub struct MappedAccess<'a, T: ?Sized> {
    mark: OwnerMark<'a>,
    guard: MappedMutexGuard<'a, T>,
}

impl<'a, T: ?Sized> MappedAccess<'a, T> {
    pub fn map<U, F>(this: Self, f: F) -> MappedAccess<'a, U>
    where
        U: ?Sized,
        F: FnOnce(&mut T) -> &mut U,
    {
        let MappedAccess { mark, guard } = this;
        MappedAccess {
            mark,
            guard: MappedMutexGuard::map(guard, f),
        }
    }
}

impl<T: ?Sized> Deref for MappedAccess<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized> DerefMut for MappedAccess<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MappedAccess<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
