//! Debug-only recursive-acquisition detector.
//!
//! Records which thread currently holds a lock. In debug builds, a thread
//! that asks for a lock it already holds panics instead of deadlocking. In
//! release builds, this compiles to a zero-cost no-op and recursive
//! acquisition deadlocks as it would on a bare mutex.

#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicU64, Ordering};

/// Tag value meaning "no holder".
#[cfg(debug_assertions)]
const NO_HOLDER: u64 = 0;

/// Small per-thread tag. `ThreadId::as_u64` is unstable, so threads draw a
/// tag from a process-wide counter the first time they lock anything.
#[cfg(debug_assertions)]
fn current_thread_tag() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    std::thread_local! {
        static TAG: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TAG.with(|tag| *tag)
}

/// Per-lock holder tracker. Embed next to a mutex and bracket every
/// acquisition with `check_reentry` (before blocking) and `claim` (after the
/// lock is obtained).
#[derive(Debug)]
pub struct DebugOwner {
    #[cfg(debug_assertions)]
    holder: AtomicU64,
}

impl DebugOwner {
    /// Create a tracker with no holder. Const so it can sit in a const constructor.
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            holder: AtomicU64::new(NO_HOLDER),
        }
    }

    /// Panics in debug builds if the calling thread already holds the lock.
    ///
    /// The holder field is only written by the thread that owns the lock, so
    /// a thread can only ever read back its own tag while it is the holder.
    #[inline]
    #[track_caller]
    pub fn check_reentry(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.holder.load(Ordering::Acquire) != current_thread_tag(),
                "recursive acquisition: this thread already holds the lock"
            );
        }
    }

    /// Record the calling thread as holder. Must only be called with the lock held.
    #[inline]
    pub fn claim(&self) -> OwnerMark<'_> {
        #[cfg(debug_assertions)]
        {
            let tag = current_thread_tag();
            self.holder.store(tag, Ordering::Release);
            return OwnerMark { owner: self, tag };
        }

        #[cfg(not(debug_assertions))]
        {
            return OwnerMark {
                _z: core::marker::PhantomData,
            };
        }
    }
}

impl Default for DebugOwner {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII mark returned by `DebugOwner::claim`. Clears the holder on drop; it
/// must be dropped before the lock it describes is released.
pub struct OwnerMark<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugOwner,
    #[cfg(debug_assertions)]
    tag: u64,
    #[cfg(not(debug_assertions))]
    _z: core::marker::PhantomData<&'a ()>,
}

impl<'a> Drop for OwnerMark<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            // Only clear our own tag: if the lock was already handed on, the
            // new holder's record stays intact.
            let _ = self.owner.holder.compare_exchange(
                self.tag,
                NO_HOLDER,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }
}
