//! The host's global execution lock.
//!
//! Host code runs while holding a [`HostGuard`]. Long engine calls give the
//! guard up for their duration so unrelated host work can proceed, then take
//! it back before control returns to host code.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

static HOST_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    HOST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive hold on the host execution lock.
///
/// Not re-entrant: acquiring a second guard on a thread that already holds
/// one blocks forever.
#[derive(Debug)]
pub struct HostGuard {
    held: Option<MutexGuard<'static, ()>>,
}

impl HostGuard {
    /// Blocks until the lock is free and takes it.
    pub fn acquire() -> Self {
        Self { held: Some(lock()) }
    }

    /// Takes the lock if nobody holds it.
    pub fn try_acquire() -> Option<Self> {
        match HOST_LOCK.try_lock() {
            Ok(guard) => Some(Self { held: Some(guard) }),
            Err(TryLockError::Poisoned(poison)) => Some(Self {
                held: Some(poison.into_inner()),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Whether this guard currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Releases the lock, runs `work`, and reacquires the lock before
    /// returning `work`'s result.
    pub fn release_during<T>(&mut self, work: impl FnOnce() -> T) -> T {
        self.held = None;
        let result = work();
        self.held = Some(lock());
        result
    }
}
