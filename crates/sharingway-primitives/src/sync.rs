//! Named cross-process lock and signal (Unix).
//!
//! Each primitive is a single shared control word in its own small mapped
//! file, waited on through the futex layer:
//!
//! - `NamedLock` is a strict cross-process mutex (word: 0 free, 1 held,
//!   2 held-with-waiters) with timed acquisition.
//! - `NamedSignal` is an edge-triggered pulse backed by a pending flag,
//!   the moral equivalent of a named auto-reset event: a pulse releases at
//!   most one waiter, and whichever waiter consumes it resets the flag.
//!   Pulses do not queue; emitting while one is already pending coalesces.
//!
//! Neither primitive carries data. Protocols built on top treat the signal
//! purely as a nudge and re-check shared state after every wake.

use std::io;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::futex::{futex_wait, futex_wake};
use crate::mmap::MappedRegion;
use crate::namespace::{Namespace, lock_object_name, signal_object_name};

/// Size of the backing file for one sync word. A page on every tier we
/// target; only the control word is used.
const SYNC_OBJECT_SIZE: usize = 4096;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

const IDLE: u32 = 0;
const PENDING: u32 = 1;

// ── NamedLock ──────────────────────────────────────────────────────────────

/// A cross-process mutex addressed by name.
pub struct NamedLock {
    map: MappedRegion,
}

impl NamedLock {
    /// Attach to (or create) the lock object for `base`.
    pub fn attach(ns: &Namespace, base: &str) -> io::Result<Self> {
        let map = MappedRegion::attach_named(ns, &lock_object_name(base), SYNC_OBJECT_SIZE)?;
        Ok(Self { map })
    }

    /// Acquire the lock, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout. The returned guard releases the lock on
    /// drop, so every exit path out of a locked section unlocks.
    pub fn lock(&self, timeout: Duration) -> Option<LockGuard<'_>> {
        let word = self.map.word();

        if word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Some(LockGuard { lock: self });
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Mark contended unconditionally; the unlocker then knows to wake.
            if word.swap(CONTENDED, Ordering::Acquire) == UNLOCKED {
                return Some(LockGuard { lock: self });
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            futex_wait(word, CONTENDED, Some(deadline - now));
        }
    }

    fn release(&self) {
        let word = self.map.word();
        if word.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            futex_wake(word, 1);
        }
    }
}

/// Holds a [`NamedLock`] until dropped.
pub struct LockGuard<'a> {
    lock: &'a NamedLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

// ── NamedSignal ────────────────────────────────────────────────────────────

/// An edge-triggered cross-process pulse addressed by name.
///
/// The shared word is a pending flag. A pulse raises it and wakes at most
/// one parked waiter; the single waiter that consumes the flag lowers it
/// again, so one pulse releases one waiter no matter how many are parked
/// (and no matter in how many processes).
pub struct NamedSignal {
    map: MappedRegion,
}

impl NamedSignal {
    /// Attach to (or create) the signal object for `base`.
    pub fn attach(ns: &Namespace, base: &str) -> io::Result<Self> {
        let map = MappedRegion::attach_named(ns, &signal_object_name(base), SYNC_OBJECT_SIZE)?;
        Ok(Self { map })
    }

    /// Emit one pulse: raise the flag and wake at most one parked waiter.
    ///
    /// Pulsing while a pulse is already pending coalesces into one.
    pub fn pulse(&self) {
        let word = self.map.word();
        word.store(PENDING, Ordering::Release);
        futex_wake(word, 1);
    }

    /// Wait for a pulse, consuming (resetting) it.
    ///
    /// Returns `true` when this caller took the pending pulse, `false` on
    /// timeout. Of all concurrent waiters exactly one consumes any given
    /// pulse; the rest keep waiting.
    pub fn wait(&self, timeout: Duration) -> bool {
        let word = self.map.word();
        let deadline = Instant::now() + timeout;

        loop {
            if word
                .compare_exchange(PENDING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            futex_wait(word, IDLE, Some(deadline - now));
        }
    }
}

// ── NamedSync ──────────────────────────────────────────────────────────────

/// The lock/signal pair guarding one shared region, both derived from the
/// same base name.
pub struct NamedSync {
    lock: NamedLock,
    signal: NamedSignal,
}

impl NamedSync {
    /// Attach to (or create) both sync objects for `base`.
    pub fn attach(ns: &Namespace, base: &str) -> io::Result<Self> {
        Ok(Self {
            lock: NamedLock::attach(ns, base)?,
            signal: NamedSignal::attach(ns, base)?,
        })
    }

    /// Acquire the lock; `None` on timeout.
    #[inline]
    pub fn lock(&self, timeout: Duration) -> Option<LockGuard<'_>> {
        self.lock.lock(timeout)
    }

    /// Emit one pulse.
    #[inline]
    pub fn pulse(&self) {
        self.signal.pulse()
    }

    /// Wait for a pulse; `false` on timeout.
    #[inline]
    pub fn wait_signal(&self, timeout: Duration) -> bool {
        self.signal.wait(timeout)
    }
}
