//! Named cross-process lock and signal (Windows).
//!
//! Direct mapping onto kernel objects: the lock is a named mutex, the
//! signal a named auto-reset event. `WAIT_ABANDONED` counts as an acquire
//! (the previous holder died; the protected region is a single atomic
//! snapshot, so there is no torn state to repair).

use std::io;
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, GetLastError, HANDLE, WAIT_ABANDONED, WAIT_OBJECT_0,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, CreateMutexW, OpenEventW, OpenMutexW, ReleaseMutex, SetEvent,
    WaitForSingleObject,
};

use crate::namespace::{Namespace, lock_object_name, signal_object_name};

const EVENT_MODIFY_STATE: u32 = 0x0002;
const SYNCHRONIZE: u32 = 0x0010_0000;

fn wide(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

fn timeout_ms(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128 - 1) as u32
}

/// Open or create a kernel object across the namespace candidates: open
/// everywhere first, then create with access-denied fallback.
fn attach_object(
    ns: &Namespace,
    object: &str,
    open: impl Fn(&[u16]) -> HANDLE,
    create: impl Fn(&[u16]) -> HANDLE,
) -> io::Result<HANDLE> {
    let names = ns.qualified_names(object);

    for name in &names {
        let handle = open(&wide(name));
        if handle != 0 {
            return Ok(handle);
        }
    }

    let mut last_err = io::Error::new(
        io::ErrorKind::NotFound,
        format!("no namespace candidate for sync object {object:?}"),
    );
    for name in &names {
        let handle = create(&wide(name));
        if handle != 0 {
            return Ok(handle);
        }
        let err = io::Error::last_os_error();
        let denied = unsafe { GetLastError() } == ERROR_ACCESS_DENIED;
        tracing::debug!(
            target: "sharingway::region",
            name = %name,
            error = %err,
            denied,
            "sync object creation failed, trying next namespace"
        );
        last_err = err;
    }
    Err(last_err)
}

// ── NamedLock ──────────────────────────────────────────────────────────────

/// A cross-process mutex addressed by name.
pub struct NamedLock {
    handle: HANDLE,
}

impl NamedLock {
    /// Attach to (or create) the lock object for `base`.
    pub fn attach(ns: &Namespace, base: &str) -> io::Result<Self> {
        let handle = attach_object(
            ns,
            &lock_object_name(base),
            |name| unsafe { OpenMutexW(SYNCHRONIZE, 0, name.as_ptr()) },
            |name| unsafe { CreateMutexW(std::ptr::null(), 0, name.as_ptr()) },
        )?;
        Ok(Self { handle })
    }

    /// Acquire the lock, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout. The returned guard releases the lock on
    /// drop, so every exit path out of a locked section unlocks.
    pub fn lock(&self, timeout: Duration) -> Option<LockGuard<'_>> {
        let rc = unsafe { WaitForSingleObject(self.handle, timeout_ms(timeout)) };
        if rc == WAIT_OBJECT_0 || rc == WAIT_ABANDONED {
            Some(LockGuard { lock: self })
        } else {
            None
        }
    }

    fn release(&self) {
        unsafe {
            ReleaseMutex(self.handle);
        }
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

// SAFETY: kernel handles are process-global tokens; the mutex itself
// serializes cross-thread use.
unsafe impl Send for NamedLock {}
unsafe impl Sync for NamedLock {}

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
/// Backed by a named auto-reset event: a pulse releases at most one waiter
/// and resets; waiters that arrive later miss it.
pub struct NamedSignal {
    handle: HANDLE,
}

impl NamedSignal {
    /// Attach to (or create) the signal object for `base`.
    pub fn attach(ns: &Namespace, base: &str) -> io::Result<Self> {
        let handle = attach_object(
            ns,
            &signal_object_name(base),
            |name| unsafe { OpenEventW(EVENT_MODIFY_STATE | SYNCHRONIZE, 0, name.as_ptr()) },
            |name| unsafe { CreateEventW(std::ptr::null(), 0, 0, name.as_ptr()) },
        )?;
        Ok(Self { handle })
    }

    /// Emit one pulse: release at most one parked waiter.
    pub fn pulse(&self) {
        unsafe {
            SetEvent(self.handle);
        }
    }

    /// Wait for a pulse.
    ///
    /// Returns `true` when the signal fired, `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let rc = unsafe { WaitForSingleObject(self.handle, timeout_ms(timeout)) };
        rc == WAIT_OBJECT_0
    }
}

impl Drop for NamedSignal {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

// SAFETY: kernel handles are process-global tokens.
unsafe impl Send for NamedSignal {}
unsafe impl Sync for NamedSignal {}

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
