//! Timed cross-process waiting on a shared 32-bit word.
//!
//! Uses futex on Linux; other Unix platforms fall back to bounded-sleep
//! polling. The word lives in shared memory, so the futex calls must use the
//! shared (non-private) form.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Block until `word` no longer holds `expected`, a wake arrives, or the
/// timeout expires.
///
/// Returns `false` only when the timeout expired; interrupted or spurious
/// wakeups return `true` and the caller re-checks its condition.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let ts;
    let ts_ptr = match timeout {
        Some(t) => {
            ts = libc::timespec {
                tv_sec: t.as_secs() as libc::time_t,
                tv_nsec: t.subsec_nanos() as _,
            };
            &ts as *const libc::timespec
        }
        None => std::ptr::null(),
    };

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
        )
    };

    if rc == 0 {
        return true;
    }
    // EAGAIN means the word already changed; EINTR is a spurious wake.
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ETIMEDOUT)
}

/// Wake up to `count` waiters parked on `word`.
#[cfg(target_os = "linux")]
pub fn futex_wake(word: &AtomicU32, count: u32) {
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count);
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    const POLL_INTERVAL: Duration = Duration::from_millis(2);

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if word.load(Ordering::Acquire) != expected {
            return true;
        }
        let mut sleep = POLL_INTERVAL;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep = sleep.min(deadline - now);
        }
        std::thread::sleep(sleep);
    }
}

/// No-op on the polling fallback; sleepers notice the changed word.
#[cfg(all(unix, not(target_os = "linux")))]
pub fn futex_wake(_word: &AtomicU32, _count: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    #[test]
    fn wait_times_out_when_value_unchanged() {
        let word = AtomicU32::new(7);
        let start = Instant::now();
        let woken = futex_wait(&word, 7, Some(Duration::from_millis(30)));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn wait_returns_immediately_on_stale_expected() {
        let word = AtomicU32::new(1);
        let woken = futex_wait(&word, 0, Some(Duration::from_secs(5)));
        assert!(woken);
    }

    #[test]
    fn wake_releases_a_parked_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let word2 = Arc::clone(&word);

        let waiter = std::thread::spawn(move || {
            futex_wait(&word2, 0, Some(Duration::from_secs(5)))
        });

        std::thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::Release);
        futex_wake(&word, 1);

        assert!(waiter.join().expect("waiter thread"));
    }
}
