//! Shared helpers for the integration suites.
//!
//! The registry is a machine-wide singleton, so every test derives provider
//! names from the process id plus a counter: concurrent test binaries (and
//! leftover entries from earlier runs) never collide with ours.

// Not every suite uses every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use sharingway::{Config, NamespacePolicy};

/// A provider name unique to this process and call site.
pub fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "it-{tag}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Test configuration: session namespace, so runs without access to the
/// global namespace behave the same as privileged ones.
pub fn test_config() -> Config {
    Config {
        global_namespace: NamespacePolicy::Disable,
        ..Config::default()
    }
}

/// Drain a callback channel until `pred` matches or the timeout expires.
pub fn wait_for<T>(rx: &Receiver<T>, timeout: Duration, pred: impl Fn(&T) -> bool) -> Option<T> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let now = std::time::Instant::now();
        if now >= deadline {
            return None;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(item) if pred(&item) => return Some(item),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
