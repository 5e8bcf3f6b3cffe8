//! OS-level primitives for Sharingway's shared-memory channels.
//!
//! This crate knows nothing about documents, providers, or registries. It
//! provides the three building blocks the protocol layer is assembled from:
//!
//! - [`MappedRegion`]: a named, fixed-size shared-memory region mapped into
//!   the process (file-backed mmap on Unix, pagefile-backed file mapping on
//!   Windows).
//! - [`NamedLock`] / [`NamedSignal`]: a cross-process mutex and an
//!   edge-triggered cross-process pulse, both addressed by name and bundled
//!   as [`NamedSync`].
//! - [`Namespace`]: resolution of the global-vs-session namespace policy
//!   and the derivation of on-disk / kernel object names.

pub mod namespace;
pub mod region;

pub use namespace::{
    Namespace, NamespacePolicy, lock_object_name, region_object_name, signal_object_name,
};
pub use region::{RegionView, WORD_SIZE};

#[cfg(unix)]
mod futex;
#[cfg(unix)]
mod mmap;
#[cfg(unix)]
mod sync;

#[cfg(unix)]
pub use mmap::MappedRegion;
#[cfg(unix)]
pub use sync::{LockGuard, NamedLock, NamedSignal, NamedSync};

#[cfg(windows)]
mod mmap_windows;
#[cfg(windows)]
mod sync_windows;

#[cfg(windows)]
pub use mmap_windows::MappedRegion;
#[cfg(windows)]
pub use sync_windows::{LockGuard, NamedLock, NamedSignal, NamedSync};
