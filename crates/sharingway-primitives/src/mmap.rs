//! File-backed memory-mapped regions for cross-process shared memory (Unix).
//!
//! A named object is a file in one of the namespace directories, mapped with
//! `MAP_SHARED`. Creation and attachment go through the same entry point:
//! whoever arrives first sizes the file, later arrivals map whatever size
//! they find. An advisory `flock` serializes the sizing step so concurrent
//! first arrivals cannot observe a half-created object.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU32;

use crate::namespace::Namespace;
use crate::region::{RegionView, WORD_SIZE};

/// File-backed memory-mapped region for cross-process shared memory.
pub struct MappedRegion {
    /// Pointer to the mapped memory
    ptr: *mut u8,
    /// Length of the mapping in bytes
    len: usize,
    /// The underlying file (kept open to maintain the mapping)
    #[allow(dead_code)]
    file: File,
    /// Path to the backing file
    path: PathBuf,
}

struct FlockGuard {
    fd: libc::c_int,
}

impl FlockGuard {
    fn exclusive(file: &File) -> io::Result<Self> {
        Self::acquire(file, libc::LOCK_EX)
    }

    fn shared(file: &File) -> io::Result<Self> {
        Self::acquire(file, libc::LOCK_SH)
    }

    fn acquire(file: &File, op: libc::c_int) -> io::Result<Self> {
        let fd = file.as_raw_fd();
        let rc = unsafe { libc::flock(fd, op) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }
}

impl Drop for FlockGuard {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.fd, libc::LOCK_UN);
        }
    }
}

impl MappedRegion {
    /// Open the object at `path`, creating and sizing it to `capacity` bytes
    /// if it does not exist yet.
    ///
    /// If the file already has a size, that size wins and `capacity` is
    /// ignored: the first creator fixes the capacity for everyone. A freshly
    /// sized file is zero-filled, which is the "nothing published" wire
    /// state, so no further initialization is needed.
    pub fn create_or_attach(path: &Path, capacity: usize) -> io::Result<Self> {
        if capacity < WORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "capacity must hold at least the control word",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)?;

        let size = {
            let _flock = FlockGuard::exclusive(&file)?;
            if file.metadata()?.len() == 0 {
                file.set_len(capacity as u64)?;
            }
            file.metadata()?.len() as usize
        };

        Self::map(file, size, path)
    }

    /// Attach to an existing object at `path`; fails if it is absent.
    ///
    /// Takes the sizing flock shared, so an attach racing a creator blocks
    /// until the creator has fixed the size. A zero-sized file is reported
    /// as absent (the creator died between open and sizing).
    pub fn attach_existing(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let size = {
            let _flock = FlockGuard::shared(&file)?;
            file.metadata()?.len() as usize
        };
        if size < WORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "shared object exists but was never sized",
            ));
        }

        Self::map(file, size, path)
    }

    /// Attach to the named object, probing every namespace candidate.
    ///
    /// Existing objects are preferred across all candidates before anything
    /// is created, so participants that resolve the namespace differently
    /// still converge on one object.
    pub fn attach_named(ns: &Namespace, object: &str, capacity: usize) -> io::Result<Self> {
        let paths = ns.object_paths(object);

        for path in &paths {
            if let Ok(region) = Self::attach_existing(path) {
                return Ok(region);
            }
        }

        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("no namespace candidate for shared object {object:?}"),
        );
        for path in &paths {
            match Self::create_or_attach(path, capacity) {
                Ok(region) => return Ok(region),
                Err(err) => {
                    tracing::debug!(
                        target: "sharingway::region",
                        path = %path.display(),
                        error = %err,
                        "shared object creation failed, trying next namespace"
                    );
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn map(file: File, size: usize, path: &Path) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            len: size,
            file,
            path: path.to_path_buf(),
        })
    }

    /// Byte view of this mapping for payload copies.
    #[inline]
    pub fn region(&self) -> RegionView {
        // SAFETY: The mapping is valid for the lifetime of MappedRegion
        unsafe { RegionView::new(self.ptr, self.len) }
    }

    /// The 32-bit control word at the start of the mapping.
    #[inline]
    pub fn word(&self) -> &AtomicU32 {
        // SAFETY: the mapping is page-aligned, at least WORD_SIZE long, and
        // lives as long as &self.
        unsafe { &*(self.ptr as *const AtomicU32) }
    }

    /// Get the size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region is empty (zero bytes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the path to the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // Unmap only. The backing file stays: unlinking it would split later
        // attachers onto a fresh inode while current holders still map the
        // old one, breaking the single-name rendezvous.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

// SAFETY: The mapping is valid for the lifetime of MappedRegion and the
// underlying memory is shared; all mutation is serialized by callers.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}
