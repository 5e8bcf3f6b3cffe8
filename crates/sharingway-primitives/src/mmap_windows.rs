//! Named shared-memory regions for cross-process use (Windows).
//!
//! Regions are pagefile-backed file mappings addressed by kernel object
//! name, optionally in the cross-session `Global\` namespace. Opening an
//! existing mapping is always tried before creating one, across every
//! namespace candidate, so independently started processes rendezvous on
//! the first-created object.

use std::io;
use std::sync::atomic::AtomicU32;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, GetLastError, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MapViewOfFile,
    OpenFileMappingW, PAGE_READWRITE, UnmapViewOfFile, VirtualQuery,
};

use crate::namespace::Namespace;
use crate::region::{RegionView, WORD_SIZE};

fn wide(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Named shared-memory region for cross-process use.
pub struct MappedRegion {
    /// Pointer to the mapped view
    ptr: *mut u8,
    /// Length of the view in bytes
    len: usize,
    /// Handle to the file mapping object (kept open to keep the name alive)
    mapping: HANDLE,
    /// The kernel object name the region resolved to
    name: String,
}

impl MappedRegion {
    /// Open the named mapping if it exists, otherwise create it with
    /// `capacity` bytes. The view size of an opened mapping is whatever the
    /// creator fixed; `capacity` is ignored in that case.
    pub fn create_or_attach(name: &str, capacity: usize) -> io::Result<Self> {
        if capacity < WORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "capacity must hold at least the control word",
            ));
        }

        if let Ok(region) = Self::attach_existing(name) {
            return Ok(region);
        }

        let name_w = wide(name);
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                std::ptr::null(),
                PAGE_READWRITE,
                (capacity as u64 >> 32) as u32,
                capacity as u32,
                name_w.as_ptr(),
            )
        };
        if mapping == 0 {
            return Err(io::Error::last_os_error());
        }

        // CreateFileMappingW can also have opened a racing creator's object;
        // the view below sizes itself either way.
        Self::map(mapping, name)
    }

    /// Open an existing named mapping; fails if it is absent.
    pub fn attach_existing(name: &str) -> io::Result<Self> {
        let name_w = wide(name);
        let mapping = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, name_w.as_ptr()) };
        if mapping == 0 {
            return Err(io::Error::last_os_error());
        }
        Self::map(mapping, name)
    }

    /// Attach to the named object, probing every namespace candidate.
    ///
    /// Existing objects are preferred across all candidates before anything
    /// is created. Creation falls back to the next namespace when the OS
    /// denies the global one.
    pub fn attach_named(ns: &Namespace, object: &str, capacity: usize) -> io::Result<Self> {
        let names = ns.qualified_names(object);

        for name in &names {
            if let Ok(region) = Self::attach_existing(name) {
                return Ok(region);
            }
        }

        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("no namespace candidate for shared object {object:?}"),
        );
        for name in &names {
            match Self::create_or_attach(name, capacity) {
                Ok(region) => return Ok(region),
                Err(err) => {
                    let denied = unsafe { GetLastError() } == ERROR_ACCESS_DENIED;
                    tracing::debug!(
                        target: "sharingway::region",
                        name = %name,
                        error = %err,
                        denied,
                        "shared object creation failed, trying next namespace"
                    );
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn map(mapping: HANDLE, name: &str) -> io::Result<Self> {
        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if view.Value.is_null() {
            let err = io::Error::last_os_error();
            unsafe { CloseHandle(mapping) };
            return Err(err);
        }

        // A zero-length MapViewOfFile maps the whole section; recover its
        // size from the committed region.
        let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        let queried = unsafe {
            VirtualQuery(
                view.Value,
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if queried == 0 {
            let err = io::Error::last_os_error();
            unsafe {
                UnmapViewOfFile(view);
                CloseHandle(mapping);
            }
            return Err(err);
        }
        if info.RegionSize < WORD_SIZE {
            unsafe {
                UnmapViewOfFile(view);
                CloseHandle(mapping);
            }
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "mapping too small for the control word",
            ));
        }

        Ok(Self {
            ptr: view.Value as *mut u8,
            len: info.RegionSize,
            mapping,
            name: name.to_string(),
        })
    }

    /// Byte view of this mapping for payload copies.
    #[inline]
    pub fn region(&self) -> RegionView {
        // SAFETY: The view is valid for the lifetime of MappedRegion
        unsafe { RegionView::new(self.ptr, self.len) }
    }

    /// The 32-bit control word at the start of the mapping.
    #[inline]
    pub fn word(&self) -> &AtomicU32 {
        // SAFETY: the view is page-aligned, at least WORD_SIZE long, and
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

    /// The kernel object name this region resolved to.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(windows_sys::Win32::System::Memory::MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.ptr as *mut core::ffi::c_void,
            });
            CloseHandle(self.mapping);
        }
    }
}

// SAFETY: The view is valid for the lifetime of MappedRegion and the
// underlying memory is shared; all mutation is serialized by callers.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}
