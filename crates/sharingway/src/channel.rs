//! The snapshot channel: a shared region carrying one document, plus the
//! named sync pair that serializes access to it.
//!
//! Wire format of a region: bytes `[0..4)` hold a little-endian u32 length
//! `N`; bytes `[4..4+N)` hold the compact UTF-8 serialization of the
//! document. `N = 0` (the state of a freshly created region) means nothing
//! has been published. Writers establish the payload before publishing the
//! length, so a reader that validates the header never sees a torn payload.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sharingway_primitives::{LockGuard, MappedRegion, Namespace, NamedSync, region_object_name};

use crate::Document;
use crate::error::{DecodeError, Error, Result};

/// Byte length of the length header.
const HEADER_SIZE: usize = 4;

/// Smallest usable region: the header plus room for a minimal document.
const MIN_CAPACITY: usize = 64;

// ── SharedRegion ───────────────────────────────────────────────────────────

/// A named shared-memory region holding one length-prefixed document.
///
/// `SharedRegion` performs no locking of its own; callers serialize all
/// access through the channel's [`NamedSync`] lock.
pub struct SharedRegion {
    map: MappedRegion,
}

impl SharedRegion {
    /// Attach to the region for `base` (`Sharingway.<base>`), creating it
    /// with `capacity` bytes if absent. An existing region keeps the
    /// capacity its creator fixed.
    pub fn attach(ns: &Namespace, base: &str, capacity: usize) -> Result<Self> {
        let object = region_object_name(base);
        let map = MappedRegion::attach_named(ns, &object, capacity.max(MIN_CAPACITY))
            .map_err(|e| Error::unavailable(&object, e))?;
        if map.len() < MIN_CAPACITY {
            return Err(Error::Unavailable(format!(
                "region {object} is only {} bytes, below the {MIN_CAPACITY}-byte minimum",
                map.len()
            )));
        }
        Ok(Self { map })
    }

    /// The region's capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    fn header(&self) -> &AtomicU32 {
        self.map.word()
    }

    /// Serialize `doc` into the region.
    ///
    /// Fails with [`Error::Oversize`] before touching the region, so a
    /// rejected write leaves the previous snapshot intact. The payload is
    /// copied first and the length header stored last.
    pub fn write(&self, doc: &Document) -> Result<()> {
        let text = serde_json::to_string(doc).map_err(Error::Encode)?;
        let capacity = self.capacity();
        if HEADER_SIZE + text.len() > capacity {
            return Err(Error::Oversize {
                len: text.len(),
                capacity,
            });
        }

        let region = self.map.region();
        region.write_bytes(HEADER_SIZE, text.as_bytes());
        self.header().store(text.len() as u32, Ordering::Release);
        Ok(())
    }

    /// Decode the region's current document.
    ///
    /// Returns `Ok(None)` when nothing has been published (`N = 0`), and
    /// [`Error::Decode`] when the header or payload fails validation.
    pub fn read(&self) -> Result<Option<Document>> {
        let len = self.header().load(Ordering::Acquire);
        if len == 0 {
            return Ok(None);
        }
        let capacity = self.capacity();
        if len as usize > capacity.saturating_sub(HEADER_SIZE) {
            return Err(DecodeError::BadLength { len, capacity }.into());
        }

        let mut payload = vec![0u8; len as usize];
        self.map.region().read_bytes(HEADER_SIZE, &mut payload);

        let text = std::str::from_utf8(&payload).map_err(|_| DecodeError::InvalidUtf8)?;
        let doc = serde_json::from_str(text).map_err(DecodeError::Json)?;
        Ok(Some(doc))
    }
}

// ── Channel ────────────────────────────────────────────────────────────────

/// One provider's publication channel: its region and its sync pair.
pub(crate) struct Channel {
    pub(crate) region: SharedRegion,
    pub(crate) sync: NamedSync,
}

impl Channel {
    /// Attach region and sync objects for `base`.
    pub(crate) fn attach(ns: &Namespace, base: &str, capacity: usize) -> Result<Self> {
        let region = SharedRegion::attach(ns, base, capacity)?;
        let sync = NamedSync::attach(ns, base)
            .map_err(|e| Error::unavailable(&format!("sync objects for {base}"), e))?;
        Ok(Self { region, sync })
    }

    /// Acquire the channel lock; [`Error::Locked`] on timeout.
    pub(crate) fn lock(&self, timeout: Duration) -> Result<LockGuard<'_>> {
        self.sync.lock(timeout).ok_or(Error::Locked)
    }

    /// Write `doc` under the lock, then pulse the signal.
    pub(crate) fn publish(&self, doc: &Document, lock_timeout: Duration) -> Result<()> {
        {
            let _guard = self.lock(lock_timeout)?;
            self.region.write(doc)?;
        }
        self.sync.pulse();
        Ok(())
    }

    /// Read the current document under the lock.
    ///
    /// Returns `Ok(None)` both when nothing is published and when the lock
    /// timed out; watchers treat either as "nothing to deliver this round".
    pub(crate) fn read_locked(&self, lock_timeout: Duration) -> Result<Option<Document>> {
        let Some(_guard) = self.sync.lock(lock_timeout) else {
            return Ok(None);
        };
        self.region.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sharingway_primitives::NamespacePolicy;

    fn test_namespace() -> Namespace {
        Namespace::new(NamespacePolicy::Disable)
    }

    fn unique_base(tag: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "chan-{tag}-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn fresh_region_reads_as_none() {
        let ns = test_namespace();
        let region = SharedRegion::attach(&ns, &unique_base("empty"), 8192).expect("attach");
        assert!(region.read().expect("read").is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let ns = test_namespace();
        let region = SharedRegion::attach(&ns, &unique_base("roundtrip"), 8192).expect("attach");

        let doc = json!({
            "counter": 1,
            "nested": { "values": [1, 2.5, "three", null, true] },
        });
        region.write(&doc).expect("write");
        assert_eq!(region.read().expect("read"), Some(doc));
    }

    #[test]
    fn second_attachment_sees_the_snapshot() {
        let ns = test_namespace();
        let base = unique_base("shared");
        let writer = SharedRegion::attach(&ns, &base, 8192).expect("attach writer");
        let reader = SharedRegion::attach(&ns, &base, 8192).expect("attach reader");

        writer.write(&json!({"x": 42})).expect("write");
        assert_eq!(reader.read().expect("read"), Some(json!({"x": 42})));
    }

    #[test]
    fn oversize_write_rejected_and_snapshot_kept() {
        let ns = test_namespace();
        let region = SharedRegion::attach(&ns, &unique_base("oversize"), 4096).expect("attach");

        region.write(&json!({"keep": "me"})).expect("small write");

        let big = json!({ "blob": "y".repeat(5000) });
        match region.write(&big) {
            Err(Error::Oversize { capacity, .. }) => assert_eq!(capacity, 4096),
            other => panic!("expected Oversize, got {other:?}"),
        }

        assert_eq!(region.read().expect("read"), Some(json!({"keep": "me"})));
    }

    #[test]
    fn garbage_length_header_is_a_decode_error() {
        let ns = test_namespace();
        let region = SharedRegion::attach(&ns, &unique_base("garbage"), 4096).expect("attach");

        region.header().store(u32::MAX, Ordering::Release);
        match region.read() {
            Err(Error::Decode(DecodeError::BadLength { .. })) => {}
            other => panic!("expected BadLength, got {other:?}"),
        }
    }

    #[test]
    fn invalid_payload_is_a_decode_error() {
        let ns = test_namespace();
        let region = SharedRegion::attach(&ns, &unique_base("bad-json"), 4096).expect("attach");

        region.map.region().write_bytes(HEADER_SIZE, b"not json!");
        region.header().store(9, Ordering::Release);
        match region.read() {
            Err(Error::Decode(DecodeError::Json(_))) => {}
            other => panic!("expected Json decode error, got {other:?}"),
        }
    }

    #[test]
    fn channel_publish_wakes_waiter_and_delivers() {
        let ns = test_namespace();
        let base = unique_base("pubsub");
        let publisher = Channel::attach(&ns, &base, 8192).expect("attach publisher");
        let watcher = Channel::attach(&ns, &base, 8192).expect("attach watcher");

        publisher
            .publish(&json!({"seq": 1}), Duration::from_secs(1))
            .expect("publish");

        assert!(watcher.sync.wait_signal(Duration::from_secs(2)));
        let doc = watcher
            .read_locked(Duration::from_secs(1))
            .expect("read")
            .expect("document present");
        assert_eq!(doc, json!({"seq": 1}));
    }
}
