//! The shared provider registry.
//!
//! One well-known channel (`Sharingway.Registry` plus the `Registry` sync
//! pair) holds a map from provider name to metadata. Every provider and
//! subscriber attaches to it; mutations go through the registry lock and
//! are announced with a pulse, which a background watcher thread turns into
//! an in-process change callback.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sharingway_primitives::Namespace;

use crate::Document;
use crate::channel::Channel;
use crate::config::Config;
use crate::error::{Error, Result};

/// Base name of the registry's region and sync objects.
const REGISTRY_BASE: &str = "Registry";

/// Lock timeout for registry operations.
const REGISTRY_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Signal wait used by the watcher loop; bounds shutdown latency.
const WATCH_SIGNAL_TIMEOUT: Duration = Duration::from_secs(1);

/// How often a handler-less watcher re-checks for an installed handler.
const HANDLER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Invoked (on the watcher thread) whenever the registry signals a change.
pub type RegistryChangeHandler = Box<dyn Fn() + Send + 'static>;

// ── provider metadata ──────────────────────────────────────────────────────

/// Liveness of a provider as recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderStatus {
    Online,
    #[default]
    Offline,
    Error,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Online => "online",
            ProviderStatus::Offline => "offline",
            ProviderStatus::Error => "error",
        }
    }

    /// Parse a status string; anything unrecognized reads as offline.
    pub fn from_str_lenient(s: &str) -> Self {
        match s {
            "online" => ProviderStatus::Online,
            "error" => ProviderStatus::Error,
            _ => ProviderStatus::Offline,
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ProviderStatus::from_str_lenient(&s))
    }
}

/// One provider's registry record, as stored on the wire.
///
/// Decoding is lenient: every field falls back to its default when absent,
/// matching what mixed-version participants may have written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistryEntry {
    #[serde(default)]
    pub status: ProviderStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub last_update: u64,
    #[serde(default)]
    pub last_heartbeat: u64,
}

/// A registry entry together with its provider name, as returned by listings.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub status: ProviderStatus,
    pub description: String,
    pub capabilities: Vec<String>,
    /// Milliseconds since the Unix epoch of the last entry mutation.
    pub last_update: u64,
    /// Milliseconds since the Unix epoch of the last heartbeat refresh.
    pub last_heartbeat: u64,
}

type RegistryMap = BTreeMap<String, RegistryEntry>;

/// Current wall clock in milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Decode a registry document entry by entry; malformed entries fall back
/// to their lenient defaults rather than poisoning the whole map.
fn decode_registry(doc: &Document) -> RegistryMap {
    let Some(object) = doc.as_object() else {
        return RegistryMap::new();
    };
    object
        .iter()
        .map(|(name, value)| {
            let entry = serde_json::from_value(value.clone()).unwrap_or_default();
            (name.clone(), entry)
        })
        .collect()
}

// ── Registry ───────────────────────────────────────────────────────────────

/// State shared with the watcher thread.
struct RegistryShared {
    channel: Channel,
    running: AtomicBool,
    change_handler: Mutex<Option<RegistryChangeHandler>>,
    debug: bool,
}

/// Handle to the machine-wide provider registry.
///
/// Attaching (`Registry::with_config`) maps the well-known region and sync
/// objects; [`Registry::initialize`] then seeds an empty map if nobody has
/// yet and starts the change watcher. Attach-then-initialize is the same
/// sequence whether this process is the first participant or a latecomer.
pub struct Registry {
    shared: Arc<RegistryShared>,
    /// Watcher thread handle; the mutex also serializes `initialize`.
    watcher: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
    stale_after: Option<Duration>,
}

impl Registry {
    /// Attach to the registry's region and sync objects.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Attach with explicit configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        let ns = Namespace::new(config.global_namespace);
        let channel = Channel::attach(&ns, REGISTRY_BASE, config.default_capacity)?;
        Ok(Self {
            shared: Arc::new(RegistryShared {
                channel,
                running: AtomicBool::new(false),
                change_handler: Mutex::new(None),
                debug: config.debug_logging,
            }),
            watcher: Mutex::new(None),
            initialized: AtomicBool::new(false),
            stale_after: config.stale_after,
        })
    }

    /// Seed the registry document if needed and start the change watcher.
    ///
    /// Safe to race across processes: every participant locks, reads, and
    /// writes an empty map only when no decodable map exists, so first
    /// arrival and latecomers converge on the same state. Idempotent within
    /// a process: a second call is a no-op returning success.
    ///
    /// On lock timeout the handle stays attached in a degraded, read-capable
    /// state and the call fails with [`Error::Unavailable`].
    pub fn initialize(&self) -> Result<()> {
        let mut watcher = lock_unpoisoned(&self.watcher);
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let seeded = {
            let Some(_guard) = self.shared.channel.sync.lock(REGISTRY_LOCK_TIMEOUT) else {
                return Err(Error::Unavailable(
                    "registry lock timed out during initialize".to_string(),
                ));
            };
            let needs_seed = !matches!(self.shared.channel.region.read(), Ok(Some(_)));
            if needs_seed {
                self.shared
                    .channel
                    .region
                    .write(&Document::Object(serde_json::Map::new()))?;
            }
            needs_seed
        };
        if seeded {
            self.shared.channel.sync.pulse();
            if self.shared.debug {
                tracing::debug!(target: "sharingway::registry", "seeded empty registry document");
            }
        }

        if watcher.is_none() {
            self.shared.running.store(true, Ordering::Release);
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name("sharingway-registry-watch".to_string())
                .spawn(move || watch_registry(shared))
                .map_err(|e| Error::unavailable("registry watcher thread", e))?;
            *watcher = Some(handle);
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Create or overwrite the entry for `name`, online with fresh
    /// timestamps. A second registration under a live name overwrites it.
    pub fn register(&self, name: &str, description: &str, capabilities: &[String]) -> Result<()> {
        let entry = RegistryEntry {
            status: ProviderStatus::Online,
            description: description.to_string(),
            capabilities: capabilities.to_vec(),
            last_update: now_ms(),
            last_heartbeat: now_ms(),
        };
        self.mutate(|map| {
            map.insert(name.to_string(), entry);
            Ok(())
        })?;
        if self.shared.debug {
            tracing::debug!(target: "sharingway::registry", provider = name, "registered");
        }
        Ok(())
    }

    /// Set the status of an existing entry, refreshing both timestamps.
    ///
    /// This is also the heartbeat path: a provider republishing data calls
    /// this with `Online` to keep its `last_heartbeat` current.
    pub fn update_status(&self, name: &str, status: ProviderStatus) -> Result<()> {
        let now = now_ms();
        self.mutate(|map| match map.get_mut(name) {
            Some(entry) => {
                entry.status = status;
                entry.last_update = now;
                entry.last_heartbeat = now;
                Ok(())
            }
            None => Err(Error::NotFound(name.to_string())),
        })
    }

    /// Remove the entry for `name`. Removing an absent name succeeds.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.mutate(|map| {
            map.remove(name);
            Ok(())
        })
    }

    /// Snapshot the registry as a list of entries with names.
    ///
    /// Returns an empty list when the lock times out or the document is
    /// unreadable; listing is best-effort by design.
    pub fn list(&self) -> Vec<ProviderInfo> {
        let map = {
            let Some(_guard) = self.shared.channel.sync.lock(REGISTRY_LOCK_TIMEOUT) else {
                return Vec::new();
            };
            match self.shared.channel.region.read() {
                Ok(Some(doc)) => decode_registry(&doc),
                _ => return Vec::new(),
            }
        };

        let stale_floor = self
            .stale_after
            .map(|age| now_ms().saturating_sub(age.as_millis() as u64));

        map.into_iter()
            .map(|(name, entry)| {
                let mut status = entry.status;
                if let Some(floor) = stale_floor {
                    if entry.last_heartbeat < floor {
                        status = ProviderStatus::Offline;
                    }
                }
                ProviderInfo {
                    name,
                    status,
                    description: entry.description,
                    capabilities: entry.capabilities,
                    last_update: entry.last_update,
                    last_heartbeat: entry.last_heartbeat,
                }
            })
            .collect()
    }

    /// Install the change handler invoked on every registry pulse.
    pub fn set_change_handler(&self, handler: RegistryChangeHandler) {
        *lock_unpoisoned(&self.shared.change_handler) = Some(handler);
    }

    /// Remove the change handler.
    pub fn clear_change_handler(&self) {
        *lock_unpoisoned(&self.shared.change_handler) = None;
    }

    /// Stop the watcher and mark the handle uninitialized.
    ///
    /// In-flight change callbacks complete before this returns; none run
    /// afterwards.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = lock_unpoisoned(&self.watcher).take() {
            let _ = handle.join();
        }
        self.initialized.store(false, Ordering::Release);
        if self.shared.debug {
            tracing::debug!(target: "sharingway::registry", "registry handle shut down");
        }
    }

    /// Locked read-modify-write of the registry map; pulses on success.
    ///
    /// An undecodable current document counts as an empty map, so one
    /// corrupt write cannot wedge every future mutation.
    fn mutate(&self, f: impl FnOnce(&mut RegistryMap) -> Result<()>) -> Result<()> {
        {
            let _guard = self.shared.channel.lock(REGISTRY_LOCK_TIMEOUT)?;
            let mut map = match self.shared.channel.region.read() {
                Ok(Some(doc)) => decode_registry(&doc),
                _ => RegistryMap::new(),
            };
            f(&mut map)?;
            let doc = serde_json::to_value(&map).map_err(Error::Encode)?;
            self.shared.channel.region.write(&doc)?;
        }
        self.shared.channel.sync.pulse();
        Ok(())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_registry(shared: Arc<RegistryShared>) {
    while shared.running.load(Ordering::Acquire) {
        // A registry pulse releases one waiter machine-wide. Waiting without
        // a handler installed would consume pulses some other process's
        // handler is parked for, so handler-less watchers only poll.
        if lock_unpoisoned(&shared.change_handler).is_none() {
            std::thread::sleep(HANDLER_POLL_INTERVAL);
            continue;
        }
        if shared.channel.sync.wait_signal(WATCH_SIGNAL_TIMEOUT) {
            let handler = lock_unpoisoned(&shared.change_handler);
            if let Some(handler) = handler.as_ref() {
                handler();
            }
        }
    }
}

/// Lock a mutex, recovering from poisoning; a panicking callback must not
/// take the registry down with it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_strings_roundtrip_and_unknowns_read_offline() {
        assert_eq!(ProviderStatus::Online.as_str(), "online");
        assert_eq!(ProviderStatus::from_str_lenient("online"), ProviderStatus::Online);
        assert_eq!(ProviderStatus::from_str_lenient("error"), ProviderStatus::Error);
        assert_eq!(ProviderStatus::from_str_lenient("offline"), ProviderStatus::Offline);
        assert_eq!(ProviderStatus::from_str_lenient("rebooting"), ProviderStatus::Offline);
    }

    #[test]
    fn entries_decode_leniently() {
        let doc = json!({
            "full": {
                "status": "online",
                "description": "a sensor",
                "capabilities": ["temp", "humidity"],
                "lastUpdate": 123u64,
                "lastHeartbeat": 456u64,
            },
            "sparse": {},
            "odd-status": { "status": "sideways" },
        });

        let map = decode_registry(&doc);
        assert_eq!(map.len(), 3);

        let full = &map["full"];
        assert_eq!(full.status, ProviderStatus::Online);
        assert_eq!(full.description, "a sensor");
        assert_eq!(full.capabilities, vec!["temp", "humidity"]);
        assert_eq!(full.last_update, 123);
        assert_eq!(full.last_heartbeat, 456);

        let sparse = &map["sparse"];
        assert_eq!(sparse.status, ProviderStatus::Offline);
        assert_eq!(sparse.description, "");
        assert!(sparse.capabilities.is_empty());
        assert_eq!(sparse.last_update, 0);

        assert_eq!(map["odd-status"].status, ProviderStatus::Offline);
    }

    #[test]
    fn malformed_entry_does_not_poison_the_map() {
        let doc = json!({
            "good": { "status": "online" },
            "bad": { "capabilities": "not-a-list" },
        });
        let map = decode_registry(&doc);
        assert_eq!(map["good"].status, ProviderStatus::Online);
        // Falls back to defaults instead of dropping the whole document.
        assert_eq!(map["bad"].status, ProviderStatus::Offline);
    }

    #[test]
    fn non_object_documents_decode_as_empty() {
        assert!(decode_registry(&json!([1, 2, 3])).is_empty());
        assert!(decode_registry(&json!("text")).is_empty());
        assert!(decode_registry(&json!(null)).is_empty());
    }

    #[test]
    fn entries_encode_with_wire_field_names() {
        let mut map = RegistryMap::new();
        map.insert(
            "s1".to_string(),
            RegistryEntry {
                status: ProviderStatus::Online,
                description: "d".to_string(),
                capabilities: vec!["c".to_string()],
                last_update: 1,
                last_heartbeat: 2,
            },
        );
        let doc = serde_json::to_value(&map).expect("encode");
        assert_eq!(
            doc,
            json!({
                "s1": {
                    "status": "online",
                    "description": "d",
                    "capabilities": ["c"],
                    "lastUpdate": 1,
                    "lastHeartbeat": 2,
                }
            })
        );
    }
}
