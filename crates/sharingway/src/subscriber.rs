//! The consuming side: subscriptions, watch threads, and callbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use sharingway_primitives::Namespace;

use crate::Document;
use crate::channel::Channel;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::{ProviderInfo, ProviderStatus, Registry, lock_unpoisoned};

/// Signal wait per watch-loop round; bounds unsubscribe/shutdown latency.
const WATCH_SIGNAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Lock timeout for reading a snapshot after a pulse. A miss is not an
/// error; the next pulse delivers the newer snapshot anyway.
const WATCH_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Invoked with `(provider_name, document)` for each observed snapshot.
pub type DataHandler = Box<dyn Fn(&str, &Document) + Send + 'static>;

/// Invoked with `(provider_name, status)` on registry changes.
pub type StatusHandler = Box<dyn Fn(&str, ProviderStatus) + Send + 'static>;

/// Both callback slots, guarded by the single callback mutex.
#[derive(Default)]
struct CallbackSlots {
    data: Option<DataHandler>,
    status: Option<StatusHandler>,
}

/// One live subscription: its channel, its stop flag, its watch thread.
struct Subscription {
    watching: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// A consumer of provider snapshots and registry changes.
///
/// After [`Subscriber::initialize`], each [`Subscriber::subscribe`] attaches
/// one provider's channel and runs a watch thread that turns channel pulses
/// into data-handler invocations. Registry pulses arrive through the shared
/// registry watcher and are reported entry by entry to the status handler.
///
/// Handlers run on watcher threads while the callback mutex is held; they
/// must not block for long and must not call back into this subscriber.
pub struct Subscriber {
    registry: Option<Arc<Registry>>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    callbacks: Arc<Mutex<CallbackSlots>>,
    running: Arc<AtomicBool>,
    namespace: Namespace,
    default_capacity: usize,
    debug: bool,
    config: Config,
}

impl Subscriber {
    /// A subscriber with default configuration. Call
    /// [`Subscriber::initialize`] before subscribing.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A subscriber with explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            registry: None,
            subscriptions: Mutex::new(HashMap::new()),
            callbacks: Arc::new(Mutex::new(CallbackSlots::default())),
            running: Arc::new(AtomicBool::new(false)),
            namespace: Namespace::new(config.global_namespace),
            default_capacity: config.default_capacity,
            debug: config.debug_logging,
            config,
        }
    }

    /// Attach the shared registry and start observing provider changes.
    ///
    /// Idempotent: a second call on a live subscriber is a no-op success.
    pub fn initialize(&mut self) -> Result<()> {
        if self.registry.is_some() {
            return Ok(());
        }

        let registry = Arc::new(Registry::with_config(self.config.clone())?);
        registry.initialize()?;

        // The registry must not own the subscriber (callbacks flow the other
        // way), so the change handler captures only a weak registry handle
        // plus the shared callback and running state.
        let callbacks = Arc::clone(&self.callbacks);
        let running = Arc::clone(&self.running);
        let registry_weak = Arc::downgrade(&registry);
        registry.set_change_handler(Box::new(move || {
            if !running.load(Ordering::Acquire) {
                return;
            }
            let Some(registry) = registry_weak.upgrade() else {
                return;
            };
            let providers = registry.list();
            let slots = lock_unpoisoned(&callbacks);
            if let Some(handler) = &slots.status {
                for provider in &providers {
                    handler(&provider.name, provider.status);
                }
            }
        }));

        self.running.store(true, Ordering::Release);
        self.registry = Some(registry);
        if self.debug {
            tracing::debug!(target: "sharingway::subscriber", "subscriber initialized");
        }
        Ok(())
    }

    /// Subscribe to `provider`'s channel and start watching it.
    ///
    /// Idempotent by name: subscribing twice is a single subscription and
    /// returns success. Attachment succeeding does not mean the provider is
    /// online; the channel may exist without a publisher, in which case the
    /// watch thread simply never sees a document.
    pub fn subscribe(&self, provider: &str) -> Result<()> {
        if self.registry.is_none() {
            return Err(Error::NotInitialized);
        }

        let mut subs = lock_unpoisoned(&self.subscriptions);
        if subs.contains_key(provider) {
            return Ok(());
        }

        let channel = Arc::new(Channel::attach(
            &self.namespace,
            provider,
            self.default_capacity,
        )?);

        let watching = Arc::new(AtomicBool::new(true));
        let thread = {
            let channel = Arc::clone(&channel);
            let watching = Arc::clone(&watching);
            let running = Arc::clone(&self.running);
            let callbacks = Arc::clone(&self.callbacks);
            let name = provider.to_string();
            std::thread::Builder::new()
                .name(format!("sharingway-watch-{provider}"))
                .spawn(move || watch_provider(&name, &channel, &watching, &running, &callbacks))
                .map_err(|e| Error::unavailable("subscription watch thread", e))?
        };

        subs.insert(
            provider.to_string(),
            Subscription { watching, thread },
        );
        if self.debug {
            tracing::debug!(target: "sharingway::subscriber", provider, "subscribed");
        }
        Ok(())
    }

    /// Stop watching `provider` and detach its channel.
    pub fn unsubscribe(&self, provider: &str) -> Result<()> {
        let subscription = {
            let mut subs = lock_unpoisoned(&self.subscriptions);
            subs.remove(provider)
                .ok_or_else(|| Error::NotFound(provider.to_string()))?
        };
        subscription.watching.store(false, Ordering::Release);
        let _ = subscription.thread.join();
        if self.debug {
            tracing::debug!(target: "sharingway::subscriber", provider, "unsubscribed");
        }
        Ok(())
    }

    /// Names of the current subscriptions.
    pub fn subscriptions(&self) -> Vec<String> {
        let subs = lock_unpoisoned(&self.subscriptions);
        let mut names: Vec<String> = subs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of the registry's provider entries.
    ///
    /// Works before `initialize` by attaching a throwaway registry handle;
    /// returns an empty list when the registry is unreachable.
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        match &self.registry {
            Some(registry) => registry.list(),
            None => match Registry::with_config(self.config.clone()) {
                Ok(registry) => registry.list(),
                Err(_) => Vec::new(),
            },
        }
    }

    /// Install the data handler. Replaces any previous one.
    pub fn set_data_handler(&self, handler: DataHandler) {
        lock_unpoisoned(&self.callbacks).data = Some(handler);
    }

    /// Install the status handler. Replaces any previous one.
    pub fn set_status_handler(&self, handler: StatusHandler) {
        lock_unpoisoned(&self.callbacks).status = Some(handler);
    }

    /// Stop all watch threads, detach everything, and silence callbacks.
    ///
    /// Joins every watcher, so in-flight callbacks finish before this
    /// returns and none are invoked afterwards. Idempotent.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);

        let drained: Vec<(String, Subscription)> = {
            let mut subs = lock_unpoisoned(&self.subscriptions);
            subs.drain().collect()
        };
        for (_, subscription) in drained {
            subscription.watching.store(false, Ordering::Release);
            let _ = subscription.thread.join();
        }

        if let Some(registry) = self.registry.take() {
            // Deregister before dropping: the handler holds clones of our
            // internals and must not fire once the subscriber is gone.
            registry.clear_change_handler();
            registry.shutdown();
        }
        if self.debug {
            tracing::debug!(target: "sharingway::subscriber", "subscriber shut down");
        }
    }
}

impl Default for Subscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One subscription's watch loop.
///
/// Wait for a pulse, take the channel lock, decode, deliver. Decode errors
/// are swallowed: a half-written or corrupt snapshot becomes visible again
/// on the next pulse. The bounded signal wait keeps stop latency within one
/// round.
fn watch_provider(
    name: &str,
    channel: &Channel,
    watching: &AtomicBool,
    running: &AtomicBool,
    callbacks: &Mutex<CallbackSlots>,
) {
    while watching.load(Ordering::Acquire) && running.load(Ordering::Acquire) {
        if !channel.sync.wait_signal(WATCH_SIGNAL_TIMEOUT) {
            continue;
        }
        let doc = match channel.read_locked(WATCH_LOCK_TIMEOUT) {
            Ok(Some(doc)) => doc,
            Ok(None) | Err(_) => continue,
        };
        let slots = lock_unpoisoned(callbacks);
        if let Some(handler) = &slots.data {
            handler(name, &doc);
        }
    }
}
