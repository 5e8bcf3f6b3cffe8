//! The publishing side of a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sharingway_primitives::Namespace;

use crate::Document;
use crate::channel::Channel;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::{ProviderStatus, Registry};

/// Lock timeout for publishing a snapshot.
const PUBLISH_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort lock timeout while clearing the channel during shutdown.
const SHUTDOWN_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// A named publisher of most-recent-value snapshots.
///
/// Construction registers the provider in the shared registry;
/// [`Provider::initialize`] then attaches the provider's own channel. The
/// provider exclusively owns the writer role of that channel and its own
/// registry entry.
///
/// Dropping a provider performs the same shutdown sequence as
/// [`Provider::shutdown`].
pub struct Provider {
    name: String,
    registry: Registry,
    channel: Option<Channel>,
    online: AtomicBool,
    namespace: Namespace,
    default_capacity: usize,
    debug: bool,
}

impl Provider {
    /// Register a provider named `name` in the shared registry.
    ///
    /// The registry entry is created immediately (status online, fresh
    /// timestamps); a previous entry under the same name, live or not, is
    /// overwritten. Failure here is fatal: the provider is unusable and must
    /// be recreated.
    pub fn new(name: &str, description: &str, capabilities: &[String]) -> Result<Self> {
        Self::with_config(name, description, capabilities, Config::default())
    }

    /// Register with explicit configuration.
    pub fn with_config(
        name: &str,
        description: &str,
        capabilities: &[String],
        config: Config,
    ) -> Result<Self> {
        let registry = Registry::with_config(config.clone())?;
        registry.initialize()?;
        registry.register(name, description, capabilities)?;

        Ok(Self {
            name: name.to_string(),
            registry,
            channel: None,
            online: AtomicBool::new(false),
            namespace: Namespace::new(config.global_namespace),
            default_capacity: config.default_capacity,
            debug: config.debug_logging,
        })
    }

    /// Attach the provider's channel and go online.
    ///
    /// `capacity` sets the region size on first creation; `None` uses the
    /// configured default (1 MiB). If the region already exists its original
    /// capacity wins.
    pub fn initialize(&mut self, capacity: Option<usize>) -> Result<()> {
        let capacity = capacity.unwrap_or(self.default_capacity);
        let channel = Channel::attach(&self.namespace, &self.name, capacity)?;
        self.channel = Some(channel);
        self.online.store(true, Ordering::Release);

        // Best effort: the entry exists (we registered it); a lock timeout
        // here only delays the online status until the first publish.
        if let Err(err) = self
            .registry
            .update_status(&self.name, ProviderStatus::Online)
        {
            if self.debug {
                tracing::debug!(
                    target: "sharingway::provider",
                    provider = %self.name,
                    error = %err,
                    "status refresh after initialize skipped"
                );
            }
        }

        if self.debug {
            tracing::debug!(
                target: "sharingway::provider",
                provider = %self.name,
                capacity,
                "channel attached, provider online"
            );
        }
        Ok(())
    }

    /// Publish a snapshot, replacing the channel's current document.
    ///
    /// On success the channel signal is pulsed and the registry heartbeat
    /// refreshed; a heartbeat skipped because the registry lock was busy is
    /// not an error; the data was delivered. Failures leave the previous
    /// snapshot intact and are reported once, never retried internally.
    pub fn publish(&self, doc: &Document) -> Result<()> {
        if !self.online.load(Ordering::Acquire) {
            return Err(Error::NotInitialized);
        }
        let channel = self.channel.as_ref().ok_or(Error::NotInitialized)?;

        channel.publish(doc, PUBLISH_LOCK_TIMEOUT)?;

        if let Err(err) = self
            .registry
            .update_status(&self.name, ProviderStatus::Online)
        {
            if self.debug {
                tracing::debug!(
                    target: "sharingway::provider",
                    provider = %self.name,
                    error = %err,
                    "heartbeat skipped"
                );
            }
        }
        Ok(())
    }

    /// Whether the channel is attached and publishable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// The provider's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Go offline: clear the channel, mark the registry entry offline, and
    /// detach.
    ///
    /// The channel is overwritten with an empty object (the sentinel
    /// subscribers read as "producer gone") and pulsed so watchers wake.
    /// The registry entry is deliberately kept (marked offline) so late
    /// subscribers can still see the provider existed. Idempotent.
    pub fn shutdown(&mut self) {
        if self.online.swap(false, Ordering::AcqRel) {
            if let Some(channel) = &self.channel {
                let cleared = match channel.lock(SHUTDOWN_LOCK_TIMEOUT) {
                    Ok(_guard) => channel
                        .region
                        .write(&Document::Object(serde_json::Map::new()))
                        .is_ok(),
                    Err(_) => false,
                };
                if cleared {
                    channel.sync.pulse();
                }
            }
            if let Err(err) = self
                .registry
                .update_status(&self.name, ProviderStatus::Offline)
            {
                if self.debug {
                    tracing::debug!(
                        target: "sharingway::provider",
                        provider = %self.name,
                        error = %err,
                        "offline status update skipped"
                    );
                }
            }
            if self.debug {
                tracing::debug!(
                    target: "sharingway::provider",
                    provider = %self.name,
                    "provider shut down"
                );
            }
        }
        self.channel = None;
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.shutdown();
    }
}
