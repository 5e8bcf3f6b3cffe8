//! Local, single-host publish/subscribe over named shared memory.
//!
//! Independently started processes exchange JSON-shaped snapshot documents:
//! a [`Provider`] writes the most recent value into its own named region and
//! nudges watchers through a named signal; any number of [`Subscriber`]s
//! decode the snapshot and surface it through callbacks. A machine-wide
//! [`Registry`] channel tracks which providers exist, what they offer, and
//! whether they are still alive.
//!
//! ```text
//!  Provider "Sensor1"                     Subscriber
//!  ┌──────────────────┐   lock+write   ┌─────────────────────┐
//!  │ publish(doc) ────┼──► region ─────┼──► watch thread     │
//!  │                  │     pulse ─────┼──► data handler     │
//!  └───────┬──────────┘                └──────────┬──────────┘
//!          │ register / heartbeat                 │ list / status handler
//!          ▼                                      ▼
//!       ┌──────────────────────────────────────────────┐
//!       │        Registry (Sharingway.Registry)        │
//!       └──────────────────────────────────────────────┘
//! ```
//!
//! Each channel carries exactly one current snapshot, overwritten in place;
//! there is no history and no queueing. A slow subscriber misses
//! intermediate snapshots and observes the latest one instead.
//!
//! # Publishing
//!
//! ```ignore
//! use serde_json::json;
//! use sharingway::Provider;
//!
//! let mut provider = Provider::new("Sensor1", "demo sensor", &[])?;
//! provider.initialize(None)?;
//! provider.publish(&json!({ "counter": 1 }))?;
//! ```
//!
//! # Subscribing
//!
//! ```ignore
//! use sharingway::Subscriber;
//!
//! let mut subscriber = Subscriber::new();
//! subscriber.initialize()?;
//! subscriber.set_data_handler(Box::new(|provider, doc| {
//!     println!("{provider}: {doc}");
//! }));
//! subscriber.subscribe("Sensor1")?;
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod provider;
pub mod registry;
pub mod subscriber;

/// A free-form structured document, the unit of publication.
pub type Document = serde_json::Value;

pub use channel::SharedRegion;
pub use config::{Config, DEFAULT_CAPACITY, NamespacePolicy};
pub use sharingway_primitives::Namespace;
pub use error::{DecodeError, Error, Result};
pub use provider::Provider;
pub use registry::{ProviderInfo, ProviderStatus, Registry, RegistryChangeHandler};
pub use subscriber::{DataHandler, StatusHandler, Subscriber};
