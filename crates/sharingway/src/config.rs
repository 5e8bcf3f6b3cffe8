//! Process-wide configuration knobs.

use std::time::Duration;

pub use sharingway_primitives::NamespacePolicy;

/// Default capacity of a shared region: 1 MiB.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Configuration shared by providers, subscribers, and registry handles.
///
/// A `Config` is captured by value at construction; changing a config after
/// handing it to an owner has no effect on that owner.
#[derive(Debug, Clone)]
pub struct Config {
    /// Emit diagnostic `tracing` events tagged per component. Consulted only
    /// on cold paths (attach, shutdown, lock timeouts), never per publish or
    /// per read.
    pub debug_logging: bool,
    /// Region capacity used when no explicit capacity is given.
    pub default_capacity: usize,
    /// Whether named objects live in the cross-session global namespace.
    pub global_namespace: NamespacePolicy,
    /// When set, registry listings report entries whose last heartbeat is
    /// older than this as offline. The stored registry document is never
    /// rewritten by listing.
    pub stale_after: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_logging: false,
            default_capacity: DEFAULT_CAPACITY,
            global_namespace: NamespacePolicy::Auto,
            stale_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(!config.debug_logging);
        assert_eq!(config.default_capacity, 1024 * 1024);
        assert_eq!(config.global_namespace, NamespacePolicy::Auto);
        assert!(config.stale_after.is_none());
    }
}
