//! Namespace resolution for named shared objects.
//!
//! Every Sharingway object (region, lock, signal) is addressed by a printable
//! name such as `Sharingway.Registry` or `Sharingway.Sensor1.Lock`. This
//! module decides where such a name lives on the local machine:
//!
//! - On Windows, names map to kernel object names, optionally qualified with
//!   the cross-session `Global\` prefix.
//! - On Unix, names map to files in a shared directory: the machine-wide
//!   shared-memory directory (`/dev/shm` on Linux) or the session runtime
//!   directory (`$XDG_RUNTIME_DIR`, falling back to the temp directory).
//!
//! Attachment always probes for an existing object across every candidate
//! namespace before creating a new one, so two participants that resolved to
//! different namespaces still rendezvous on the first-created object.

/// Controls use of the cross-session global namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamespacePolicy {
    /// Prefer the global namespace, fall back to the session namespace when
    /// the OS denies it.
    #[default]
    Auto,
    /// Global namespace only; attachment fails if the OS denies it.
    Force,
    /// Session namespace only.
    Disable,
}

/// A resolved namespace policy, used to place and find named objects.
#[derive(Debug, Clone, Copy)]
pub struct Namespace {
    policy: NamespacePolicy,
}

impl Namespace {
    pub fn new(policy: NamespacePolicy) -> Self {
        Self { policy }
    }

    #[inline]
    pub fn policy(&self) -> NamespacePolicy {
        self.policy
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(NamespacePolicy::Auto)
    }
}

// ── object names ───────────────────────────────────────────────────────────

/// Name of the region object for a base name: `Sharingway.<base>`.
///
/// The registry region is `region_object_name("Registry")`; a provider's
/// channel region is `region_object_name(provider_name)`.
pub fn region_object_name(base: &str) -> String {
    format!("Sharingway.{base}")
}

/// Name of the lock object for a base name: `Sharingway.<base>.Lock`.
pub fn lock_object_name(base: &str) -> String {
    format!("Sharingway.{base}.Lock")
}

/// Name of the signal object for a base name: `Sharingway.<base>.Signal`.
pub fn signal_object_name(base: &str) -> String {
    format!("Sharingway.{base}.Signal")
}

// ── unix: directory search order ───────────────────────────────────────────

#[cfg(unix)]
mod unix_dirs {
    use std::path::PathBuf;

    use super::{Namespace, NamespacePolicy};

    /// Machine-wide shared directory: `/dev/shm` where it exists (Linux),
    /// otherwise the system temp directory.
    fn global_dir() -> PathBuf {
        let shm = PathBuf::from("/dev/shm");
        if shm.is_dir() {
            shm
        } else {
            std::env::temp_dir()
        }
    }

    /// Session-scoped directory: `$XDG_RUNTIME_DIR`, otherwise temp.
    fn session_dir() -> PathBuf {
        match std::env::var_os("XDG_RUNTIME_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir(),
        }
    }

    impl Namespace {
        /// Candidate directories in probe order.
        pub fn search_dirs(&self) -> Vec<PathBuf> {
            let mut dirs = match self.policy() {
                NamespacePolicy::Auto => vec![global_dir(), session_dir()],
                NamespacePolicy::Force => vec![global_dir()],
                NamespacePolicy::Disable => vec![session_dir()],
            };
            dirs.dedup();
            dirs
        }

        /// Candidate paths for a named object, in probe order.
        pub fn object_paths(&self, object: &str) -> Vec<PathBuf> {
            self.search_dirs()
                .into_iter()
                .map(|dir| dir.join(object))
                .collect()
        }
    }
}

// ── windows: qualified kernel object names ─────────────────────────────────

#[cfg(windows)]
mod windows_names {
    use super::{Namespace, NamespacePolicy};

    impl Namespace {
        /// Candidate kernel object names, `Global\`-qualified first where
        /// the policy permits it.
        pub fn qualified_names(&self, object: &str) -> Vec<String> {
            match self.policy() {
                NamespacePolicy::Auto => {
                    vec![format!("Global\\{object}"), object.to_string()]
                }
                NamespacePolicy::Force => vec![format!("Global\\{object}")],
                NamespacePolicy::Disable => vec![object.to_string()],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_follow_convention() {
        assert_eq!(region_object_name("Registry"), "Sharingway.Registry");
        assert_eq!(region_object_name("Sensor1"), "Sharingway.Sensor1");
        assert_eq!(lock_object_name("Sensor1"), "Sharingway.Sensor1.Lock");
        assert_eq!(signal_object_name("Registry"), "Sharingway.Registry.Signal");
    }

    #[cfg(unix)]
    #[test]
    fn search_order_respects_policy() {
        let auto = Namespace::new(NamespacePolicy::Auto);
        assert!(!auto.search_dirs().is_empty());

        let force = Namespace::new(NamespacePolicy::Force);
        assert_eq!(force.search_dirs().len(), 1);

        let disable = Namespace::new(NamespacePolicy::Disable);
        assert_eq!(disable.search_dirs().len(), 1);
    }
}
