//! Process-group keyed session registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::proc;
use crate::session::Session;

/// The process group that soaks up unattributable traffic (daemons, the
/// mount driver itself). Registered from construction to teardown.
pub const BOOTSTRAP_PGID: i32 = 1;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A close was requested for a process group that was never registered.
    #[error("no active session for process group {0}")]
    UnknownPgid(i32),
}

/// Maps process groups to their attribution sessions.
///
/// The lock is leaf-level: it is never held across filesystem forwarding,
/// `/proc` reads, or a session's own mutex.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    last_id: u64,
    by_pgid: HashMap<i32, Arc<Session>>,
}

impl SessionRegistry {
    /// Creates a registry with the bootstrap session already present.
    pub fn new() -> Self {
        let registry = Self {
            inner: Mutex::new(Inner {
                last_id: 0,
                by_pgid: HashMap::new(),
            }),
        };
        registry.register(BOOTSTRAP_PGID);
        registry
    }

    /// Create-or-return the session for `pgid`. Idempotent.
    pub fn register(&self, pgid: i32) -> Arc<Session> {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.by_pgid.get(&pgid) {
            return session.clone();
        }
        inner.last_id += 1;
        let session = Arc::new(Session::new(inner.last_id.to_string()));
        debug!(pgid, id = session.id(), "registered session");
        inner.by_pgid.insert(pgid, session.clone());
        session
    }

    /// Returns the session for `pgid`, or for its nearest registered
    /// ancestor in the process tree.
    ///
    /// Each `/proc` read happens with the registry lock released. The walk
    /// bottoms out at the bootstrap session, so resolution never fails.
    pub fn resolve(&self, pgid: i32) -> Arc<Session> {
        let mut pid = pgid;
        loop {
            if let Some(session) = self.get(pid) {
                return session;
            }
            if pid <= BOOTSTRAP_PGID {
                return self.register(BOOTSTRAP_PGID);
            }
            pid = proc::parent_pid(pid);
        }
    }

    /// Atomically removes and returns the session for `pgid`.
    pub fn remove(&self, pgid: i32) -> Result<Arc<Session>, RegistryError> {
        self.inner
            .lock()
            .by_pgid
            .remove(&pgid)
            .ok_or(RegistryError::UnknownPgid(pgid))
    }

    /// Number of live sessions (bootstrap included).
    pub fn len(&self) -> usize {
        self.inner.lock().by_pgid.len()
    }

    /// True when no sessions exist at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, pgid: i32) -> Option<Arc<Session>> {
        self.inner.lock().by_pgid.get(&pgid).cloned()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpClass;

    #[test]
    fn test_bootstrap_registered() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.len(), 1);
        let session = registry.resolve(BOOTSTRAP_PGID);
        assert_eq!(session.id(), "1");
    }

    #[test]
    fn test_register_idempotent() {
        let registry = SessionRegistry::new();
        let a = registry.register(4242);
        let b = registry.register(4242);
        assert_eq!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ids_monotonic() {
        let registry = SessionRegistry::new();
        let a = registry.register(100);
        let b = registry.register(200);
        assert_eq!(a.id(), "2");
        assert_eq!(b.id(), "3");
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_bootstrap() {
        let registry = SessionRegistry::new();
        // A PID far beyond pid_max has no /proc entry; the walk degrades to
        // the bootstrap session.
        let session = registry.resolve(i32::MAX);
        assert_eq!(session.id(), "1");
    }

    #[test]
    fn test_resolve_own_ancestry() {
        let registry = SessionRegistry::new();
        let own_pid = std::process::id() as i32;
        let registered = registry.register(own_pid);
        // A fictitious child of this process would resolve through the
        // parent walk; the exact hit resolves directly.
        let resolved = registry.resolve(own_pid);
        assert_eq!(registered.id(), resolved.id());
    }

    #[test]
    fn test_remove_returns_contents() {
        let registry = SessionRegistry::new();
        let session = registry.register(777);
        session.record("out.txt", OpClass::Create);
        let removed = registry.remove(777).unwrap();
        assert_eq!(removed.collect().create, vec!["out.txt"]);
        assert!(matches!(
            registry.remove(777),
            Err(RegistryError::UnknownPgid(777))
        ));
    }

    #[test]
    fn test_recording_after_remove_is_invisible() {
        // A straggler callback holding the Arc may still record; the session
        // is simply no longer reachable from the registry.
        let registry = SessionRegistry::new();
        let session = registry.register(888);
        let removed = registry.remove(888).unwrap();
        removed.record("late", OpClass::Read);
        assert_eq!(registry.len(), 1);
        assert_eq!(session.collect().read, vec!["late"]);
    }
}
