//! Versioned memoization caches.
//!
//! Caches form a tree. Every node applies a [`CachePolicy`] and defers to its
//! parent; the root is a flat [`RootStore`] shared by one scheduler, so an
//! entry written through any policy node is visible under all of them.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::identity::CallIdentity;
use crate::core::result::{CallResult, Version};

/// When a stored result stops being valid for a requested version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never stores; every call misses.
    NoOp,
    /// Valid until the next tick ("per-tick").
    InvalidateAll,
    /// Evicted when a strictly newer version is requested.
    InvalidateOlder,
    /// Evicted when any other version is requested.
    InvalidateDifferent,
    /// Never evicted by lookups or ticks ("forever").
    NoInvalidation,
}

/// Handle to a cache node registered with a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cache(pub(crate) usize);

impl Cache {
    /// Memoization disabled.
    pub const NO_OP: Self = Self(0);
    /// Results live until the next tick.
    pub const PER_TICK: Self = Self(1);
    /// Results live until a newer version is requested.
    pub const INVALIDATE_OLDER: Self = Self(2);
    /// Results live for the process lifetime.
    pub const FOREVER: Self = Self(3);
    /// Results live while callers keep requesting the same version.
    pub const INVALIDATE_DIFFERENT: Self = Self(4);

    pub(crate) const BUILT_IN: [(&'static str, CachePolicy); 5] = [
        ("no_op", CachePolicy::NoOp),
        ("per_tick", CachePolicy::InvalidateAll),
        ("invalidate_older", CachePolicy::InvalidateOlder),
        ("forever", CachePolicy::NoInvalidation),
        ("invalidate_different", CachePolicy::InvalidateDifferent),
    ];

    /// Position of the node in its scheduler's registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Type-erased view of a stored `CallResult`.
trait StoredResult: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn is_abandoned(&self) -> bool;
}

impl<R: Clone + Send + 'static> StoredResult for CallResult<R> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_abandoned(&self) -> bool {
        Self::is_abandoned(self)
    }
}

/// A stored result, type-erased so one store can hold every return type.
#[derive(Clone)]
pub struct CacheEntry {
    identity: CallIdentity,
    version: Version,
    result: Arc<dyn StoredResult>,
}

impl CacheEntry {
    /// Wrap a result for storage.
    pub fn new<R: Clone + Send + 'static>(result: &CallResult<R>) -> Self {
        Self {
            identity: result.identity(),
            version: result.version(),
            result: Arc::new(result.clone()),
        }
    }

    /// Identity the entry is keyed by.
    #[must_use]
    pub const fn identity(&self) -> CallIdentity {
        self.identity
    }

    /// Version the result was produced for.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Whether the stored call was dropped before it ran. Such entries must never be served.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.result.is_abandoned()
    }

    /// Recover the typed result. A type mismatch is reported and treated as a miss.
    pub fn downcast<R: Clone + Send + 'static>(&self) -> Option<CallResult<R>> {
        let typed = self.result.as_any().downcast_ref::<CallResult<R>>().cloned();
        if typed.is_none() {
            warn!(
                call = %self.identity,
                expected = std::any::type_name::<R>(),
                "cached result has a different type, ignoring it"
            );
        }
        typed
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("identity", &self.identity)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// One level of the cache chain.
pub trait CacheLayer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// A live entry for `identity` that is valid for `version`.
    fn lookup(&self, identity: &CallIdentity, version: Version) -> Option<CacheEntry>;

    /// Install `entry`, replacing any live entry with the same identity.
    fn store(&self, entry: CacheEntry);

    /// Drop the entry for `identity`.
    fn evict(&self, identity: &CallIdentity);

    /// Drop the entry for `identity` if its call was abandoned, whatever the policy.
    fn discard_abandoned(&self, identity: &CallIdentity);

    /// Periodic sweep applied once per tick.
    fn invalidate_all(&self);

    /// Drop everything this layer holds, regardless of policy.
    fn reset(&self);

    /// Number of entries held directly by this layer.
    fn len(&self) -> usize;

    /// Whether this layer holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat thread-safe map at the root of a scheduler's cache tree.
#[derive(Default)]
pub struct RootStore {
    entries: RwLock<FxHashMap<CallIdentity, CacheEntry>>,
}

impl RootStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheLayer for RootStore {
    fn name(&self) -> &str {
        "root"
    }

    fn lookup(&self, identity: &CallIdentity, _version: Version) -> Option<CacheEntry> {
        self.entries.read().get(identity).cloned()
    }

    fn store(&self, entry: CacheEntry) {
        self.entries.write().insert(entry.identity, entry);
    }

    fn evict(&self, identity: &CallIdentity) {
        self.entries.write().remove(identity);
    }

    fn discard_abandoned(&self, identity: &CallIdentity) {
        let mut entries = self.entries.write();
        if entries.get(identity).is_some_and(CacheEntry::is_abandoned) {
            entries.remove(identity);
            debug!(call = %identity, "discarded abandoned entry");
        }
    }

    fn invalidate_all(&self) {}

    fn reset(&self) {
        self.entries.write().clear();
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// A policy node in the cache tree.
pub struct CacheNode {
    name: String,
    policy: CachePolicy,
    parent: Arc<dyn CacheLayer>,
    /// Only used by `InvalidateAll`, which must know its own keys to sweep them.
    local: RwLock<FxHashMap<CallIdentity, CacheEntry>>,
}

impl CacheNode {
    /// Node applying `policy` on top of `parent`.
    pub fn new(name: impl Into<String>, policy: CachePolicy, parent: Arc<dyn CacheLayer>) -> Self {
        Self {
            name: name.into(),
            policy,
            parent,
            local: RwLock::new(FxHashMap::default()),
        }
    }

    /// The node's policy.
    #[must_use]
    pub const fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn lookup_versioned(
        &self,
        identity: &CallIdentity,
        version: Version,
        stale: impl Fn(Version, Version) -> bool,
    ) -> Option<CacheEntry> {
        let entry = self.parent.lookup(identity, version)?;
        if stale(entry.version, version) {
            debug!(
                cache = %self.name,
                call = %identity,
                stored = entry.version,
                requested = version,
                "evicting stale entry"
            );
            self.parent.evict(identity);
            return None;
        }
        Some(entry)
    }
}

impl CacheLayer for CacheNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, identity: &CallIdentity, version: Version) -> Option<CacheEntry> {
        match self.policy {
            CachePolicy::NoOp => None,
            CachePolicy::InvalidateAll => {
                let local = self.local.read().get(identity).cloned();
                local.or_else(|| self.parent.lookup(identity, version))
            }
            CachePolicy::InvalidateOlder => {
                self.lookup_versioned(identity, version, |stored, requested| stored < requested)
            }
            CachePolicy::InvalidateDifferent => {
                self.lookup_versioned(identity, version, |stored, requested| stored != requested)
            }
            CachePolicy::NoInvalidation => self.parent.lookup(identity, version),
        }
    }

    fn store(&self, entry: CacheEntry) {
        match self.policy {
            CachePolicy::NoOp => {}
            CachePolicy::InvalidateAll => {
                self.local.write().insert(entry.identity, entry.clone());
                self.parent.store(entry);
            }
            _ => self.parent.store(entry),
        }
    }

    fn evict(&self, identity: &CallIdentity) {
        match self.policy {
            CachePolicy::NoOp | CachePolicy::NoInvalidation => {}
            CachePolicy::InvalidateAll => {
                self.local.write().remove(identity);
                self.parent.evict(identity);
            }
            CachePolicy::InvalidateOlder | CachePolicy::InvalidateDifferent => {
                self.parent.evict(identity);
            }
        }
    }

    fn discard_abandoned(&self, identity: &CallIdentity) {
        {
            let mut local = self.local.write();
            if local.get(identity).is_some_and(CacheEntry::is_abandoned) {
                local.remove(identity);
            }
        }
        self.parent.discard_abandoned(identity);
    }

    fn invalidate_all(&self) {
        if self.policy != CachePolicy::InvalidateAll {
            return;
        }
        let swept: Vec<CallIdentity> = self.local.write().drain().map(|(key, _)| key).collect();
        for identity in &swept {
            self.parent.evict(identity);
        }
        if !swept.is_empty() {
            debug!(cache = %self.name, evicted = swept.len(), "per-tick cache swept");
        }
    }

    fn reset(&self) {
        self.local.write().clear();
    }

    fn len(&self) -> usize {
        match self.policy {
            CachePolicy::NoOp => 0,
            CachePolicy::InvalidateAll => self.local.read().len(),
            _ => self.parent.len(),
        }
    }
}
