//! Host object to interpreter instance association.
//!
//! The table is keyed by host identity and holds only a `Weak` reference to
//! the host object, so wrapping never extends a host object's lifetime.

use std::sync::{Arc, Weak};

use ahash::AHashMap;

use crate::{
    error::BridgeResult,
    heap::{HeapData, HeapId},
    host::{HostIdentity, HostObject, HostRef},
    session::Session,
    types::{HostLink, Instance},
    value::Value,
};

/// Handle to the interpreter-side instance standing in for a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyHandle(HeapId);

impl ProxyHandle {
    #[must_use]
    pub fn value(self) -> Value {
        Value::Ref(self.0)
    }
}

impl From<ProxyHandle> for Value {
    fn from(handle: ProxyHandle) -> Self {
        handle.value()
    }
}

#[derive(Debug)]
struct ProxyEntry {
    host: Weak<dyn HostObject>,
    instance: HeapId,
}

#[derive(Debug, Default)]
pub(crate) struct InstanceProxies {
    entries: AHashMap<HostIdentity, ProxyEntry>,
}

impl InstanceProxies {
    /// The instance associated with a host object that is still alive.
    pub fn lookup(&self, identity: HostIdentity) -> Option<HeapId> {
        self.entries
            .get(&identity)
            .filter(|entry| entry.host.strong_count() > 0)
            .map(|entry| entry.instance)
    }

    /// Associates `host` with `instance`, replacing any stale entry.
    pub fn associate(&mut self, host: &HostRef, instance: HeapId) {
        self.entries.insert(
            HostIdentity::of(host),
            ProxyEntry {
                host: Arc::downgrade(host),
                instance,
            },
        );
    }

    /// Drops entries whose host object no longer exists.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.host.strong_count() > 0);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Session {
    /// Returns the proxy for `host`, creating it on first use.
    ///
    /// The proxy's class is the synthetic type of the object's exact runtime
    /// type. Later calls with the same object return the same handle for as
    /// long as the object is alive.
    pub fn wrap(&mut self, host: &HostRef) -> BridgeResult<ProxyHandle> {
        let identity = HostIdentity::of(host);
        let host_type = self.hosts.type_of(host)?;
        if let Some(instance) = self.proxies.lookup(identity) {
            let name = self.hosts.get(host_type)?.name();
            self.tracer.on_wrap(name, true);
            return Ok(ProxyHandle(instance));
        }

        let class = self.get_or_create_bridged_type(host_type)?;
        let instance = self
            .heap
            .allocate(HeapData::Instance(Instance::new(class.id(), Some(HostLink::borrowed(host)))));
        self.proxies.associate(host, instance);
        let name = self.hosts.get(host_type)?.name();
        self.tracer.on_wrap(name, false);
        Ok(ProxyHandle(instance))
    }

    /// The live host object behind a proxy or host-backed instance.
    #[must_use]
    pub fn host_of(&self, value: &Value) -> Option<HostRef> {
        self.heap.instance(value.ref_id()?)?.host()?.upgrade()
    }

    /// Removes association entries for host objects that have been dropped.
    ///
    /// Returns the number of entries removed.
    pub fn prune_dead_proxies(&mut self) -> usize {
        self.proxies.prune()
    }
}
