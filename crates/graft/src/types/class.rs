//! Class objects, instances and `super` proxies.
//!
//! `ClassObject` represents a type: a builtin, a class defined by a script, or
//! a synthetic type built for a host type. `Instance` is an object whose class
//! is a `ClassObject`, optionally backed by a host object.
//!
//! # Attribute Access
//!
//! - Data descriptors on the class (host properties) win over instance attributes
//! - Instance attributes are checked next, then class attributes along the MRO
//! - `__getattr__` runs only after all of the above fail

use std::{
    fmt,
    sync::{Arc, Weak},
};

use indexmap::IndexMap;

use crate::{
    heap::{Heap, HeapData, HeapId},
    host::{HostIdentity, HostObject, HostRef, HostTypeId},
    value::Value,
};

/// Builtin classes that exist in every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub(crate) enum BuiltinClass {
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "NoneType")]
    NoneType,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "str")]
    Str,
    #[strum(serialize = "dict")]
    Dict,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "property")]
    Property,
    #[strum(serialize = "super")]
    Super,
    #[strum(serialize = "BaseException")]
    Exception,
}

impl BuiltinClass {
    /// Whether scripts can see this class under its own name.
    pub fn is_script_visible(self) -> bool {
        matches!(
            self,
            Self::Object | Self::Type | Self::Int | Self::Bool | Self::Str | Self::Dict | Self::List
        )
    }
}

/// Where a class came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassOrigin {
    Builtin(BuiltinClass),
    /// Defined by a `class` statement.
    Script,
    /// Built by the bridge for a host type.
    Synthetic(HostTypeId),
}

#[derive(Debug)]
pub(crate) struct ClassObject {
    name: String,
    origin: ClassOrigin,
    /// Direct bases. Only `object` has none.
    bases: Vec<HeapId>,
    /// Method Resolution Order computed by C3 linearization, starting with the class itself.
    mro: Vec<HeapId>,
    namespace: IndexMap<String, Value>,
    /// Direct subclasses, in creation order, so base reassignment can refresh their MROs.
    subclasses: Vec<HeapId>,
}

impl ClassObject {
    pub fn new(
        name: impl Into<String>,
        origin: ClassOrigin,
        bases: Vec<HeapId>,
        namespace: IndexMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            bases,
            mro: Vec::new(),
            namespace,
            subclasses: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> ClassOrigin {
        self.origin
    }

    pub fn bases(&self) -> &[HeapId] {
        &self.bases
    }

    pub fn set_bases(&mut self, bases: Vec<HeapId>) {
        self.bases = bases;
    }

    pub fn mro(&self) -> &[HeapId] {
        &self.mro
    }

    /// Sets the MRO once the class id is known, since the MRO starts with the class itself.
    pub fn set_mro(&mut self, mro: Vec<HeapId>) {
        self.mro = mro;
    }

    pub fn namespace(&self) -> &IndexMap<String, Value> {
        &self.namespace
    }

    pub fn set_attr(&mut self, name: String, value: Value) {
        self.namespace.insert(name, value);
    }

    pub fn subclasses(&self) -> &[HeapId] {
        &self.subclasses
    }

    pub fn register_subclass(&mut self, class_id: HeapId) {
        self.subclasses.push(class_id);
    }

    pub fn unregister_subclass(&mut self, class_id: HeapId) {
        self.subclasses.retain(|&id| id != class_id);
    }

    pub fn host_type(&self) -> Option<HostTypeId> {
        match self.origin {
            ClassOrigin::Synthetic(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_subclass_of(&self, other_id: HeapId) -> bool {
        self.mro.contains(&other_id)
    }

    /// Finds `name` along the MRO, returning the defining class and the raw value.
    pub fn mro_lookup(&self, name: &str, heap: &Heap) -> Option<(HeapId, Value)> {
        mro_lookup_from(&self.mro, name, heap)
    }
}

/// Searches the namespaces of `classes` in order.
pub(crate) fn mro_lookup_from(classes: &[HeapId], name: &str, heap: &Heap) -> Option<(HeapId, Value)> {
    classes.iter().find_map(|&class_id| match heap.get(class_id) {
        HeapData::Class(cls) => cls.namespace.get(name).map(|value| (class_id, value.clone())),
        _ => None,
    })
}

/// Link from an embedded instance to the host object behind it.
///
/// Every link holds a `Weak` to its own host object, so a link never resolves
/// to a different object that later lands at the same address. `owned` is set
/// only when the interpreter created the host object (script instantiation of
/// a host-backed class), in which case the interpreter governs its lifetime.
/// Proxies created by wrapping an existing host object never own it.
#[derive(Clone)]
pub(crate) struct HostLink {
    identity: HostIdentity,
    host: Weak<dyn HostObject>,
    owned: Option<HostRef>,
}

impl fmt::Debug for HostLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLink")
            .field("identity", &self.identity)
            .field("alive", &(self.host.strong_count() > 0))
            .field("owned", &self.owned.is_some())
            .finish()
    }
}

impl HostLink {
    pub fn borrowed(host: &HostRef) -> Self {
        Self {
            identity: HostIdentity::of(host),
            host: Arc::downgrade(host),
            owned: None,
        }
    }

    pub fn owned(host: HostRef) -> Self {
        Self {
            identity: HostIdentity::of(&host),
            host: Arc::downgrade(&host),
            owned: Some(host),
        }
    }

    /// The linked host object, if it is still alive.
    pub fn upgrade(&self) -> Option<HostRef> {
        self.host.upgrade()
    }
}

#[derive(Debug)]
pub(crate) struct Instance {
    class_id: HeapId,
    attrs: IndexMap<String, Value>,
    host: Option<HostLink>,
}

impl Instance {
    pub fn new(class_id: HeapId, host: Option<HostLink>) -> Self {
        Self {
            class_id,
            attrs: IndexMap::new(),
            host,
        }
    }

    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    pub fn attrs(&self) -> &IndexMap<String, Value> {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: String, value: Value) {
        self.attrs.insert(name, value);
    }

    pub fn host(&self) -> Option<&HostLink> {
        self.host.as_ref()
    }

    /// Releases an owned host object, keeping only a weak link to it.
    pub fn release_host(&mut self) -> bool {
        match &mut self.host {
            Some(link) => link.owned.take().is_some(),
            None => false,
        }
    }
}

/// The object returned by `super(cls, obj)`.
///
/// Lookups on it search the MRO of `obj`'s class starting after `current_class`,
/// and never fall back to `__getattr__`.
#[derive(Debug, Clone)]
pub(crate) struct SuperProxy {
    instance: Value,
    current_class: HeapId,
}

impl SuperProxy {
    pub fn new(instance: Value, current_class: HeapId) -> Self {
        Self {
            instance,
            current_class,
        }
    }

    pub fn instance(&self) -> &Value {
        &self.instance
    }

    pub fn current_class(&self) -> HeapId {
        self.current_class
    }
}
