//! Host types and host objects.
//!
//! A host type is a Rust type registered with the session through a
//! [`HostTypeDef`]: its exposed methods, properties, optional constructor and
//! optional host base type. Host objects are shared as [`HostRef`]s; the exact
//! runtime Rust type of the object selects its registered definition.

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use ahash::AHashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::{
    error::{BridgeError, BridgeResult},
    session::Session,
    value::Value,
};

/// Marker trait for Rust types that can cross into the interpreter.
///
/// Implement it for every type passed to [`HostTypeDef::new`].
pub trait HostObject: Any + Send + Sync {
    /// The Rust type name, used in error messages for unregistered objects.
    fn host_type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A shared host object.
pub type HostRef = Arc<dyn HostObject>;

/// Identity of a host object: the address of its allocation.
///
/// Two `HostRef`s have the same identity exactly when they point to the same
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostIdentity(usize);

impl HostIdentity {
    #[must_use]
    pub fn of(host: &HostRef) -> Self {
        Self(Arc::as_ptr(host).cast::<()>().addr())
    }
}

/// Returns the concrete host object behind a `HostRef`, if it is a `T`.
#[must_use]
pub fn downcast_host<T: HostObject>(host: &HostRef) -> Option<&T> {
    let any: &dyn Any = &**host;
    any.downcast_ref::<T>()
}

fn runtime_type_id(host: &HostRef) -> TypeId {
    let any: &dyn Any = &**host;
    any.type_id()
}

/// Identifies a registered host type within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostTypeId(u32);

impl HostTypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A host method: receives the session, the host object and the positional arguments.
pub type HostMethodFn = Arc<dyn Fn(&mut Session, &HostRef, Vec<Value>) -> BridgeResult<Value> + Send + Sync>;
/// A host property getter.
pub type HostGetterFn = Arc<dyn Fn(&mut Session, &HostRef) -> BridgeResult<Value> + Send + Sync>;
/// A host property setter.
pub type HostSetterFn = Arc<dyn Fn(&mut Session, &HostRef, Value) -> BridgeResult<()> + Send + Sync>;
/// A host constructor, invoked when a script instantiates a host-backed class.
pub type HostCtorFn = Arc<dyn Fn(&mut Session, Vec<Value>) -> BridgeResult<HostRef> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct HostPropertyDef {
    pub getter: HostGetterFn,
    pub setter: Option<HostSetterFn>,
}

/// Describes a host type to the bridge.
///
/// ```ignore
/// let def = HostTypeDef::new::<Counter>("Counter")
///     .module("app.models")
///     .method("bump", |_, host, _| { ... })
///     .property("count", |_, host| { ... });
/// let id = session.register_host_type(def)?;
/// ```
pub struct HostTypeDef {
    name: String,
    module: Option<String>,
    rust_type: TypeId,
    rust_type_name: &'static str,
    base: Option<HostTypeId>,
    methods: IndexMap<String, HostMethodFn>,
    properties: IndexMap<String, HostPropertyDef>,
    constructor: Option<HostCtorFn>,
}

impl HostTypeDef {
    /// Starts a definition for the Rust type `T`, exposed under `name`.
    #[must_use]
    pub fn new<T: HostObject>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: None,
            rust_type: TypeId::of::<T>(),
            rust_type_name: std::any::type_name::<T>(),
            base: None,
            methods: IndexMap::new(),
            properties: IndexMap::new(),
            constructor: None,
        }
    }

    /// Makes the type importable as `from <module> import <name>`.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Declares the host base type. The base must be registered first.
    #[must_use]
    pub fn extends(mut self, base: HostTypeId) -> Self {
        self.base = Some(base);
        self
    }

    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Session, &HostRef, Vec<Value>) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(func));
        self
    }

    /// Adds a read-only property.
    #[must_use]
    pub fn property<G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&mut Session, &HostRef) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.properties.insert(
            name.into(),
            HostPropertyDef {
                getter: Arc::new(getter),
                setter: None,
            },
        );
        self
    }

    #[must_use]
    pub fn property_with_setter<G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&mut Session, &HostRef) -> BridgeResult<Value> + Send + Sync + 'static,
        S: Fn(&mut Session, &HostRef, Value) -> BridgeResult<()> + Send + Sync + 'static,
    {
        self.properties.insert(
            name.into(),
            HostPropertyDef {
                getter: Arc::new(getter),
                setter: Some(Arc::new(setter)),
            },
        );
        self
    }

    /// Lets scripts instantiate the type (and classes derived from it).
    #[must_use]
    pub fn constructor<F>(mut self, func: F) -> Self
    where
        F: Fn(&mut Session, Vec<Value>) -> BridgeResult<HostRef> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(func));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.module.as_deref()
    }

    #[must_use]
    pub fn base(&self) -> Option<HostTypeId> {
        self.base
    }

    /// Names of the exposed methods, in definition order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Names of the exposed properties, in definition order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub(crate) fn methods(&self) -> &IndexMap<String, HostMethodFn> {
        &self.methods
    }

    pub(crate) fn properties(&self) -> &IndexMap<String, HostPropertyDef> {
        &self.properties
    }

    pub(crate) fn host_constructor(&self) -> Option<&HostCtorFn> {
        self.constructor.as_ref()
    }
}

impl fmt::Debug for HostTypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTypeDef")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("rust_type", &self.rust_type_name)
            .field("base", &self.base)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

/// All host types registered with a session.
#[derive(Debug, Default)]
pub(crate) struct HostRegistry {
    types: Vec<Arc<HostTypeDef>>,
    by_rust_type: AHashMap<TypeId, HostTypeId>,
    by_path: AHashMap<(String, String), HostTypeId>,
}

impl HostRegistry {
    pub fn register(&mut self, def: HostTypeDef) -> BridgeResult<HostTypeId> {
        let reject = |reason: String| BridgeError::Registration {
            type_name: def.name.clone(),
            reason,
        };
        if let Some(base) = def.base
            && base.index() >= self.types.len()
        {
            return Err(reject(format!("base type id {} is not registered", base.0)));
        }
        if let Some(existing) = self.by_rust_type.get(&def.rust_type) {
            return Err(reject(format!(
                "Rust type `{}` is already registered as '{}'",
                def.rust_type_name,
                self.types[existing.index()].name
            )));
        }
        let path = def.module.as_ref().map(|module| (module.clone(), def.name.clone()));
        if let Some(path) = &path
            && self.by_path.contains_key(path)
        {
            return Err(reject(format!("'{}.{}' is already registered", path.0, path.1)));
        }

        let index = u32::try_from(self.types.len()).map_err(|_| reject("too many host types".to_owned()))?;
        let id = HostTypeId(index);
        self.by_rust_type.insert(def.rust_type, id);
        if let Some(path) = path {
            self.by_path.insert(path, id);
        }
        self.types.push(Arc::new(def));
        Ok(id)
    }

    pub fn get(&self, id: HostTypeId) -> BridgeResult<&Arc<HostTypeDef>> {
        self.types.get(id.index()).ok_or_else(|| BridgeError::UnknownHostType {
            type_name: format!("<host type {}>", id.0),
        })
    }

    pub fn id_of<T: HostObject>(&self) -> Option<HostTypeId> {
        self.by_rust_type.get(&TypeId::of::<T>()).copied()
    }

    /// The registered type of a host object's exact runtime type.
    pub fn type_of(&self, host: &HostRef) -> BridgeResult<HostTypeId> {
        self.by_rust_type
            .get(&runtime_type_id(host))
            .copied()
            .ok_or_else(|| BridgeError::UnknownHostType {
                type_name: host.host_type_name().to_owned(),
            })
    }

    pub fn resolve_path(&self, module: &str, name: &str) -> Option<HostTypeId> {
        self.by_path.get(&(module.to_owned(), name.to_owned())).copied()
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.by_path.keys().any(|(m, _)| m == module)
    }

    /// Whether `id` is `ancestor` or declares it as a (transitive) host base.
    pub fn is_derived_from(&self, id: HostTypeId, ancestor: HostTypeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.types.get(id.index()).and_then(|def| def.base);
        }
        false
    }
}

/// Lock-protected name to value storage for ad-hoc attributes.
///
/// Host types embed one to keep attributes that have no field of their own,
/// typically written by a property setter and read back by its getter once
/// the dynamic base chain has failed to resolve the name.
#[derive(Debug, Default)]
pub struct AdHocStore {
    values: Mutex<AHashMap<String, Value>>,
}

impl AdHocStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.lock().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.values.lock().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values.lock().remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}
