//! The bridge session: interpreter state, registries and the public API.
//!
//! A [`Session`] owns everything the bridge touches: the heap, the builtin
//! classes, the host type registry, the base-type providers, the synthetic
//! type cache and the proxy table. Nothing is global; two sessions never
//! share state.
//!
//! Sessions are single-threaded. [`SharedSession`] puts one behind a lock so
//! that it can be shared across threads; holding the lock is what allows a
//! thread to touch interpreter state.

use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use strum::IntoEnumIterator;

use crate::{
    config::BridgeConfig,
    error::{BridgeError, BridgeResult, ExcType},
    heap::{Heap, HeapData, HeapId},
    host::{HostObject, HostRegistry, HostTypeDef, HostTypeId},
    parse::{parse, parse_expr},
    provider::{BaseTypeProvider, BaseTypeProviderRegistry},
    proxy::InstanceProxies,
    synthetic::SyntheticTypeBuilder,
    tracer::{BridgeTracer, NoopTracer},
    types::{BuiltinClass, ClassObject, ClassOrigin, SuperProxy},
    value::{Builtin, BuiltinFunction, Value},
};

/// A type object living in the session heap.
///
/// Handles compare by identity: two handles are equal exactly when they
/// refer to the same type object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(HeapId);

impl TypeHandle {
    pub(crate) fn new(id: HeapId) -> Self {
        Self(id)
    }

    pub(crate) fn id(self) -> HeapId {
        self.0
    }

    /// The type object as an interpreter value.
    #[must_use]
    pub fn value(self) -> Value {
        Value::Ref(self.0)
    }
}

impl From<TypeHandle> for Value {
    fn from(handle: TypeHandle) -> Self {
        handle.value()
    }
}

/// A global namespace scripts run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope(HeapId);

/// Summary returned by [`Session::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Synthetic types built during the session.
    pub types_built: usize,
    /// Entries left in the proxy association table.
    pub proxies: usize,
    /// Host objects owned by script-created instances that were released.
    pub owned_hosts_released: usize,
    /// Objects allocated in the session heap.
    pub heap_objects: usize,
}

/// An embedded interpreter together with the host bridge state.
#[derive(Debug)]
pub struct Session {
    pub(crate) heap: Heap,
    pub(crate) builtin_classes: AHashMap<BuiltinClass, HeapId>,
    pub(crate) builtin_names: AHashMap<String, Value>,
    pub(crate) hosts: HostRegistry,
    pub(crate) providers: BaseTypeProviderRegistry,
    pub(crate) types: SyntheticTypeBuilder,
    pub(crate) proxies: InstanceProxies,
    pub(crate) config: BridgeConfig,
    pub(crate) tracer: Box<dyn BridgeTracer>,
    /// Current call depth, maintained by `enter`.
    pub(crate) depth: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_tracer(config, NoopTracer)
    }

    #[must_use]
    pub fn with_tracer(config: BridgeConfig, tracer: impl BridgeTracer + 'static) -> Self {
        let mut heap = Heap::default();
        let mut builtin_classes = AHashMap::new();

        let mut object_namespace = IndexMap::new();
        object_namespace.insert(
            "__setattr__".to_owned(),
            Value::Builtin(Builtin::Function(BuiltinFunction::ObjectSetattr)),
        );
        object_namespace.insert(
            "__init__".to_owned(),
            Value::Builtin(Builtin::Function(BuiltinFunction::ObjectInit)),
        );
        let object = heap.allocate(HeapData::Class(ClassObject::new(
            BuiltinClass::Object.to_string(),
            ClassOrigin::Builtin(BuiltinClass::Object),
            Vec::new(),
            object_namespace,
        )));
        set_builtin_mro(&mut heap, object, vec![object]);
        builtin_classes.insert(BuiltinClass::Object, object);

        for kind in BuiltinClass::iter().filter(|&kind| kind != BuiltinClass::Object) {
            // bool is the one builtin with a base other than object
            let mut mro = match kind {
                BuiltinClass::Bool => vec![builtin_classes[&BuiltinClass::Int], object],
                _ => vec![object],
            };
            let bases = vec![mro[0]];
            let id = heap.allocate(HeapData::Class(ClassObject::new(
                kind.to_string(),
                ClassOrigin::Builtin(kind),
                bases,
                IndexMap::new(),
            )));
            if let HeapData::Class(base) = heap.get_mut(mro[0]) {
                base.register_subclass(id);
            }
            mro.insert(0, id);
            set_builtin_mro(&mut heap, id, mro);
            builtin_classes.insert(kind, id);
        }

        let mut builtin_names = AHashMap::new();
        for kind in BuiltinClass::iter().filter(|kind| kind.is_script_visible()) {
            builtin_names.insert(kind.to_string(), Value::Ref(builtin_classes[&kind]));
        }
        for func in BuiltinFunction::iter()
            .filter(|func| !matches!(func, BuiltinFunction::ObjectSetattr | BuiltinFunction::ObjectInit))
        {
            builtin_names.insert(func.to_string(), Value::Builtin(Builtin::Function(func)));
        }
        for exc_type in ExcType::SCRIPT_VISIBLE {
            builtin_names.insert(exc_type.to_string(), Value::Builtin(Builtin::Exception(exc_type)));
        }

        Self {
            heap,
            builtin_classes,
            builtin_names,
            hosts: HostRegistry::default(),
            providers: BaseTypeProviderRegistry::new(),
            types: SyntheticTypeBuilder::default(),
            proxies: InstanceProxies::default(),
            config,
            tracer: Box::new(tracer),
            depth: 0,
        }
    }

    pub fn set_tracer(&mut self, tracer: impl BridgeTracer + 'static) {
        self.tracer = Box::new(tracer);
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Appends a base-type provider.
    ///
    /// Providers only affect synthetic types built after registration;
    /// types already in the cache keep their bases.
    pub fn register_base_type_provider(&mut self, provider: impl BaseTypeProvider + 'static) {
        self.providers.register(provider);
    }

    pub fn register_host_type(&mut self, def: HostTypeDef) -> BridgeResult<HostTypeId> {
        self.hosts.register(def)
    }

    #[must_use]
    pub fn host_type_id<T: HostObject>(&self) -> Option<HostTypeId> {
        self.hosts.id_of::<T>()
    }

    /// The synthetic type of the registered Rust type `T`.
    pub fn bridged_type_of<T: HostObject>(&mut self) -> BridgeResult<TypeHandle> {
        let id = self.hosts.id_of::<T>().ok_or_else(|| BridgeError::UnknownHostType {
            type_name: std::any::type_name::<T>().to_owned(),
        })?;
        self.get_or_create_bridged_type(id)
    }

    /// The builtin `object` type.
    #[must_use]
    pub fn object_type(&self) -> TypeHandle {
        TypeHandle(self.builtin_class(BuiltinClass::Object))
    }

    pub fn create_scope(&mut self) -> Scope {
        Scope(self.heap.allocate(HeapData::Namespace(IndexMap::new())))
    }

    pub fn scope_set(&mut self, scope: &Scope, name: &str, value: impl Into<Value>) {
        if let HeapData::Namespace(names) = self.heap.get_mut(scope.0) {
            names.insert(name.to_owned(), value.into());
        }
    }

    #[must_use]
    pub fn scope_get(&self, scope: &Scope, name: &str) -> Option<Value> {
        match self.heap.get(scope.0) {
            HeapData::Namespace(names) => names.get(name).cloned(),
            _ => None,
        }
    }

    /// Runs `source` as a module in `scope`; top-level bindings land in the scope.
    pub fn exec(&mut self, source: &str, scope: &Scope) -> BridgeResult<()> {
        let nodes = parse(source, &self.config.script_name)?;
        self.exec_module(&nodes, scope.0)
    }

    /// Evaluates a single expression in `scope`.
    pub fn eval(&mut self, source: &str, scope: &Scope) -> BridgeResult<Value> {
        let expr = parse_expr(source, &self.config.script_name)?;
        self.eval_in(&expr, scope.0)
    }

    /// Calls `callable` with positional arguments.
    pub fn call(&mut self, callable: &Value, args: Vec<Value>) -> BridgeResult<Value> {
        self.call_value(callable.clone(), args)
    }

    /// Looks up `name` on `target` and calls it.
    ///
    /// Fails with `NoSuchMethod` when the name itself cannot be resolved.
    pub fn invoke_method(&mut self, target: &Value, name: &str, args: Vec<Value>) -> BridgeResult<Value> {
        let method = self.load_attr(target, name).map_err(|err| match err {
            BridgeError::AttributeNotFound { type_name, attr } if attr == name => BridgeError::NoSuchMethod {
                type_name,
                method: attr,
            },
            other => other,
        })?;
        self.call_value(method, args)
    }

    /// `target.name`, with the full attribute protocol including `__getattr__`.
    pub fn get_attr(&mut self, target: &Value, name: &str) -> BridgeResult<Value> {
        self.load_attr(target, name)
    }

    /// `target.name = value`, routed through any `__setattr__` on the MRO.
    pub fn set_attr(&mut self, target: &Value, name: &str, value: impl Into<Value>) -> BridgeResult<()> {
        self.store_attr(target, name, value.into())
    }

    /// `super(after, obj).name`.
    pub fn get_super_attr(&mut self, obj: &Value, after: TypeHandle, name: &str) -> BridgeResult<Value> {
        let class_id = self.class_of_value(obj);
        if !self.heap.class(class_id)?.is_subclass_of(after.0) {
            return Err(BridgeError::type_error(
                "super(type, obj): obj must be an instance or subtype of type",
            ));
        }
        self.super_getattr(&SuperProxy::new(obj.clone(), after.0), name)
    }

    #[must_use]
    pub fn is_instance(&self, value: &Value, handle: TypeHandle) -> bool {
        let class_id = self.class_of_value(value);
        self.heap
            .class(class_id)
            .is_ok_and(|cls| cls.is_subclass_of(handle.0))
    }

    pub fn is_subclass(&self, sub: TypeHandle, sup: TypeHandle) -> BridgeResult<bool> {
        self.heap.class(sup.0)?;
        Ok(self.heap.class(sub.0)?.is_subclass_of(sup.0))
    }

    /// The class of `value`, as `type(value)` reports it.
    #[must_use]
    pub fn class_of(&self, value: &Value) -> TypeHandle {
        TypeHandle(self.class_of_value(value))
    }

    /// The type object `value` refers to, if it is one.
    #[must_use]
    pub fn type_handle(&self, value: &Value) -> Option<TypeHandle> {
        let id = value.ref_id()?;
        matches!(self.heap.get(id), HeapData::Class(_)).then_some(TypeHandle(id))
    }

    pub fn get_bases(&self, handle: TypeHandle) -> BridgeResult<Vec<TypeHandle>> {
        Ok(self.heap.class(handle.0)?.bases().iter().copied().map(TypeHandle).collect())
    }

    pub fn type_name(&self, handle: TypeHandle) -> BridgeResult<String> {
        Ok(self.heap.class(handle.0)?.name().to_owned())
    }

    /// The method resolution order, starting with the type itself.
    pub fn mro_of(&self, handle: TypeHandle) -> BridgeResult<Vec<TypeHandle>> {
        Ok(self.heap.class(handle.0)?.mro().iter().copied().map(TypeHandle).collect())
    }

    #[must_use]
    pub fn repr(&self, value: &Value) -> String {
        value.repr(&self.heap)
    }

    /// Number of synthetic types built so far.
    #[must_use]
    pub fn cached_type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of entries in the proxy association table, live or not.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Tears the session down.
    ///
    /// Host objects owned by script-created instances are released first, so
    /// the report reflects them; everything else goes with the heap.
    #[must_use]
    pub fn shutdown(mut self) -> ShutdownReport {
        let owned_hosts_released = self.heap.release_hosts();
        ShutdownReport {
            types_built: self.types.len(),
            proxies: self.proxies.len(),
            owned_hosts_released,
            heap_objects: self.heap.len(),
        }
    }

    pub(crate) fn type_names(&self, handles: &[TypeHandle]) -> Vec<String> {
        handles.iter().map(|h| self.class_name(h.0).to_owned()).collect()
    }

    pub(crate) fn builtin_class(&self, kind: BuiltinClass) -> HeapId {
        self.builtin_classes[&kind]
    }

    /// The class object of any value, builtin classes included.
    pub(crate) fn class_of_value(&self, value: &Value) -> HeapId {
        let kind = match value {
            Value::None => BuiltinClass::NoneType,
            Value::Bool(_) => BuiltinClass::Bool,
            Value::Int(_) => BuiltinClass::Int,
            Value::Str(_) => BuiltinClass::Str,
            Value::Builtin(Builtin::Function(_)) => BuiltinClass::Function,
            Value::Builtin(Builtin::Exception(_)) => BuiltinClass::Type,
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Instance(instance) => return instance.class_id(),
                HeapData::Class(_) => BuiltinClass::Type,
                HeapData::Function(_) | HeapData::HostMethod(_) | HeapData::BoundMethod(_) => BuiltinClass::Function,
                HeapData::HostProperty(_) => BuiltinClass::Property,
                HeapData::Super(_) => BuiltinClass::Super,
                HeapData::Dict(_) | HeapData::Namespace(_) => BuiltinClass::Dict,
                HeapData::List(_) => BuiltinClass::List,
                HeapData::Exception(_) => BuiltinClass::Exception,
            },
        };
        self.builtin_class(kind)
    }
}

fn set_builtin_mro(heap: &mut Heap, id: HeapId, mro: Vec<HeapId>) {
    if let HeapData::Class(cls) = heap.get_mut(id) {
        cls.set_mro(mro);
    }
}

/// A session behind the interpreter-wide lock.
///
/// Every access goes through [`SharedSession::with`] or
/// [`SharedSession::lock`]; the lock is released when the closure returns or
/// the guard is dropped, including during unwinding.
#[derive(Debug, Clone)]
pub struct SharedSession(Arc<Mutex<Session>>);

impl SharedSession {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Runs `f` while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut guard)
    }

    /// Acquires the lock, blocking until it is available.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock()
    }

    /// Acquires the lock only if no other thread holds it.
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Session>> {
        self.0.try_lock()
    }

    /// Returns the session if this is the last handle to it.
    #[must_use]
    pub fn into_inner(self) -> Option<Session> {
        Arc::try_unwrap(self.0).ok().map(Mutex::into_inner)
    }
}
