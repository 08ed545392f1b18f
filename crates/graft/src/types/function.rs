//! Callable heap objects: script functions, host methods, host properties and
//! bound methods.

use std::{fmt, sync::Arc};

use crate::{
    expressions::FunctionDef,
    heap::HeapId,
    host::{HostGetterFn, HostMethodFn, HostSetterFn, HostTypeId},
    value::Value,
};

/// A function defined by a `def` statement.
#[derive(Debug)]
pub(crate) struct ScriptFunction {
    def: Arc<FunctionDef>,
    /// Namespace the function resolves global names against.
    globals: HeapId,
    /// The class whose body defined this function, used by zero-argument `super()`.
    defining_class: Option<HeapId>,
}

impl ScriptFunction {
    pub fn new(def: Arc<FunctionDef>, globals: HeapId) -> Self {
        Self {
            def,
            globals,
            defining_class: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &Arc<FunctionDef> {
        &self.def
    }

    pub fn globals(&self) -> HeapId {
        self.globals
    }

    pub fn defining_class(&self) -> Option<HeapId> {
        self.defining_class
    }

    pub fn set_defining_class(&mut self, class_id: HeapId) {
        self.defining_class = Some(class_id);
    }
}

/// A host-defined method stored in a synthetic type's namespace.
///
/// Looked up through an instance it binds like a script function; the receiver
/// is resolved to its host object when called.
#[derive(Clone)]
pub(crate) struct HostMethod {
    host_type: HostTypeId,
    name: String,
    func: HostMethodFn,
}

impl HostMethod {
    pub fn new(host_type: HostTypeId, name: String, func: HostMethodFn) -> Self {
        Self { host_type, name, func }
    }

    pub fn host_type(&self) -> HostTypeId {
        self.host_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn func(&self) -> &HostMethodFn {
        &self.func
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMethod")
            .field("host_type", &self.host_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A host-defined property: a data descriptor that wins over instance attributes.
#[derive(Clone)]
pub(crate) struct HostProperty {
    host_type: HostTypeId,
    name: String,
    getter: HostGetterFn,
    setter: Option<HostSetterFn>,
}

impl HostProperty {
    pub fn new(host_type: HostTypeId, name: String, getter: HostGetterFn, setter: Option<HostSetterFn>) -> Self {
        Self {
            host_type,
            name,
            getter,
            setter,
        }
    }

    pub fn host_type(&self) -> HostTypeId {
        self.host_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn getter(&self) -> &HostGetterFn {
        &self.getter
    }

    pub fn setter(&self) -> Option<&HostSetterFn> {
        self.setter.as_ref()
    }
}

impl fmt::Debug for HostProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostProperty")
            .field("host_type", &self.host_type)
            .field("name", &self.name)
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

/// A callable with its receiver already bound as the first argument.
#[derive(Debug, Clone)]
pub(crate) struct BoundMethod {
    receiver: Value,
    func: Value,
}

impl BoundMethod {
    pub fn new(receiver: Value, func: Value) -> Self {
        Self { receiver, func }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn func(&self) -> &Value {
        &self.func
    }
}
