use std::fmt::{self, Write};

use indexmap::IndexMap;

use crate::{
    error::{BridgeError, BridgeResult, Exception},
    types::{BoundMethod, ClassObject, Dict, HostMethod, HostProperty, Instance, ScriptFunction, SuperProxy},
    value::Value,
};

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// HeapData captures every runtime object that must live in the arena.
///
/// Immediates (`None`, bools, ints, strings) stay inline in [`Value`]; only
/// objects with identity are allocated here.
#[derive(Debug)]
pub(crate) enum HeapData {
    Class(ClassObject),
    Instance(Instance),
    Function(ScriptFunction),
    HostMethod(HostMethod),
    HostProperty(HostProperty),
    BoundMethod(BoundMethod),
    Super(SuperProxy),
    Dict(Dict),
    List(Vec<Value>),
    /// A scope's global namespace.
    Namespace(IndexMap<String, Value>),
    Exception(Exception),
}

/// Arena holding every object created during a session.
///
/// Objects are never freed individually; the whole arena is released when the
/// session shuts down.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    entries: Vec<HeapData>,
}

impl Heap {
    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(self.entries.len());
        self.entries.push(data);
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns a reference to heap data.
    ///
    /// # Panics
    /// Panics if `id` was not allocated by this heap.
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries.get(id.index()).expect("Heap::get: slot missing")
    }

    /// Returns a mutable reference to heap data.
    ///
    /// # Panics
    /// Panics if `id` was not allocated by this heap.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries.get_mut(id.index()).expect("Heap::get_mut: slot missing")
    }

    pub fn class(&self, id: HeapId) -> BridgeResult<&ClassObject> {
        match self.get(id) {
            HeapData::Class(cls) => Ok(cls),
            _ => Err(BridgeError::type_error(format!(
                "expected a type, got '{}'",
                self.data_type_name(id)
            ))),
        }
    }

    pub fn class_mut(&mut self, id: HeapId) -> BridgeResult<&mut ClassObject> {
        self.class(id)?;
        match self.get_mut(id) {
            HeapData::Class(cls) => Ok(cls),
            _ => Err(BridgeError::internal("class slot changed")),
        }
    }

    pub fn instance(&self, id: HeapId) -> Option<&Instance> {
        match self.get(id) {
            HeapData::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn instance_mut(&mut self, id: HeapId) -> Option<&mut Instance> {
        match self.get_mut(id) {
            HeapData::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// Drops the host objects owned by instances, returning how many were released.
    pub fn release_hosts(&mut self) -> usize {
        let mut released = 0;
        for data in &mut self.entries {
            if let HeapData::Instance(instance) = data
                && instance.release_host()
            {
                released += 1;
            }
        }
        released
    }

    /// The Python type name of a heap object, as shown in error messages.
    pub fn data_type_name(&self, id: HeapId) -> &str {
        match self.get(id) {
            HeapData::Class(_) => "type",
            HeapData::Instance(instance) => match self.get(instance.class_id()) {
                HeapData::Class(cls) => cls.name(),
                _ => "object",
            },
            HeapData::Function(_) => "function",
            HeapData::HostMethod(_) => "builtin_function_or_method",
            HeapData::HostProperty(_) => "property",
            HeapData::BoundMethod(_) => "method",
            HeapData::Super(_) => "super",
            HeapData::Dict(_) | HeapData::Namespace(_) => "dict",
            HeapData::List(_) => "list",
            HeapData::Exception(exc) => {
                let name: &'static str = exc.exc_type().into();
                name
            }
        }
    }

    /// Writes the `repr()` of a heap object.
    pub fn repr_fmt(&self, id: HeapId, f: &mut impl Write) -> fmt::Result {
        let mut active = Vec::new();
        self.repr_nested(id, f, &mut active)
    }

    /// `active` holds the containers currently being printed, so that
    /// self-referencing dicts and lists print as `{...}` / `[...]`.
    fn repr_nested(&self, id: HeapId, f: &mut impl Write, active: &mut Vec<HeapId>) -> fmt::Result {
        match self.get(id) {
            HeapData::Class(cls) => write!(f, "<class '{}'>", cls.name()),
            HeapData::Instance(_) => write!(f, "<{} object>", self.data_type_name(id)),
            HeapData::Function(func) => write!(f, "<function {}>", func.name()),
            HeapData::HostMethod(method) => write!(f, "<host method {}>", method.name()),
            HeapData::HostProperty(prop) => write!(f, "<property {}>", prop.name()),
            HeapData::BoundMethod(bound) => {
                f.write_str("<bound method of ")?;
                self.repr_value(bound.receiver(), f, active)?;
                f.write_char('>')
            }
            HeapData::Super(_) => f.write_str("<super object>"),
            HeapData::Exception(exc) => match exc.message() {
                Some(msg) => write!(f, "{}({})", exc.exc_type(), Value::from(msg).repr(self)),
                None => write!(f, "{}()", exc.exc_type()),
            },
            HeapData::Dict(dict) => {
                if active.contains(&id) {
                    return f.write_str("{...}");
                }
                active.push(id);
                f.write_char('{')?;
                for (i, (key, value)) in dict.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.repr_value(key, f, active)?;
                    f.write_str(": ")?;
                    self.repr_value(value, f, active)?;
                }
                active.pop();
                f.write_char('}')
            }
            HeapData::Namespace(names) => write!(f, "<namespace with {} names>", names.len()),
            HeapData::List(items) => {
                if active.contains(&id) {
                    return f.write_str("[...]");
                }
                active.push(id);
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.repr_value(item, f, active)?;
                }
                active.pop();
                f.write_char(']')
            }
        }
    }

    fn repr_value(&self, value: &Value, f: &mut impl Write, active: &mut Vec<HeapId>) -> fmt::Result {
        match value {
            Value::Ref(id) => self.repr_nested(*id, f, active),
            other => other.repr_fmt(f, self),
        }
    }
}
