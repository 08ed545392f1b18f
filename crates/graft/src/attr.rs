//! The attribute protocol, including the `__getattr__` / `__setattr__` hooks.
//!
//! Reading `obj.name` on an instance:
//! 1. `__class__` is answered directly.
//! 2. A host property found on the MRO is a data descriptor: its getter runs.
//! 3. The instance's own attributes.
//! 4. Any other class attribute along the MRO; functions bind to the instance.
//! 5. Only if all of the above fail, the first `__getattr__` on the MRO.
//!
//! Writing `obj.name = value` walks the MRO once. The first class that either
//! exposes `name` as a host property or defines `__setattr__` decides: the
//! property's setter runs, or the hook runs (unless it is `object.__setattr__`).
//! With neither, the value goes into the instance's own attributes.

use std::sync::Arc;

use crate::{
    error::{BridgeError, BridgeResult, ExcType},
    heap::{HeapData, HeapId},
    session::Session,
    types::{BoundMethod, ClassObject, ClassOrigin, HostProperty, SuperProxy, class::mro_lookup_from},
    value::{Builtin, BuiltinFunction, Value},
};

const GETATTR_HOOK: &str = "__getattr__";
const SETATTR_HOOK: &str = "__setattr__";

impl Session {
    /// `getattr(obj, name)` as the interpreter performs it.
    pub(crate) fn load_attr(&mut self, obj: &Value, name: &str) -> BridgeResult<Value> {
        if let Value::Ref(id) = obj {
            match self.heap.get(*id) {
                HeapData::Instance(_) => return self.instance_getattr(*id, obj, name),
                HeapData::Class(_) => return self.class_getattr(*id, name),
                HeapData::Super(proxy) => {
                    let proxy = proxy.clone();
                    return self.super_getattr(&proxy, name);
                }
                HeapData::Exception(exc) if name == "args" => {
                    let args = exc.message().map(Value::from).into_iter().collect();
                    return Ok(Value::Ref(self.heap.allocate(HeapData::List(args))));
                }
                _ => {}
            }
        }
        let class_id = self.class_of_value(obj);
        if name == "__class__" {
            return Ok(Value::Ref(class_id));
        }
        let cls = self.heap.class(class_id)?;
        match cls.mro_lookup(name, &self.heap) {
            Some((_, value)) => self.bind(obj, value),
            None => Err(BridgeError::attribute_error(cls.name(), name)),
        }
    }

    fn instance_getattr(&mut self, id: HeapId, obj: &Value, name: &str) -> BridgeResult<Value> {
        let Some(instance) = self.heap.instance(id) else {
            return Err(BridgeError::internal("instance slot changed"));
        };
        let class_id = instance.class_id();
        if name == "__class__" {
            return Ok(Value::Ref(class_id));
        }
        let cls = self.heap.class(class_id)?;
        let found = cls.mro_lookup(name, &self.heap);

        if let Some(property) = found.as_ref().and_then(|(_, value)| self.host_property(value)) {
            return self.property_get(&property, obj);
        }
        if let Some(value) = instance.attrs().get(name) {
            return Ok(value.clone());
        }
        if let Some((_, value)) = found {
            return self.bind(obj, value);
        }

        let cls = self.heap.class(class_id)?;
        let type_name = cls.name().to_owned();
        match cls.mro_lookup(GETATTR_HOOK, &self.heap) {
            Some((_, hook)) => {
                self.tracer.on_hook_dispatch(GETATTR_HOOK, &type_name, name);
                let hook = self.bind(obj, hook)?;
                self.call_value(hook, vec![Value::from(name)])
            }
            None => Err(BridgeError::attribute_error(type_name, name)),
        }
    }

    fn class_getattr(&mut self, class_id: HeapId, name: &str) -> BridgeResult<Value> {
        let cls = self.heap.class(class_id)?;
        match name {
            "__name__" => return Ok(Value::from(cls.name())),
            "__class__" => return Ok(Value::Ref(self.class_of_value(&Value::Ref(class_id)))),
            "__bases__" => {
                let bases = cls.bases().iter().map(|&id| Value::Ref(id)).collect();
                return Ok(Value::Ref(self.heap.allocate(HeapData::List(bases))));
            }
            "__mro__" => {
                let mro = cls.mro().iter().map(|&id| Value::Ref(id)).collect();
                return Ok(Value::Ref(self.heap.allocate(HeapData::List(mro))));
            }
            _ => {}
        }
        match cls.mro_lookup(name, &self.heap) {
            Some((_, value)) => Ok(value),
            None => Err(BridgeError::attribute_error(cls.name(), name)),
        }
    }

    /// `super(cls, obj).name`: searches the MRO of `obj`'s class after `cls`.
    ///
    /// Only class namespaces are searched. Neither the instance's own
    /// attributes nor `__getattr__` take part.
    pub(crate) fn super_getattr(&mut self, proxy: &SuperProxy, name: &str) -> BridgeResult<Value> {
        let obj = proxy.instance().clone();
        let class_id = self.class_of_value(&obj);
        let mro = self.heap.class(class_id)?.mro();
        let start = mro
            .iter()
            .position(|&id| id == proxy.current_class())
            .map_or(mro.len(), |pos| pos + 1);
        match mro_lookup_from(&mro[start..], name, &self.heap) {
            Some((_, value)) => {
                if let Some(property) = self.host_property(&value) {
                    return self.property_get(&property, &obj);
                }
                self.bind(&obj, value)
            }
            None => Err(BridgeError::attribute_error("super", name)),
        }
    }

    /// `setattr(obj, name, value)` as the interpreter performs it.
    pub(crate) fn store_attr(&mut self, obj: &Value, name: &str, value: Value) -> BridgeResult<()> {
        let Value::Ref(id) = obj else {
            return Err(self.readonly_attr_error(obj, name));
        };
        match self.heap.get(*id) {
            HeapData::Instance(instance) => {
                let class_id = instance.class_id();
                self.instance_setattr(*id, class_id, obj, name, value)
            }
            HeapData::Class(cls) => {
                if matches!(cls.origin(), ClassOrigin::Builtin(_)) {
                    return Err(BridgeError::type_error(format!(
                        "cannot set '{name}' attribute of immutable type '{}'",
                        cls.name()
                    )));
                }
                self.heap.class_mut(*id)?.set_attr(name.to_owned(), value);
                Ok(())
            }
            _ => Err(self.readonly_attr_error(obj, name)),
        }
    }

    fn instance_setattr(
        &mut self,
        id: HeapId,
        class_id: HeapId,
        obj: &Value,
        name: &str,
        value: Value,
    ) -> BridgeResult<()> {
        let cls = self.heap.class(class_id)?;
        let type_name = cls.name().to_owned();
        for &mro_id in cls.mro() {
            let HeapData::Class(mro_cls) = self.heap.get(mro_id) else {
                continue;
            };
            if let Some(property) = mro_cls.namespace().get(name).and_then(|v| self.host_property(v)) {
                return self.property_set(&property, obj, value);
            }
            if let Some(hook) = mro_cls.namespace().get(SETATTR_HOOK) {
                if *hook == Value::Builtin(Builtin::Function(BuiltinFunction::ObjectSetattr)) {
                    break;
                }
                let hook = hook.clone();
                self.tracer.on_hook_dispatch(SETATTR_HOOK, &type_name, name);
                let hook = self.bind(obj, hook)?;
                self.call_value(hook, vec![Value::from(name), value])?;
                return Ok(());
            }
        }
        self.store_instance_attr(id, name, value)
    }

    /// `object.__setattr__`: honors host properties, otherwise stores on the instance.
    pub(crate) fn generic_setattr(&mut self, obj: &Value, name: &str, value: Value) -> BridgeResult<()> {
        let Some(id) = obj.ref_id().filter(|&id| self.heap.instance(id).is_some()) else {
            return Err(self.readonly_attr_error(obj, name));
        };
        let class_id = self.class_of_value(obj);
        let found = self.heap.class(class_id)?.mro_lookup(name, &self.heap);
        if let Some(property) = found.and_then(|(_, v)| self.host_property(&v)) {
            return self.property_set(&property, obj, value);
        }
        self.store_instance_attr(id, name, value)
    }

    fn store_instance_attr(&mut self, id: HeapId, name: &str, value: Value) -> BridgeResult<()> {
        match self.heap.instance_mut(id) {
            Some(instance) => {
                instance.set_attr(name.to_owned(), value);
                Ok(())
            }
            None => Err(BridgeError::internal("instance slot changed")),
        }
    }

    fn readonly_attr_error(&self, obj: &Value, name: &str) -> BridgeError {
        let class_id = self.class_of_value(obj);
        BridgeError::exception(
            ExcType::AttributeError,
            format!(
                "'{}' object attribute '{name}' is read-only",
                self.class_name(class_id)
            ),
        )
    }

    fn host_property(&self, value: &Value) -> Option<HostProperty> {
        match self.heap.get(value.ref_id()?) {
            HeapData::HostProperty(property) => Some(property.clone()),
            _ => None,
        }
    }

    fn property_get(&mut self, property: &HostProperty, obj: &Value) -> BridgeResult<Value> {
        let host = self.host_for(obj, property.host_type(), property.name())?;
        let getter = Arc::clone(property.getter());
        self.enter(|session| getter(session, &host))
    }

    fn property_set(&mut self, property: &HostProperty, obj: &Value, value: Value) -> BridgeResult<()> {
        let Some(setter) = property.setter().cloned() else {
            return Err(BridgeError::exception(
                ExcType::AttributeError,
                format!(
                    "property '{}' of '{}' object has no setter",
                    property.name(),
                    self.class_name(self.class_of_value(obj))
                ),
            ));
        };
        let host = self.host_for(obj, property.host_type(), property.name())?;
        self.enter(|session| setter(session, &host, value))
    }

    /// Binds functions and host methods found on a class to `obj`.
    pub(crate) fn bind(&mut self, obj: &Value, value: Value) -> BridgeResult<Value> {
        let bindable = match &value {
            Value::Ref(id) => matches!(self.heap.get(*id), HeapData::Function(_) | HeapData::HostMethod(_)),
            Value::Builtin(Builtin::Function(BuiltinFunction::ObjectSetattr | BuiltinFunction::ObjectInit)) => true,
            _ => false,
        };
        if !bindable {
            return Ok(value);
        }
        let bound = BoundMethod::new(obj.clone(), value);
        Ok(Value::Ref(self.heap.allocate(HeapData::BoundMethod(bound))))
    }

    pub(crate) fn class_name(&self, class_id: HeapId) -> &str {
        self.heap.class(class_id).map_or("<unknown>", ClassObject::name)
    }
}
