//! Synthetic type construction.
//!
//! A synthetic type is the class object the interpreter sees for a host type.
//! Its namespace holds the host type's methods and properties, and its bases
//! are the bridged type of the host base (or `object`) as rewritten by the
//! base-type providers. Synthetic types are built once per host type and
//! cached for the life of the session.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    config::LimitError,
    error::{BridgeError, BridgeResult, LinearizationError},
    heap::{Heap, HeapData, HeapId},
    host::{HostTypeDef, HostTypeId},
    mro,
    provider::ProviderContext,
    session::{Session, TypeHandle},
    types::{BuiltinClass, ClassObject, ClassOrigin, HostMethod, HostProperty},
    value::Value,
};

/// Cache and re-entrancy state for synthetic types.
#[derive(Debug, Default)]
pub(crate) struct SyntheticTypeBuilder {
    cache: AHashMap<HostTypeId, TypeHandle>,
    under_construction: AHashSet<HostTypeId>,
}

impl SyntheticTypeBuilder {
    pub fn cached(&self, host_type: HostTypeId) -> Option<TypeHandle> {
        self.cache.get(&host_type).copied()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

/// Marks a host type as under construction until dropped.
struct Building<'a> {
    session: &'a mut Session,
    host_type: HostTypeId,
}

impl Deref for Building<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for Building<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        self.session.types.under_construction.remove(&self.host_type);
    }
}

impl Session {
    /// Returns the synthetic type for `host_type`, building it on first use.
    ///
    /// Building asks the host base's synthetic type first, so a derived host
    /// type always has its ancestor's synthetic type among its natural bases.
    pub fn get_or_create_bridged_type(&mut self, host_type: HostTypeId) -> BridgeResult<TypeHandle> {
        let def = Arc::clone(self.hosts.get(host_type)?);
        if let Some(handle) = self.types.cached(host_type) {
            self.tracer.on_type_cached(def.name());
            return Ok(handle);
        }
        if !self.types.under_construction.insert(host_type) {
            return Err(BridgeError::ReentrantConstruction {
                host_type: def.name().to_owned(),
            });
        }
        let handle = {
            let mut building = Building { session: self, host_type };
            building.build_synthetic_type(host_type, &def)?
        };

        self.types.cache.insert(host_type, handle);
        let mro = self.type_names(&self.mro_of(handle)?);
        self.tracer.on_type_built(def.name(), &mro);
        Ok(handle)
    }

    fn build_synthetic_type(&mut self, host_type: HostTypeId, def: &HostTypeDef) -> BridgeResult<TypeHandle> {
        let natural = match def.base() {
            Some(base) => vec![self.get_or_create_bridged_type(base)?],
            None => vec![self.object_type()],
        };
        // providers registered while this type builds only affect later builds
        let providers = self.providers.clone();
        let bases = providers.compute_bases(&mut ProviderContext::new(self), host_type, natural)?;
        let bases = if bases.is_empty() {
            vec![self.object_type().id()]
        } else {
            bases.into_iter().map(TypeHandle::id).collect()
        };
        let tail = self.compute_mro(def.name(), &bases, &AHashMap::new())?;

        let mut namespace = IndexMap::new();
        if let Some(module) = def.module_name() {
            namespace.insert("__module__".to_owned(), Value::from(module));
        }
        for (name, func) in def.methods() {
            let method = HostMethod::new(host_type, name.clone(), Arc::clone(func));
            let id = self.heap.allocate(HeapData::HostMethod(method));
            namespace.insert(name.clone(), Value::Ref(id));
        }
        for (name, prop) in def.properties() {
            let property = HostProperty::new(host_type, name.clone(), Arc::clone(&prop.getter), prop.setter.clone());
            let id = self.heap.allocate(HeapData::HostProperty(property));
            namespace.insert(name.clone(), Value::Ref(id));
        }

        let class_id = self.install_class(def.name(), ClassOrigin::Synthetic(host_type), bases, tail, namespace)?;
        Ok(TypeHandle::new(class_id))
    }

    /// Creates a class after validating and linearizing its bases.
    ///
    /// Nothing is allocated when linearization fails.
    pub(crate) fn create_class(
        &mut self,
        name: &str,
        origin: ClassOrigin,
        bases: Vec<HeapId>,
        namespace: IndexMap<String, Value>,
    ) -> BridgeResult<HeapId> {
        let tail = self.compute_mro(name, &bases, &AHashMap::new())?;
        self.install_class(name, origin, bases, tail, namespace)
    }

    /// Allocates a class whose MRO after itself is `tail`.
    fn install_class(
        &mut self,
        name: &str,
        origin: ClassOrigin,
        bases: Vec<HeapId>,
        tail: Vec<HeapId>,
        namespace: IndexMap<String, Value>,
    ) -> BridgeResult<HeapId> {
        let functions: Vec<HeapId> = namespace
            .values()
            .filter_map(Value::ref_id)
            .filter(|&id| matches!(self.heap.get(id), HeapData::Function(_)))
            .collect();

        let class_id = self
            .heap
            .allocate(HeapData::Class(ClassObject::new(name, origin, bases.clone(), namespace)));
        let mut mro = Vec::with_capacity(tail.len() + 1);
        mro.push(class_id);
        mro.extend(tail);
        self.heap.class_mut(class_id)?.set_mro(mro);
        for base in bases {
            self.heap.class_mut(base)?.register_subclass(class_id);
        }
        for id in functions {
            if let HeapData::Function(func) = self.heap.get_mut(id)
                && func.defining_class().is_none()
            {
                func.set_defining_class(class_id);
            }
        }
        Ok(class_id)
    }

    /// Computes the MRO of a class named `name` with `bases`, excluding the class itself.
    ///
    /// `pending` overrides the stored MRO of classes whose MRO is being recomputed.
    fn compute_mro(
        &self,
        name: &str,
        bases: &[HeapId],
        pending: &AHashMap<HeapId, Vec<HeapId>>,
    ) -> BridgeResult<Vec<HeapId>> {
        self.check_bases(bases)?;
        let mut base_mros = Vec::with_capacity(bases.len());
        for &base in bases {
            let base_mro = match pending.get(&base) {
                Some(mro) => mro.clone(),
                None => self.heap.class(base)?.mro().to_vec(),
            };
            if base_mro.len() > self.config.max_inheritance_depth {
                return Err(LimitError::InheritanceDepth {
                    type_name: name.to_owned(),
                    limit: self.config.max_inheritance_depth,
                    depth: base_mro.len(),
                }
                .into());
            }
            base_mros.push(base_mro);
        }

        let tail = mro::linearize(bases, base_mros).map_err(|conflict| LinearizationError {
            type_name: name.to_owned(),
            bases: conflict.heads.iter().map(|&id| self.class_name(id).to_owned()).collect(),
        })?;
        if tail.len() + 1 > self.config.max_mro_length {
            return Err(LimitError::MroLength {
                type_name: name.to_owned(),
                limit: self.config.max_mro_length,
                length: tail.len() + 1,
            }
            .into());
        }
        Ok(tail)
    }

    fn check_bases(&self, bases: &[HeapId]) -> BridgeResult<()> {
        for (i, &base) in bases.iter().enumerate() {
            let cls = self.heap.class(base)?;
            if let ClassOrigin::Builtin(kind) = cls.origin()
                && kind != BuiltinClass::Object
            {
                return Err(BridgeError::type_error(format!(
                    "type '{}' is not an acceptable base type",
                    cls.name()
                )));
            }
            if bases[..i].contains(&base) {
                return Err(BridgeError::type_error(format!("duplicate base class {}", cls.name())));
            }
        }
        Ok(())
    }

    /// Replaces the bases of a class and recomputes the MRO of it and every
    /// class derived from it.
    ///
    /// Either every affected MRO is updated or, on error, nothing changes.
    pub fn set_bases(&mut self, handle: TypeHandle, bases: Vec<TypeHandle>) -> BridgeResult<()> {
        let class_id = handle.id();
        let cls = self.heap.class(class_id)?;
        let class_name = cls.name().to_owned();
        if matches!(cls.origin(), ClassOrigin::Builtin(_)) {
            return Err(BridgeError::type_error(format!(
                "cannot set '__bases__' attribute of immutable type '{class_name}'"
            )));
        }
        if bases.is_empty() {
            return Err(BridgeError::type_error(format!(
                "can only assign non-empty list to {class_name}.__bases__"
            )));
        }
        let new_bases: Vec<HeapId> = bases.into_iter().map(TypeHandle::id).collect();
        for &base in &new_bases {
            if self.heap.class(base)?.is_subclass_of(class_id) {
                return Err(BridgeError::type_error("a __bases__ item causes an inheritance cycle"));
            }
        }

        let mut pending: AHashMap<HeapId, Vec<HeapId>> = AHashMap::new();
        for id in affected_classes(&self.heap, class_id) {
            let cls = self.heap.class(id)?;
            let class_bases = if id == class_id { new_bases.clone() } else { cls.bases().to_vec() };
            let tail = self.compute_mro(cls.name(), &class_bases, &pending)?;
            let mut mro = Vec::with_capacity(tail.len() + 1);
            mro.push(id);
            mro.extend(tail);
            pending.insert(id, mro);
        }

        let old_bases = self.heap.class(class_id)?.bases().to_vec();
        for base in old_bases {
            self.heap.class_mut(base)?.unregister_subclass(class_id);
        }
        for &base in &new_bases {
            self.heap.class_mut(base)?.register_subclass(class_id);
        }
        self.heap.class_mut(class_id)?.set_bases(new_bases);
        for (id, mro) in pending {
            self.heap.class_mut(id)?.set_mro(mro);
        }
        Ok(())
    }
}

/// `root` and its transitive subclasses, each after all of its affected bases.
fn affected_classes(heap: &Heap, root: HeapId) -> Vec<HeapId> {
    fn visit(heap: &Heap, id: HeapId, seen: &mut AHashSet<HeapId>, order: &mut Vec<HeapId>) {
        if !seen.insert(id) {
            return;
        }
        if let HeapData::Class(cls) = heap.get(id) {
            for &sub in cls.subclasses() {
                visit(heap, sub, seen, order);
            }
        }
        order.push(id);
    }

    let mut seen = AHashSet::new();
    let mut order = Vec::new();
    visit(heap, root, &mut seen, &mut order);
    order.reverse();
    order
}
