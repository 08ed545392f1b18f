//! Tree-walking evaluator for bridge scripts.
//!
//! Scripts run directly over the lowered [`Node`] tree. Every function call,
//! host callback and `__init__` goes through [`Session::enter`], which is the
//! only place the call depth is tracked.

use std::{
    cmp::Ordering,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    config::LimitError,
    error::{BridgeError, BridgeResult, ExcType, Exception},
    expressions::{ClassDef, CmpOperator, Expr, ImportName, Node, Operator, Target},
    heap::{HeapData, HeapId},
    host::{HostRef, HostTypeId},
    session::Session,
    types::{BuiltinClass, ClassObject, ClassOrigin, Dict, HostLink, HostMethod, Instance, ScriptFunction, SuperProxy},
    value::{Builtin, BuiltinFunction, DictKey, Value},
};

/// How a block finished.
pub(crate) enum Flow {
    Normal,
    Return(Value),
}

/// Name resolution context for the code currently running.
pub(crate) struct Frame {
    globals: HeapId,
    /// `None` at module level, where assignments go to the globals.
    locals: Option<IndexMap<String, Value>>,
    /// Defining class and first argument of the running method, for zero-argument `super()`.
    super_context: Option<(HeapId, Value)>,
}

impl Frame {
    fn module(globals: HeapId) -> Self {
        Self {
            globals,
            locals: None,
            super_context: None,
        }
    }
}

/// One call level held by [`Session::enter`].
///
/// Dropping it gives the level back, also when a host callback unwinds.
struct CallLevel<'a> {
    session: &'a mut Session,
}

impl Deref for CallLevel<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for CallLevel<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for CallLevel<'_> {
    fn drop(&mut self) {
        self.session.depth -= 1;
    }
}

impl Session {
    pub(crate) fn exec_module(&mut self, nodes: &[Node], globals: HeapId) -> BridgeResult<()> {
        let mut frame = Frame::module(globals);
        match self.exec_block(&mut frame, nodes)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(return_outside_function()),
        }
    }

    pub(crate) fn eval_in(&mut self, expr: &Expr, globals: HeapId) -> BridgeResult<Value> {
        self.eval_expr(&Frame::module(globals), expr)
    }

    /// Runs `f` one call level deeper, failing once the configured depth is exceeded.
    pub(crate) fn enter<R>(&mut self, f: impl FnOnce(&mut Self) -> BridgeResult<R>) -> BridgeResult<R> {
        if self.depth >= self.config.max_recursion_depth {
            return Err(LimitError::Recursion {
                limit: self.config.max_recursion_depth,
                depth: self.depth + 1,
            }
            .into());
        }
        self.depth += 1;
        let mut level = CallLevel { session: self };
        f(&mut *level)
    }

    fn exec_block(&mut self, frame: &mut Frame, nodes: &[Node]) -> BridgeResult<Flow> {
        for node in nodes {
            match node {
                Node::Pass => {}
                Node::Expr(expr) => {
                    self.eval_expr(frame, expr)?;
                }
                Node::Assign { targets, value } => {
                    let value = self.eval_expr(frame, value)?;
                    for target in targets {
                        self.assign(frame, target, value.clone())?;
                    }
                }
                Node::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval_expr(frame, expr)?,
                        None => Value::None,
                    };
                    return Ok(Flow::Return(value));
                }
                Node::If { test, body, or_else } => {
                    let test = self.eval_expr(frame, test)?;
                    let branch = if test.is_truthy(&self.heap) { body } else { or_else };
                    if let Flow::Return(value) = self.exec_block(frame, branch)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Node::Raise(expr) => return Err(self.raise(frame, expr.as_ref())),
                Node::FunctionDef(def) => {
                    let func = ScriptFunction::new(Arc::clone(def), frame.globals);
                    let id = self.heap.allocate(HeapData::Function(func));
                    self.bind_name(frame, &def.name, Value::Ref(id));
                }
                Node::ClassDef(def) => {
                    let class_id = self.exec_class_def(frame, def)?;
                    self.bind_name(frame, &def.name, Value::Ref(class_id));
                }
                Node::ImportFrom { module, names } => self.import_from(frame, module, names)?,
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_class_def(&mut self, frame: &Frame, def: &ClassDef) -> BridgeResult<HeapId> {
        let mut bases = Vec::with_capacity(def.bases.len());
        for base in &def.bases {
            let value = self.eval_expr(frame, base)?;
            match value.ref_id().filter(|&id| matches!(self.heap.get(id), HeapData::Class(_))) {
                Some(id) => bases.push(id),
                None => {
                    return Err(BridgeError::type_error(format!(
                        "bases must be types, not '{}'",
                        self.type_name_of(&value)
                    )));
                }
            }
        }
        if bases.is_empty() {
            bases.push(self.object_type().id());
        }

        let mut body = Frame {
            globals: frame.globals,
            locals: Some(IndexMap::new()),
            super_context: None,
        };
        if let Flow::Return(_) = self.exec_block(&mut body, &def.body)? {
            return Err(return_outside_function());
        }
        let namespace = body.locals.unwrap_or_default();
        self.create_class(&def.name, ClassOrigin::Script, bases, namespace)
    }

    fn import_from(&mut self, frame: &mut Frame, module: &str, names: &[ImportName]) -> BridgeResult<()> {
        if !self.hosts.has_module(module) {
            return Err(BridgeError::exception(
                ExcType::ImportError,
                format!("No module named '{module}'"),
            ));
        }
        for import in names {
            let Some(host_type) = self.hosts.resolve_path(module, &import.name) else {
                return Err(BridgeError::exception(
                    ExcType::ImportError,
                    format!("cannot import name '{}' from '{module}'", import.name),
                ));
            };
            let handle = self.get_or_create_bridged_type(host_type)?;
            self.bind_name(frame, import.binding(), handle.value());
        }
        Ok(())
    }

    fn raise(&mut self, frame: &Frame, expr: Option<&Expr>) -> BridgeError {
        let Some(expr) = expr else {
            return BridgeError::exception(ExcType::RuntimeError, "No active exception to reraise");
        };
        let value = match self.eval_expr(frame, expr) {
            Ok(value) => value,
            Err(err) => return err,
        };
        match &value {
            Value::Builtin(Builtin::Exception(exc_type)) => Exception::new(*exc_type, None).into(),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Exception(exc) => exc.clone().into(),
                _ => BridgeError::type_error("exceptions must derive from BaseException"),
            },
            _ => BridgeError::type_error("exceptions must derive from BaseException"),
        }
    }

    fn assign(&mut self, frame: &mut Frame, target: &Target, value: Value) -> BridgeResult<()> {
        match target {
            Target::Name(name) => {
                self.bind_name(frame, name, value);
                Ok(())
            }
            Target::Attr { object, attr } => {
                let object = self.eval_expr(frame, object)?;
                self.store_attr(&object, attr, value)
            }
            Target::Subscript { object, index } => {
                let object = self.eval_expr(frame, object)?;
                let index = self.eval_expr(frame, index)?;
                self.set_item(&object, &index, value)
            }
        }
    }

    fn bind_name(&mut self, frame: &mut Frame, name: &str, value: Value) {
        if let Some(locals) = &mut frame.locals {
            locals.insert(name.to_owned(), value);
        } else if let HeapData::Namespace(globals) = self.heap.get_mut(frame.globals) {
            globals.insert(name.to_owned(), value);
        }
    }

    fn lookup_name(&self, frame: &Frame, name: &str) -> BridgeResult<Value> {
        if let Some(locals) = &frame.locals
            && let Some(value) = locals.get(name)
        {
            return Ok(value.clone());
        }
        if let HeapData::Namespace(globals) = self.heap.get(frame.globals)
            && let Some(value) = globals.get(name)
        {
            return Ok(value.clone());
        }
        self.builtin_names
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::name_error(name))
    }

    fn eval_expr(&mut self, frame: &Frame, expr: &Expr) -> BridgeResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup_name(frame, name),
            Expr::Attr { object, attr } => {
                let object = self.eval_expr(frame, object)?;
                self.load_attr(&object, attr)
            }
            Expr::Call { callable, args } => {
                let callee = self.eval_expr(frame, callable)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(frame, arg))
                    .collect::<BridgeResult<Vec<_>>>()?;
                if args.is_empty() && callee == Value::Builtin(Builtin::Function(BuiltinFunction::Super)) {
                    return self.zero_arg_super(frame);
                }
                self.call_value(callee, args)
            }
            Expr::Subscript { object, index } => {
                let object = self.eval_expr(frame, object)?;
                let index = self.eval_expr(frame, index)?;
                self.get_item(&object, &index)
            }
            Expr::Op {
                left,
                op: Operator::And,
                right,
            } => {
                let left = self.eval_expr(frame, left)?;
                if left.is_truthy(&self.heap) {
                    self.eval_expr(frame, right)
                } else {
                    Ok(left)
                }
            }
            Expr::Op {
                left,
                op: Operator::Or,
                right,
            } => {
                let left = self.eval_expr(frame, left)?;
                if left.is_truthy(&self.heap) {
                    Ok(left)
                } else {
                    self.eval_expr(frame, right)
                }
            }
            Expr::Op { left, op, right } => {
                let left = self.eval_expr(frame, left)?;
                let right = self.eval_expr(frame, right)?;
                self.binary_op(&left, *op, &right)
            }
            Expr::CmpOp { left, op, right } => {
                let left = self.eval_expr(frame, left)?;
                let right = self.eval_expr(frame, right)?;
                self.compare(&left, *op, &right).map(Value::Bool)
            }
            Expr::Neg(operand) => match self.eval_expr(frame, operand)? {
                Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
                Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
                other => Err(BridgeError::type_error(format!(
                    "bad operand type for unary -: '{}'",
                    self.type_name_of(&other)
                ))),
            },
            Expr::Not(operand) => {
                let value = self.eval_expr(frame, operand)?;
                Ok(Value::Bool(!value.is_truthy(&self.heap)))
            }
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval_expr(frame, item))
                    .collect::<BridgeResult<Vec<_>>>()?;
                Ok(Value::Ref(self.heap.allocate(HeapData::List(items))))
            }
            Expr::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval_expr(frame, key)?;
                    let value = self.eval_expr(frame, value)?;
                    let hashed = DictKey::from_value(&key, &self.heap)?;
                    dict.insert(hashed, key, value);
                }
                Ok(Value::Ref(self.heap.allocate(HeapData::Dict(dict))))
            }
        }
    }

    fn zero_arg_super(&mut self, frame: &Frame) -> BridgeResult<Value> {
        match frame.super_context.clone() {
            Some((class_id, obj)) => self.super_object(&Value::Ref(class_id), obj),
            None => Err(BridgeError::exception(ExcType::RuntimeError, "super(): no arguments")),
        }
    }

    /// Creates `super(cls, obj)`.
    pub(crate) fn super_object(&mut self, cls: &Value, obj: Value) -> BridgeResult<Value> {
        let Some(class_id) = cls.ref_id().filter(|&id| matches!(self.heap.get(id), HeapData::Class(_))) else {
            return Err(BridgeError::type_error(format!(
                "super() argument 1 must be a type, not {}",
                self.type_name_of(cls)
            )));
        };
        let obj_class = self.class_of_value(&obj);
        if !self.heap.class(obj_class)?.is_subclass_of(class_id) {
            return Err(BridgeError::type_error(
                "super(type, obj): obj must be an instance or subtype of type",
            ));
        }
        let proxy = SuperProxy::new(obj, class_id);
        Ok(Value::Ref(self.heap.allocate(HeapData::Super(proxy))))
    }

    /// Calls any callable value with positional arguments.
    pub(crate) fn call_value(&mut self, callee: Value, args: Vec<Value>) -> BridgeResult<Value> {
        match callee {
            Value::Builtin(Builtin::Function(func)) => self.call_builtin(func, args),
            Value::Builtin(Builtin::Exception(exc_type)) => {
                let message = args.first().map(|arg| arg.str(&self.heap));
                let exc = Exception::new(exc_type, message);
                Ok(Value::Ref(self.heap.allocate(HeapData::Exception(exc))))
            }
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Class(_) => self.instantiate(id, args),
                HeapData::Function(_) => self.call_function(id, args),
                HeapData::HostMethod(method) => {
                    let method = method.clone();
                    self.call_host_method(&method, args)
                }
                HeapData::BoundMethod(bound) => {
                    let func = bound.func().clone();
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(bound.receiver().clone());
                    full.extend(args);
                    self.call_value(func, full)
                }
                _ => Err(self.not_callable(&callee)),
            },
            _ => Err(self.not_callable(&callee)),
        }
    }

    fn not_callable(&self, callee: &Value) -> BridgeError {
        BridgeError::type_error(format!("'{}' object is not callable", self.type_name_of(callee)))
    }

    fn call_function(&mut self, id: HeapId, args: Vec<Value>) -> BridgeResult<Value> {
        let HeapData::Function(func) = self.heap.get(id) else {
            return Err(BridgeError::internal("function slot changed"));
        };
        let def = Arc::clone(func.def());
        let globals = func.globals();
        let defining_class = func.defining_class();

        let expected = def.params.len();
        if args.len() < expected {
            let missing = &def.params[args.len()..];
            return Err(BridgeError::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                def.name,
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                missing.iter().map(|p| format!("'{p}'")).collect::<Vec<_>>().join(", ")
            )));
        }
        if args.len() > expected {
            return Err(BridgeError::type_error(format!(
                "{}() takes {expected} positional argument{} but {} were given",
                def.name,
                if expected == 1 { "" } else { "s" },
                args.len()
            )));
        }

        let super_context = defining_class.zip(args.first().cloned());
        let mut frame = Frame {
            globals,
            locals: Some(def.params.iter().cloned().zip(args).collect()),
            super_context,
        };
        self.enter(|session| match session.exec_block(&mut frame, &def.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
        })
    }

    fn call_host_method(&mut self, method: &HostMethod, mut args: Vec<Value>) -> BridgeResult<Value> {
        let type_name = self.hosts.get(method.host_type())?.name().to_owned();
        if args.is_empty() {
            return Err(BridgeError::type_error(format!(
                "descriptor '{}' of '{type_name}' object needs an argument",
                method.name()
            )));
        }
        let receiver = args.remove(0);
        let host = self.host_for(&receiver, method.host_type(), method.name())?;
        let func = Arc::clone(method.func());
        self.enter(|session| {
            session.tracer.on_call(&type_name, method.name(), session.depth);
            func(session, &host, args)
        })
    }

    /// The live host object behind `receiver`, checked against the host type
    /// that declares `member`.
    pub(crate) fn host_for(&self, receiver: &Value, required: HostTypeId, member: &str) -> BridgeResult<HostRef> {
        let required_name = self.hosts.get(required)?.name();
        let descriptor_error = || {
            BridgeError::type_error(format!(
                "descriptor '{member}' for '{required_name}' objects doesn't apply to a '{}' object",
                self.type_name_of(receiver)
            ))
        };
        let Some(link) = receiver
            .ref_id()
            .and_then(|id| self.heap.instance(id))
            .and_then(Instance::host)
        else {
            return Err(descriptor_error());
        };
        let host = link.upgrade().ok_or_else(|| BridgeError::HostObjectDropped {
            type_name: self.type_name_of(receiver).to_owned(),
        })?;
        if !self.hosts.is_derived_from(self.hosts.type_of(&host)?, required) {
            return Err(descriptor_error());
        }
        Ok(host)
    }

    fn instantiate(&mut self, class_id: HeapId, args: Vec<Value>) -> BridgeResult<Value> {
        let cls = self.heap.class(class_id)?;
        if let ClassOrigin::Builtin(kind) = cls.origin() {
            return self.call_builtin_class(kind, args);
        }
        let class_name = cls.name().to_owned();
        let host_type = cls
            .mro()
            .iter()
            .find_map(|&id| self.heap.class(id).ok().and_then(ClassObject::host_type));

        let host = match host_type {
            Some(host_type) => Some(self.construct_host(host_type, &class_name, args.clone())?),
            None => None,
        };
        let link = host.as_ref().map(|host| HostLink::owned(Arc::clone(host)));
        let instance = self.heap.allocate(HeapData::Instance(Instance::new(class_id, link)));
        if let Some(host) = &host {
            self.proxies.associate(host, instance);
        }

        let obj = Value::Ref(instance);
        let init = self.heap.class(class_id)?.mro_lookup("__init__", &self.heap);
        match init {
            Some((_, Value::Builtin(Builtin::Function(BuiltinFunction::ObjectInit)))) | None => {
                if host.is_none() && !args.is_empty() {
                    return Err(BridgeError::type_error(format!("{class_name}() takes no arguments")));
                }
            }
            Some((_, init)) => {
                let init = self.bind(&obj, init)?;
                let result = self.call_value(init, args)?;
                if result != Value::None {
                    return Err(BridgeError::type_error(format!(
                        "__init__() should return None, not '{}'",
                        self.type_name_of(&result)
                    )));
                }
            }
        }
        Ok(obj)
    }

    fn construct_host(&mut self, host_type: HostTypeId, class_name: &str, args: Vec<Value>) -> BridgeResult<HostRef> {
        let def = Arc::clone(self.hosts.get(host_type)?);
        let Some(constructor) = def.host_constructor().cloned() else {
            return Err(BridgeError::type_error(format!("cannot create '{class_name}' instances")));
        };
        let host = self.enter(|session| constructor(session, args))?;
        let actual = self.hosts.type_of(&host)?;
        if !self.hosts.is_derived_from(actual, host_type) {
            return Err(BridgeError::type_error(format!(
                "constructor of '{}' returned a '{}' object",
                def.name(),
                self.hosts.get(actual)?.name()
            )));
        }
        Ok(host)
    }

    fn call_builtin_class(&mut self, kind: BuiltinClass, args: Vec<Value>) -> BridgeResult<Value> {
        let value = match (kind, args.as_slice()) {
            (BuiltinClass::Object, []) => {
                let object = self.object_type().id();
                Value::Ref(self.heap.allocate(HeapData::Instance(Instance::new(object, None))))
            }
            (BuiltinClass::Type, [value]) => Value::Ref(self.class_of_value(value)),
            (BuiltinClass::Int, []) => Value::Int(0),
            (BuiltinClass::Int, [Value::Str(s)]) => s.trim().parse().map(Value::Int).map_err(|_| {
                BridgeError::exception(
                    ExcType::ValueError,
                    format!("invalid literal for int() with base 10: {}", Value::from(s.as_str()).repr(&self.heap)),
                )
            })?,
            (BuiltinClass::Int, [value]) => match value.as_int() {
                Some(i) => Value::Int(i),
                None => {
                    return Err(BridgeError::type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        self.type_name_of(value)
                    )));
                }
            },
            (BuiltinClass::Bool, []) => Value::Bool(false),
            (BuiltinClass::Bool, [value]) => Value::Bool(value.is_truthy(&self.heap)),
            (BuiltinClass::Str, []) => Value::from(""),
            (BuiltinClass::Str, [value]) => Value::Str(value.str(&self.heap)),
            (BuiltinClass::Dict, []) => Value::Ref(self.heap.allocate(HeapData::Dict(Dict::new()))),
            (BuiltinClass::Dict, [Value::Ref(id)]) if matches!(self.heap.get(*id), HeapData::Dict(_)) => {
                let HeapData::Dict(dict) = self.heap.get(*id) else {
                    return Err(BridgeError::internal("dict slot changed"));
                };
                let copy = dict.clone();
                Value::Ref(self.heap.allocate(HeapData::Dict(copy)))
            }
            (BuiltinClass::List, []) => Value::Ref(self.heap.allocate(HeapData::List(Vec::new()))),
            (BuiltinClass::List, [value]) => {
                let items = self.iterate(value)?;
                Value::Ref(self.heap.allocate(HeapData::List(items)))
            }
            (
                BuiltinClass::Type
                | BuiltinClass::Int
                | BuiltinClass::Bool
                | BuiltinClass::Str
                | BuiltinClass::Dict
                | BuiltinClass::List,
                _,
            ) => {
                return Err(BridgeError::type_error(format!(
                    "{kind}() takes at most 1 argument ({} given)",
                    args.len()
                )));
            }
            (BuiltinClass::Object, _) => return Err(BridgeError::type_error("object() takes no arguments")),
            _ => return Err(BridgeError::type_error(format!("cannot create '{kind}' instances"))),
        };
        Ok(value)
    }

    fn call_builtin(&mut self, func: BuiltinFunction, args: Vec<Value>) -> BridgeResult<Value> {
        match func {
            BuiltinFunction::Isinstance => {
                let [obj, classinfo] = exact_args("isinstance", args)?;
                self.isinstance(&obj, &classinfo, 0).map(Value::Bool)
            }
            BuiltinFunction::Issubclass => {
                let [cls, classinfo] = exact_args("issubclass", args)?;
                let Some(class_id) = cls.ref_id().filter(|&id| matches!(self.heap.get(id), HeapData::Class(_))) else {
                    return Err(BridgeError::type_error("issubclass() arg 1 must be a class"));
                };
                self.issubclass(class_id, &classinfo, 0).map(Value::Bool)
            }
            BuiltinFunction::Super => match <[Value; 2]>::try_from(args) {
                Ok([cls, obj]) => self.super_object(&cls, obj),
                Err(args) if args.is_empty() => {
                    Err(BridgeError::exception(ExcType::RuntimeError, "super(): no arguments"))
                }
                Err(args) => Err(BridgeError::type_error(format!(
                    "super() takes 0 or 2 arguments ({} given)",
                    args.len()
                ))),
            },
            BuiltinFunction::Getattr => {
                let len = args.len();
                let mut args = args.into_iter();
                let (Some(obj), Some(name), default, None) = (args.next(), args.next(), args.next(), args.next()) else {
                    return Err(BridgeError::type_error(format!(
                        "getattr expected 2 or 3 arguments, got {len}"
                    )));
                };
                let name = self.attr_name(&name)?;
                match (self.load_attr(&obj, &name), default) {
                    (Err(err), Some(default)) if err.is_attribute_error() => Ok(default),
                    (result, _) => result,
                }
            }
            BuiltinFunction::Setattr => {
                let [obj, name, value] = exact_args("setattr", args)?;
                let name = self.attr_name(&name)?;
                self.store_attr(&obj, &name, value)?;
                Ok(Value::None)
            }
            BuiltinFunction::Hasattr => {
                let [obj, name] = exact_args("hasattr", args)?;
                let name = self.attr_name(&name)?;
                match self.load_attr(&obj, &name) {
                    Ok(_) => Ok(Value::Bool(true)),
                    Err(err) if err.is_attribute_error() => Ok(Value::Bool(false)),
                    Err(err) => Err(err),
                }
            }
            BuiltinFunction::Len => {
                let [value] = exact_args("len", args)?;
                let len = match &value {
                    Value::Str(s) => s.chars().count(),
                    Value::Ref(id) => match self.heap.get(*id) {
                        HeapData::List(items) => items.len(),
                        HeapData::Dict(dict) => dict.len(),
                        _ => return Err(self.no_len(&value)),
                    },
                    _ => return Err(self.no_len(&value)),
                };
                i64::try_from(len).map(Value::Int).map_err(|_| overflow())
            }
            BuiltinFunction::Repr => {
                let [value] = exact_args("repr", args)?;
                Ok(Value::Str(value.repr(&self.heap)))
            }
            BuiltinFunction::ObjectSetattr => {
                let [obj, name, value] = exact_args("__setattr__", args)?;
                let name = self.attr_name(&name)?;
                self.generic_setattr(&obj, &name, value)?;
                Ok(Value::None)
            }
            BuiltinFunction::ObjectInit => Ok(Value::None),
        }
    }

    fn no_len(&self, value: &Value) -> BridgeError {
        BridgeError::type_error(format!("object of type '{}' has no len()", self.type_name_of(value)))
    }

    fn attr_name(&self, name: &Value) -> BridgeResult<String> {
        match name {
            Value::Str(s) => Ok(s.clone()),
            other => Err(BridgeError::type_error(format!(
                "attribute name must be string, not '{}'",
                self.type_name_of(other)
            ))),
        }
    }

    /// `depth` counts the enclosing lists, which may contain themselves.
    fn isinstance(&self, obj: &Value, classinfo: &Value, depth: usize) -> BridgeResult<bool> {
        self.check_nesting(depth)?;
        match classinfo {
            Value::Builtin(Builtin::Exception(expected)) => Ok(match obj {
                Value::Ref(id) => match self.heap.get(*id) {
                    HeapData::Exception(exc) => exc_matches(exc.exc_type(), *expected),
                    _ => false,
                },
                _ => false,
            }),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Class(_) => {
                    let class_id = self.class_of_value(obj);
                    Ok(self.heap.class(class_id)?.is_subclass_of(*id))
                }
                HeapData::List(items) => {
                    for item in items {
                        if self.isinstance(obj, item, depth + 1)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                _ => Err(classinfo_error("isinstance")),
            },
            _ => Err(classinfo_error("isinstance")),
        }
    }

    fn issubclass(&self, class_id: HeapId, classinfo: &Value, depth: usize) -> BridgeResult<bool> {
        self.check_nesting(depth)?;
        let Value::Ref(id) = classinfo else {
            return Err(classinfo_error("issubclass"));
        };
        match self.heap.get(*id) {
            HeapData::Class(_) => Ok(self.heap.class(class_id)?.is_subclass_of(*id)),
            HeapData::List(items) => {
                for item in items {
                    if self.issubclass(class_id, item, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(classinfo_error("issubclass")),
        }
    }

    fn binary_op(&mut self, left: &Value, op: Operator, right: &Value) -> BridgeResult<Value> {
        let symbol = match op {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mult => "*",
            Operator::And | Operator::Or => return Err(BridgeError::internal("boolean operator in binary_op")),
        };
        if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
            let result = match op {
                Operator::Add => a.checked_add(b),
                Operator::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            return result.map(Value::Int).ok_or_else(overflow);
        }
        if op == Operator::Add {
            if let (Value::Str(a), Value::Str(b)) = (left, right) {
                return Ok(Value::Str(format!("{a}{b}")));
            }
            if let (Some(a), Some(b)) = (self.list_items(left), self.list_items(right)) {
                let joined = a.iter().chain(b).cloned().collect();
                return Ok(Value::Ref(self.heap.allocate(HeapData::List(joined))));
            }
        }
        Err(BridgeError::type_error(format!(
            "unsupported operand type(s) for {symbol}: '{}' and '{}'",
            self.type_name_of(left),
            self.type_name_of(right)
        )))
    }

    fn list_items(&self, value: &Value) -> Option<&[Value]> {
        match self.heap.get(value.ref_id()?) {
            HeapData::List(items) => Some(items),
            _ => None,
        }
    }

    fn compare(&self, left: &Value, op: CmpOperator, right: &Value) -> BridgeResult<bool> {
        let ordering = match op {
            CmpOperator::Eq => return self.values_equal(left, right, 0),
            CmpOperator::NotEq => return self.values_equal(left, right, 0).map(|eq| !eq),
            CmpOperator::Is => return Ok(left.is(right)),
            CmpOperator::IsNot => return Ok(!left.is(right)),
            CmpOperator::In => return self.contains(right, left),
            CmpOperator::NotIn => return self.contains(right, left).map(|found| !found),
            CmpOperator::Lt | CmpOperator::LtE | CmpOperator::Gt | CmpOperator::GtE => {
                self.ordering(left, op, right)?
            }
        };
        Ok(match op {
            CmpOperator::Lt => ordering.is_lt(),
            CmpOperator::LtE => ordering.is_le(),
            CmpOperator::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }

    fn ordering(&self, left: &Value, op: CmpOperator, right: &Value) -> BridgeResult<Ordering> {
        match (left, right) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (left.as_int(), right.as_int()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => {
                    let symbol = match op {
                        CmpOperator::Lt => "<",
                        CmpOperator::LtE => "<=",
                        CmpOperator::Gt => ">",
                        _ => ">=",
                    };
                    Err(BridgeError::type_error(format!(
                        "'{symbol}' not supported between instances of '{}' and '{}'",
                        self.type_name_of(left),
                        self.type_name_of(right)
                    )))
                }
            },
        }
    }

    /// Fails once container nesting goes past the recursion limit.
    fn check_nesting(&self, depth: usize) -> BridgeResult<()> {
        if depth > self.config.max_recursion_depth {
            return Err(LimitError::Recursion {
                limit: self.config.max_recursion_depth,
                depth,
            }
            .into());
        }
        Ok(())
    }

    /// Python `==`: structural for ints, strings, lists and dicts, identity otherwise.
    fn values_equal(&self, left: &Value, right: &Value, depth: usize) -> BridgeResult<bool> {
        self.check_nesting(depth)?;
        if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
            return Ok(a == b);
        }
        let (Value::Ref(a), Value::Ref(b)) = (left, right) else {
            return Ok(left == right);
        };
        if a == b {
            return Ok(true);
        }
        match (self.heap.get(*a), self.heap.get(*b)) {
            (HeapData::List(xs), HeapData::List(ys)) => {
                if xs.len() != ys.len() {
                    return Ok(false);
                }
                for (x, y) in xs.iter().zip(ys) {
                    if !self.values_equal(x, y, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Dict(xs), HeapData::Dict(ys)) => {
                if xs.len() != ys.len() {
                    return Ok(false);
                }
                for (key, x) in xs.iter() {
                    let Some(y) = ys.get(key, &self.heap)? else {
                        return Ok(false);
                    };
                    if !self.values_equal(x, y, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn contains(&self, container: &Value, item: &Value) -> BridgeResult<bool> {
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
                other => Err(BridgeError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    self.type_name_of(other)
                ))),
            },
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::List(items) => {
                    for candidate in items {
                        if self.values_equal(candidate, item, 0)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                HeapData::Dict(dict) => Ok(dict.get(item, &self.heap)?.is_some()),
                _ => Err(self.not_iterable(container)),
            },
            _ => Err(self.not_iterable(container)),
        }
    }

    fn iterate(&self, value: &Value) -> BridgeResult<Vec<Value>> {
        match value {
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::List(items) => Ok(items.clone()),
                HeapData::Dict(dict) => Ok(dict.iter().map(|(key, _)| key.clone()).collect()),
                _ => Err(self.not_iterable(value)),
            },
            _ => Err(self.not_iterable(value)),
        }
    }

    fn not_iterable(&self, value: &Value) -> BridgeError {
        BridgeError::type_error(format!("argument of type '{}' is not iterable", self.type_name_of(value)))
    }

    fn get_item(&self, object: &Value, index: &Value) -> BridgeResult<Value> {
        match object {
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let pos = self.sequence_index(index, chars.len(), "string")?;
                Ok(Value::Str(chars[pos].to_string()))
            }
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::List(items) => {
                    let pos = self.sequence_index(index, items.len(), "list")?;
                    Ok(items[pos].clone())
                }
                HeapData::Dict(dict) => dict.get_item(index, &self.heap),
                _ => Err(self.not_subscriptable(object)),
            },
            _ => Err(self.not_subscriptable(object)),
        }
    }

    fn set_item(&mut self, object: &Value, index: &Value, value: Value) -> BridgeResult<()> {
        let Some(id) = object.ref_id() else {
            return Err(self.no_item_assignment(object));
        };
        match self.heap.get(id) {
            HeapData::List(items) => {
                let len = items.len();
                let pos = match index.as_int() {
                    Some(i) => normalize_index(i, len).ok_or_else(|| {
                        BridgeError::exception(ExcType::IndexError, "list assignment index out of range")
                    })?,
                    None => return Err(self.bad_index("list", index)),
                };
                if let HeapData::List(items) = self.heap.get_mut(id) {
                    items[pos] = value;
                }
                Ok(())
            }
            HeapData::Dict(_) => {
                let hashed = DictKey::from_value(index, &self.heap)?;
                if let HeapData::Dict(dict) = self.heap.get_mut(id) {
                    dict.insert(hashed, index.clone(), value);
                }
                Ok(())
            }
            _ => Err(self.no_item_assignment(object)),
        }
    }

    fn sequence_index(&self, index: &Value, len: usize, kind: &str) -> BridgeResult<usize> {
        let Some(i) = index.as_int() else {
            return Err(self.bad_index(kind, index));
        };
        normalize_index(i, len)
            .ok_or_else(|| BridgeError::exception(ExcType::IndexError, format!("{kind} index out of range")))
    }

    fn bad_index(&self, kind: &str, index: &Value) -> BridgeError {
        BridgeError::type_error(format!(
            "{kind} indices must be integers or slices, not {}",
            self.type_name_of(index)
        ))
    }

    fn not_subscriptable(&self, object: &Value) -> BridgeError {
        BridgeError::type_error(format!("'{}' object is not subscriptable", self.type_name_of(object)))
    }

    fn no_item_assignment(&self, object: &Value) -> BridgeError {
        BridgeError::type_error(format!(
            "'{}' object does not support item assignment",
            self.type_name_of(object)
        ))
    }

    /// Name of the class of `value`, as used in error messages.
    pub(crate) fn type_name_of(&self, value: &Value) -> &str {
        match value {
            Value::Ref(id) => self.heap.data_type_name(*id),
            _ => self.class_name(self.class_of_value(value)),
        }
    }
}

/// Unpacks exactly `N` positional arguments for a builtin.
fn exact_args<const N: usize>(name: &str, args: Vec<Value>) -> BridgeResult<[Value; N]> {
    <[Value; N]>::try_from(args).map_err(|args| {
        BridgeError::type_error(format!("{name} expected {N} arguments, got {}", args.len()))
    })
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

/// `Exception` catches everything; the others only match themselves.
fn exc_matches(actual: ExcType, expected: ExcType) -> bool {
    expected == ExcType::Exception || actual == expected
}

fn classinfo_error(func: &str) -> BridgeError {
    BridgeError::type_error(format!("{func}() arg 2 must be a type, a tuple of types, or a union"))
}

fn overflow() -> BridgeError {
    BridgeError::exception(ExcType::OverflowError, "integer overflow")
}

fn return_outside_function() -> BridgeError {
    BridgeError::exception(ExcType::SyntaxError, "'return' outside function")
}
