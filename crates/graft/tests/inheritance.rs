/// Host types with an extra script base injected by a base-type provider.
///
/// The host hierarchy is `PythonWrapperBase <- InheritanceTestBaseClassWrapper
/// <- Inherited`. A provider rewrites the bases of the middle type to
/// `[PythonWrapperBase, InheritanceTestBaseClass]`, where the second base is a
/// class defined by a script. That script class defines `__getattr__` and
/// `__setattr__`, so every test here also exercises the hook routing.
use std::sync::Arc;

use graft::{
    AdHocStore, BaseTypeProvider, BridgeError, BridgeResult, HostObject, HostRef, HostTypeDef, HostTypeId,
    ProviderContext, Session, TypeHandle, Value, downcast_host,
};
use pretty_assertions::assert_eq;

const MODULE: &str = "graft.tests";
const OVERRIDDEN_VIRT_VALUE: i64 = -42;
const X: i64 = 42;

const CLASS_SOURCE: &str = "\
class InheritanceTestBaseClass:
  def virt(self):
    return 42
  def set_x_to_42(self):
    self.XProp = 42
  def callVirt(self):
    return self.virt()
  def __getattr__(self, name):
    return '__getattr__:' + name
  def __setattr__(self, name, value):
    value[name] = name
InheritanceTestBaseClass = InheritanceTestBaseClass
";

struct PythonWrapperBase;
impl HostObject for PythonWrapperBase {}

struct InheritanceTestBaseClassWrapper;
impl HostObject for InheritanceTestBaseClassWrapper {}

#[derive(Default)]
struct Inherited {
    extras: AdHocStore,
}
impl HostObject for Inherited {}

/// Gives the wrapper type the script class as a second base.
struct ExtraBaseTypeProvider {
    wrapper: HostTypeId,
    extra_base: TypeHandle,
}

impl BaseTypeProvider for ExtraBaseTypeProvider {
    fn base_types(
        &self,
        cx: &mut ProviderContext<'_>,
        host_type: HostTypeId,
        existing: Vec<TypeHandle>,
    ) -> BridgeResult<Vec<TypeHandle>> {
        if host_type != self.wrapper {
            return Ok(existing);
        }
        let base = cx.host_type(host_type)?.base().expect("wrapper has a host base");
        Ok(vec![cx.bridged_type(base)?, self.extra_base])
    }
}

struct NoEffectBaseTypeProvider;

impl BaseTypeProvider for NoEffectBaseTypeProvider {
    fn base_types(
        &self,
        _cx: &mut ProviderContext<'_>,
        _host_type: HostTypeId,
        existing: Vec<TypeHandle>,
    ) -> BridgeResult<Vec<TypeHandle>> {
        Ok(existing)
    }
}

/// Reads `XProp` through the dynamic base chain, falling back to the ad-hoc store.
fn x_prop_get(session: &mut Session, host: &HostRef) -> BridgeResult<Value> {
    let scope = session.create_scope();
    let this = session.wrap(host)?;
    session.scope_set(&scope, "this", this);
    match session.eval("super(this.__class__, this).XProp", &scope) {
        Err(err) if err.is_attribute_error() => {
            let inherited = downcast_host::<Inherited>(host).expect("XProp is declared on Inherited");
            inherited.extras.get("XProp").ok_or(err)
        }
        result => result,
    }
}

fn x_prop_set(_session: &mut Session, host: &HostRef, value: Value) -> BridgeResult<()> {
    let inherited = downcast_host::<Inherited>(host).expect("XProp is declared on Inherited");
    inherited.extras.set("XProp", value);
    Ok(())
}

struct Fixture {
    session: Session,
    extra_base: TypeHandle,
}

fn setup() -> Fixture {
    let mut session = Session::default();
    let scope = session.create_scope();
    session.exec(CLASS_SOURCE, &scope).unwrap();
    let class = session.scope_get(&scope, "InheritanceTestBaseClass").unwrap();
    let extra_base = session.type_handle(&class).unwrap();

    let base = session
        .register_host_type(
            HostTypeDef::new::<PythonWrapperBase>("PythonWrapperBase")
                .module(MODULE)
                .method("WrapperBaseMethod", |_, _, _| Ok(Value::from("WrapperBaseMethod"))),
        )
        .unwrap();
    let wrapper = session
        .register_host_type(
            HostTypeDef::new::<InheritanceTestBaseClassWrapper>("InheritanceTestBaseClassWrapper")
                .module(MODULE)
                .extends(base),
        )
        .unwrap();
    session
        .register_host_type(
            HostTypeDef::new::<Inherited>("Inherited")
                .module(MODULE)
                .extends(wrapper)
                .constructor(|_, _| Ok(Arc::new(Inherited::default()) as HostRef))
                .method("virt", |_, _, _| Ok(Value::Int(OVERRIDDEN_VIRT_VALUE)))
                .property_with_setter("XProp", x_prop_get, x_prop_set),
        )
        .unwrap();

    session.register_base_type_provider(ExtraBaseTypeProvider { wrapper, extra_base });
    session.register_base_type_provider(NoEffectBaseTypeProvider);
    Fixture { session, extra_base }
}

fn inherited() -> HostRef {
    Arc::new(Inherited::default())
}

#[test]
fn extra_base_passes_instance_check() {
    let Fixture {
        mut session,
        extra_base,
    } = setup();
    let host = inherited();
    let instance = session.wrap(&host).unwrap().value();
    assert!(session.is_instance(&instance, extra_base));

    let scope = session.create_scope();
    session.scope_set(&scope, "instance", instance);
    session.scope_set(&scope, "Extra", extra_base);
    assert_eq!(
        session.eval("isinstance(instance, Extra)", &scope).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn inheriting_with_extra_base_creates_new_class() {
    let Fixture {
        mut session,
        extra_base,
    } = setup();
    let host = inherited();
    let instance = session.wrap(&host).unwrap().value();
    let class = session.get_attr(&instance, "__class__").unwrap();
    assert_ne!(class, extra_base.value());

    let bridged = session.bridged_type_of::<Inherited>().unwrap();
    let wrapper = session.bridged_type_of::<InheritanceTestBaseClassWrapper>().unwrap();
    assert_eq!(session.type_handle(&class), Some(bridged));
    assert_ne!(bridged, wrapper);
    assert_eq!(session.type_name(bridged).unwrap(), "Inherited");
}

#[test]
fn injected_base_lands_in_the_mro() {
    let Fixture {
        mut session,
        extra_base,
    } = setup();
    let bridged = session.bridged_type_of::<Inherited>().unwrap();
    let mro = session.mro_of(bridged).unwrap();
    let names: Vec<String> = mro.iter().map(|&t| session.type_name(t).unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "Inherited",
            "InheritanceTestBaseClassWrapper",
            "PythonWrapperBase",
            "InheritanceTestBaseClass",
            "object"
        ]
    );
    assert!(mro.contains(&extra_base));
}

#[test]
fn inherited_from_inherited_class_is_self() {
    let Fixture { mut session, .. } = setup();
    let scope = session.create_scope();
    session.exec("from graft.tests import Inherited", &scope).unwrap();
    session.exec("class B(Inherited): pass", &scope).unwrap();
    let b = session.eval("B", &scope).unwrap();
    let b_instance = session.call(&b, vec![]).unwrap();
    let b_instance_class = session.get_attr(&b_instance, "__class__").unwrap();
    assert_eq!(b_instance_class, b);
}

#[test]
fn grandchild_passes_extra_base_instance_check() {
    let Fixture {
        mut session,
        extra_base,
    } = setup();
    let scope = session.create_scope();
    session.exec("from graft.tests import Inherited", &scope).unwrap();
    session.exec("class B(Inherited): pass", &scope).unwrap();
    let b = session.eval("B", &scope).unwrap();
    let b_instance = session.call(&b, vec![]).unwrap();
    assert!(session.is_instance(&b_instance, extra_base));
}

#[test]
fn call_inherited_host_method_with_extra_script_base() {
    let Fixture { mut session, .. } = setup();
    let host = inherited();
    let instance = session.wrap(&host).unwrap().value();
    let result = session.invoke_method(&instance, "WrapperBaseMethod", vec![]).unwrap();
    assert_eq!(result, Value::from("WrapperBaseMethod"));
}

#[test]
fn call_extra_base_method() {
    let Fixture { mut session, .. } = setup();
    let host = inherited();
    let scope = session.create_scope();
    let instance = session.wrap(&host).unwrap();
    session.scope_set(&scope, "instance", instance);
    let actual = session.invoke_method(&instance.value(), "callVirt", vec![]).unwrap();
    assert_eq!(actual, Value::Int(OVERRIDDEN_VIRT_VALUE));
}

#[test]
fn set_ad_hoc_attributes_when_extra_base_present() {
    let Fixture { mut session, .. } = setup();
    let host = inherited();
    let scope = session.create_scope();
    let instance = session.wrap(&host).unwrap();
    session.scope_set(&scope, "instance", instance);
    session
        .exec("super(instance.__class__, instance).set_x_to_42()", &scope)
        .unwrap();
    let actual = session.eval("instance.XProp", &scope).unwrap();
    assert_eq!(actual, Value::Int(X));

    let stored = downcast_host::<Inherited>(&host).unwrap().extras.get("XProp");
    assert_eq!(stored, Some(Value::Int(X)));
}

#[test]
fn property_read_without_ad_hoc_value_is_attribute_error() {
    let Fixture { mut session, .. } = setup();
    let host = inherited();
    let instance = session.wrap(&host).unwrap().value();
    let err = session.get_attr(&instance, "XProp").unwrap_err();
    assert!(
        matches!(err, BridgeError::AttributeNotFound { ref type_name, ref attr } if type_name == "super" && attr == "XProp"),
        "unexpected error: {err}"
    );
}

#[test]
fn missing_attribute_falls_back_to_getattr_hook() {
    let Fixture { mut session, .. } = setup();
    let host = inherited();
    let instance = session.wrap(&host).unwrap().value();
    let value = session.get_attr(&instance, "undefined_name").unwrap();
    assert_eq!(value, Value::from("__getattr__:undefined_name"));

    // names resolved by normal lookup never reach the hook
    let virt = session.invoke_method(&instance, "virt", vec![]).unwrap();
    assert_eq!(virt, Value::Int(OVERRIDDEN_VIRT_VALUE));
}

#[test]
fn setattr_hook_stores_into_caller_supplied_target() {
    let Fixture { mut session, .. } = setup();
    let host = inherited();
    let scope = session.create_scope();
    let instance = session.wrap(&host).unwrap();
    session.scope_set(&scope, "instance", instance);
    session
        .exec("sink = {}\ninstance.color = sink\nstored = sink['color']", &scope)
        .unwrap();
    assert_eq!(session.scope_get(&scope, "stored"), Some(Value::from("color")));

    // the instance itself never received the attribute
    let read_back = session.eval("instance.color", &scope).unwrap();
    assert_eq!(read_back, Value::from("__getattr__:color"));
}

#[test]
fn script_override_of_host_method_wins() {
    let Fixture { mut session, .. } = setup();
    let scope = session.create_scope();
    session
        .exec(
            "\
from graft.tests import Inherited
class C(Inherited):
    def virt(self):
        return 7
c = C()
result = c.callVirt()
",
            &scope,
        )
        .unwrap();
    assert_eq!(session.scope_get(&scope, "result"), Some(Value::Int(7)));
}

#[test]
fn bridged_type_is_cached() {
    let Fixture { mut session, .. } = setup();
    let first = session.bridged_type_of::<Inherited>().unwrap();
    let count = session.cached_type_count();
    let second = session.bridged_type_of::<Inherited>().unwrap();
    assert_eq!(first, second);
    assert_eq!(session.cached_type_count(), count);
}
