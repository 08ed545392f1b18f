/// Tests for host object wrapping and the proxy association table.
use std::sync::Arc;

use graft::{
    BridgeError, ExcType, HostIdentity, HostObject, HostRef, HostTypeDef, HostTypeId, Session, Value, downcast_host,
};
use pretty_assertions::assert_eq;

struct Widget {
    label: String,
}
impl HostObject for Widget {}

struct Stranger;
impl HostObject for Stranger {}

fn widget(label: &str) -> HostRef {
    Arc::new(Widget {
        label: label.to_owned(),
    })
}

fn register(session: &mut Session) -> HostTypeId {
    session
        .register_host_type(
            HostTypeDef::new::<Widget>("Widget")
                .module("ui")
                .constructor(|_, args| {
                    let label = args.first().and_then(Value::as_str).unwrap_or_default();
                    Ok(widget(label))
                })
                .method("describe", |_, host, _| {
                    let widget = downcast_host::<Widget>(host).expect("registered for Widget");
                    Ok(Value::from(format!("widget {}", widget.label)))
                })
                .property("size", |_, host| {
                    let widget = downcast_host::<Widget>(host).expect("registered for Widget");
                    Ok(Value::Int(i64::try_from(widget.label.len()).unwrap_or(i64::MAX)))
                }),
        )
        .unwrap()
}

#[test]
fn wrapping_twice_returns_the_same_proxy() {
    let mut session = Session::default();
    register(&mut session);
    let host = widget("a");
    let first = session.wrap(&host).unwrap();
    let second = session.wrap(&Arc::clone(&host)).unwrap();
    assert_eq!(first, second);
    assert_eq!(session.proxy_count(), 1);

    let scope = session.create_scope();
    session.scope_set(&scope, "a", first);
    session.scope_set(&scope, "b", second);
    assert_eq!(session.eval("a is b", &scope).unwrap(), Value::Bool(true));
}

#[test]
fn distinct_objects_get_distinct_proxies() {
    let mut session = Session::default();
    register(&mut session);
    let a = widget("a");
    let b = widget("a");
    assert_ne!(session.wrap(&a).unwrap(), session.wrap(&b).unwrap());
    assert_eq!(session.proxy_count(), 2);
}

#[test]
fn proxy_class_is_the_bridged_type() {
    let mut session = Session::default();
    register(&mut session);
    let proxy = session.wrap(&widget("a")).unwrap().value();
    let bridged = session.bridged_type_of::<Widget>().unwrap();
    assert_eq!(session.class_of(&proxy), bridged);
    assert!(session.is_instance(&proxy, session.object_type()));
}

#[test]
fn wrapping_does_not_extend_host_lifetime() {
    let mut session = Session::default();
    register(&mut session);
    let host = widget("short-lived");
    let proxy = session.wrap(&host).unwrap().value();
    assert_eq!(Arc::strong_count(&host), 1);

    let held = session.host_of(&proxy).unwrap();
    assert_eq!(HostIdentity::of(&held), HostIdentity::of(&host));
    drop(held);

    drop(host);
    assert!(session.host_of(&proxy).is_none());
    let err = session.invoke_method(&proxy, "describe", vec![]).unwrap_err();
    assert!(
        matches!(err, BridgeError::HostObjectDropped { ref type_name } if type_name == "Widget"),
        "unexpected error: {err}"
    );
    assert_eq!(err.exc_type(), ExcType::ReferenceError);
}

#[test]
fn stale_proxy_never_reaches_a_later_host() {
    let mut session = Session::default();
    register(&mut session);
    let old = widget("old");
    let old_identity = HostIdentity::of(&old);
    let stale = session.wrap(&old).unwrap().value();
    drop(old);
    assert_eq!(session.prune_dead_proxies(), 1);

    let mut later = Vec::new();
    for i in 0..64 {
        let host = widget(&format!("later {i}"));
        let proxy = session.wrap(&host).unwrap().value();
        assert_ne!(proxy, stale);
        // the stale proxy still pins the old allocation
        assert_ne!(HostIdentity::of(&host), old_identity);
        later.push(host);
    }

    assert!(session.host_of(&stale).is_none());
    let err = session.invoke_method(&stale, "describe", vec![]).unwrap_err();
    assert!(
        matches!(err, BridgeError::HostObjectDropped { ref type_name } if type_name == "Widget"),
        "unexpected error: {err}"
    );
    assert_eq!(session.proxy_count(), later.len());
}

#[test]
fn dead_entries_are_pruned() {
    let mut session = Session::default();
    register(&mut session);
    let kept = widget("kept");
    let dropped = widget("dropped");
    session.wrap(&kept).unwrap();
    session.wrap(&dropped).unwrap();
    drop(dropped);

    assert_eq!(session.prune_dead_proxies(), 1);
    assert_eq!(session.proxy_count(), 1);
    assert_eq!(session.prune_dead_proxies(), 0);
}

#[test]
fn host_methods_and_properties_reach_the_object() {
    let mut session = Session::default();
    register(&mut session);
    let host = widget("dial");
    let proxy = session.wrap(&host).unwrap();
    let scope = session.create_scope();
    session.scope_set(&scope, "w", proxy);

    assert_eq!(session.eval("w.describe()", &scope).unwrap(), Value::from("widget dial"));
    assert_eq!(session.eval("w.size", &scope).unwrap(), Value::Int(4));
}

#[test]
fn read_only_property_rejects_assignment() {
    let mut session = Session::default();
    register(&mut session);
    let proxy = session.wrap(&widget("dial")).unwrap().value();
    let err = session.set_attr(&proxy, "size", 3_i64).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
    assert_eq!(err.to_string(), "AttributeError: property 'size' of 'Widget' object has no setter");
}

#[test]
fn missing_attribute_without_hook_is_attribute_not_found() {
    let mut session = Session::default();
    register(&mut session);
    let proxy = session.wrap(&widget("a")).unwrap().value();
    let err = session.get_attr(&proxy, "missing").unwrap_err();
    assert!(
        matches!(err, BridgeError::AttributeNotFound { ref type_name, ref attr } if type_name == "Widget" && attr == "missing"),
        "unexpected error: {err}"
    );

    let err = session.invoke_method(&proxy, "missing", vec![]).unwrap_err();
    assert!(matches!(err, BridgeError::NoSuchMethod { ref method, .. } if method == "missing"));
}

#[test]
fn instance_attributes_live_on_the_proxy() {
    let mut session = Session::default();
    register(&mut session);
    let host = widget("a");
    let proxy = session.wrap(&host).unwrap().value();
    session.set_attr(&proxy, "note", "remember").unwrap();

    let again = session.wrap(&host).unwrap().value();
    assert_eq!(session.get_attr(&again, "note").unwrap(), Value::from("remember"));
}

#[test]
fn unregistered_object_cannot_be_wrapped() {
    let mut session = Session::default();
    register(&mut session);
    let host: HostRef = Arc::new(Stranger);
    let err = session.wrap(&host).unwrap_err();
    let BridgeError::UnknownHostType { type_name } = err else {
        panic!("expected UnknownHostType, got {err}");
    };
    assert!(type_name.ends_with("Stranger"), "{type_name}");
}

#[test]
fn script_created_instance_is_the_proxy_of_its_host() {
    let mut session = Session::default();
    register(&mut session);
    let scope = session.create_scope();
    session
        .exec("from ui import Widget\nw = Widget('made in script')", &scope)
        .unwrap();
    let w = session.scope_get(&scope, "w").unwrap();
    let host = session.host_of(&w).unwrap();
    assert_eq!(downcast_host::<Widget>(&host).unwrap().label, "made in script");
    assert_eq!(session.wrap(&host).unwrap().value(), w);
}

#[test]
fn shutdown_releases_owned_hosts() {
    let mut session = Session::default();
    register(&mut session);
    let borrowed = widget("borrowed");
    session.wrap(&borrowed).unwrap();
    let scope = session.create_scope();
    session
        .exec("from ui import Widget\nw = Widget('owned')", &scope)
        .unwrap();
    let w = session.scope_get(&scope, "w").unwrap();
    let owned = session.host_of(&w).unwrap();
    assert_eq!(Arc::strong_count(&owned), 2);

    let report = session.shutdown();
    assert_eq!(report.types_built, 1);
    assert_eq!(report.proxies, 2);
    assert_eq!(report.owned_hosts_released, 1);
    assert_eq!(Arc::strong_count(&owned), 1);
    assert_eq!(Arc::strong_count(&borrowed), 1);
}
