/// Tests for base-type provider folding.
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use graft::{
    BridgeError, BridgeResult, ExcType, HostObject, HostTypeDef, HostTypeId, ProviderContext, Session, TypeHandle,
    provider_fn,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

struct Base;
impl HostObject for Base {}

struct Derived;
impl HostObject for Derived {}

/// Registers `Base` and `Derived(Base)` and returns their ids.
fn register(session: &mut Session) -> (HostTypeId, HostTypeId) {
    let base = session
        .register_host_type(HostTypeDef::new::<Base>("Base").module("host"))
        .unwrap();
    let derived = session
        .register_host_type(HostTypeDef::new::<Derived>("Derived").module("host").extends(base))
        .unwrap();
    (base, derived)
}

/// Defines a plain script class and returns its handle.
fn script_class(session: &mut Session, name: &str) -> TypeHandle {
    let scope = session.create_scope();
    session.exec(&format!("class {name}:\n    pass"), &scope).unwrap();
    let value = session.scope_get(&scope, name).unwrap();
    session.type_handle(&value).unwrap()
}

fn base_names(session: &Session, handle: TypeHandle) -> Vec<String> {
    session
        .get_bases(handle)
        .unwrap()
        .into_iter()
        .map(|base| session.type_name(base).unwrap())
        .collect()
}

#[test]
fn no_providers_keeps_natural_bases() {
    let mut session = Session::default();
    let (base, derived) = register(&mut session);
    let derived_type = session.get_or_create_bridged_type(derived).unwrap();
    let base_type = session.get_or_create_bridged_type(base).unwrap();

    assert_eq!(session.get_bases(derived_type).unwrap(), vec![base_type]);
    assert_eq!(session.get_bases(base_type).unwrap(), vec![session.object_type()]);
}

#[test]
fn identity_provider_keeps_natural_bases() {
    let mut session = Session::default();
    let (_, derived) = register(&mut session);
    session.register_base_type_provider(provider_fn(|_, _, existing| Ok(existing)));
    let derived_type = session.get_or_create_bridged_type(derived).unwrap();
    assert_eq!(base_names(&session, derived_type), vec!["Base"]);
}

#[test]
fn providers_run_in_registration_order() {
    let mut session = Session::default();
    let (_, derived) = register(&mut session);
    let first = script_class(&mut session, "First");
    let second = script_class(&mut session, "Second");

    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    session.register_base_type_provider(provider_fn(move |_, host_type, mut existing| {
        if host_type == derived {
            existing.push(first);
        }
        Ok(existing)
    }));
    let seen_by_second = Arc::clone(&seen);
    session.register_base_type_provider(provider_fn(
        move |cx: &mut ProviderContext<'_>, host_type, mut existing: Vec<TypeHandle>| {
            if host_type == derived {
                let names = existing
                    .iter()
                    .map(|&t| cx.type_name(t))
                    .collect::<BridgeResult<Vec<_>>>()?;
                seen_by_second.lock().push(names);
                existing.push(second);
            }
            Ok(existing)
        },
    ));

    let derived_type = session.get_or_create_bridged_type(derived).unwrap();
    assert_eq!(base_names(&session, derived_type), vec!["Base", "First", "Second"]);
    assert_eq!(*seen.lock(), vec![vec!["Base".to_owned(), "First".to_owned()]]);
}

#[test]
fn provider_runs_once_per_type() {
    let mut session = Session::default();
    let (base, derived) = register(&mut session);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    session.register_base_type_provider(provider_fn(move |_, _, existing| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(existing)
    }));

    session.get_or_create_bridged_type(derived).unwrap();
    session.get_or_create_bridged_type(derived).unwrap();
    session.get_or_create_bridged_type(base).unwrap();
    // one resolution for Base (built as Derived's ancestor) and one for Derived
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn provider_registered_later_only_affects_later_builds() {
    let mut session = Session::default();
    let (base, derived) = register(&mut session);
    let base_type = session.get_or_create_bridged_type(base).unwrap();
    let extra = script_class(&mut session, "Extra");
    session.register_base_type_provider(provider_fn(move |_, _, mut existing| {
        existing.push(extra);
        Ok(existing)
    }));

    assert_eq!(session.get_bases(base_type).unwrap(), vec![session.object_type()]);
    let derived_type = session.get_or_create_bridged_type(derived).unwrap();
    assert_eq!(base_names(&session, derived_type), vec!["Base", "Extra"]);
}

#[test]
fn empty_provider_result_falls_back_to_object() {
    let mut session = Session::default();
    let (_, derived) = register(&mut session);
    session.register_base_type_provider(provider_fn(|_, _, _| Ok(Vec::new())));
    let derived_type = session.get_or_create_bridged_type(derived).unwrap();
    assert_eq!(session.get_bases(derived_type).unwrap(), vec![session.object_type()]);
}

#[test]
fn provider_error_propagates_and_nothing_is_cached() {
    let mut session = Session::default();
    let (base, _) = register(&mut session);
    session.register_base_type_provider(provider_fn(|_, _, _| {
        Err(BridgeError::exception(ExcType::ValueError, "provider refused"))
    }));
    let err = session.get_or_create_bridged_type(base).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ValueError);
    assert_eq!(session.cached_type_count(), 0);
}

#[test]
fn inconsistent_provider_bases_are_a_linearization_error() {
    let mut session = Session::default();
    let (base, _) = register(&mut session);
    let extra = script_class(&mut session, "Extra");
    // object before one of its own subclasses has no consistent order
    session.register_base_type_provider(provider_fn(move |cx, _, _| Ok(vec![cx.object_type(), extra])));

    let err = session.get_or_create_bridged_type(base).unwrap_err();
    let BridgeError::Linearization(err) = err else {
        panic!("expected a linearization error, got {err}");
    };
    assert_eq!(err.type_name, "Base");
    assert_eq!(err.bases, vec!["object", "Extra"]);
    assert_eq!(session.cached_type_count(), 0);
}
