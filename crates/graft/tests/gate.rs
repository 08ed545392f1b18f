/// Tests for sharing a session between threads behind its lock.
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use graft::{BridgeConfig, HostObject, HostRef, HostTypeDef, Session, SharedSession, Value, provider_fn};
use pretty_assertions::assert_eq;

struct Token;
impl HostObject for Token {}

#[test]
fn threads_take_turns() {
    let mut session = Session::default();
    let scope = session.create_scope();
    session.exec("counter = 0", &scope).unwrap();
    let shared = SharedSession::new(session);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    shared.with(|s| s.exec("counter = counter + 1", &scope)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let session = shared.into_inner().expect("every worker handle was dropped");
    assert_eq!(session.scope_get(&scope, "counter"), Some(Value::Int(100)));
}

#[test]
fn wrapping_from_many_threads_yields_one_proxy() {
    let mut session = Session::default();
    session.register_host_type(HostTypeDef::new::<Token>("Token")).unwrap();
    let shared = SharedSession::new(session);
    let host: HostRef = Arc::new(Token);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let host = Arc::clone(&host);
            thread::spawn(move || shared.with(|s| s.wrap(&host)).unwrap())
        })
        .collect();
    let proxies: Vec<_> = workers.into_iter().map(|worker| worker.join().unwrap()).collect();

    assert!(proxies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(shared.lock().proxy_count(), 1);
    assert_eq!(shared.lock().cached_type_count(), 1);
}

#[test]
fn try_lock_fails_while_held() {
    let shared = SharedSession::new(Session::default());
    let guard = shared.lock();
    assert!(shared.try_lock().is_none());
    drop(guard);
    assert!(shared.try_lock().is_some());
}

#[test]
fn into_inner_needs_the_last_handle() {
    let shared = SharedSession::new(Session::default());
    let other = shared.clone();
    assert!(shared.into_inner().is_none());
    assert!(other.into_inner().is_some());
}

#[test]
fn lock_is_released_after_a_panic() {
    let shared = SharedSession::new(Session::default());
    let worker = {
        let shared = shared.clone();
        thread::spawn(move || {
            shared.with(|s| {
                if s.proxy_count() == 0 {
                    panic!("host callback failed");
                }
            });
        })
    };
    assert!(worker.join().is_err());
    assert!(shared.try_lock().is_some());
}

#[test]
fn type_builds_after_a_provider_panics() {
    let mut session = Session::default();
    session.register_host_type(HostTypeDef::new::<Token>("Token")).unwrap();
    let panicked = AtomicBool::new(false);
    session.register_base_type_provider(provider_fn(move |_, _, existing| {
        if !panicked.swap(true, Ordering::SeqCst) {
            panic!("provider failed");
        }
        Ok(existing)
    }));
    let shared = SharedSession::new(session);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.with(|s| s.bridged_type_of::<Token>())));
    assert!(outcome.is_err());
    assert_eq!(shared.lock().cached_type_count(), 0);

    shared.with(|s| s.bridged_type_of::<Token>()).unwrap();
    assert_eq!(shared.lock().cached_type_count(), 1);
}

#[test]
fn call_depth_is_restored_after_a_host_method_panics() {
    let mut session = Session::new(BridgeConfig::new().max_recursion_depth(1));
    let panicked = AtomicBool::new(false);
    session
        .register_host_type(HostTypeDef::new::<Token>("Token").method("spin", move |_, _, _| {
            if !panicked.swap(true, Ordering::SeqCst) {
                panic!("host method failed");
            }
            Ok(Value::Int(1))
        }))
        .unwrap();
    let host: HostRef = Arc::new(Token);
    let proxy = session.wrap(&host).unwrap().value();
    let shared = SharedSession::new(session);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        shared.with(|s| s.invoke_method(&proxy, "spin", vec![]))
    }));
    assert!(outcome.is_err());

    // a leaked level would leave no room under a limit of one
    let value = shared.with(|s| s.invoke_method(&proxy, "spin", vec![])).unwrap();
    assert_eq!(value, Value::Int(1));
}
