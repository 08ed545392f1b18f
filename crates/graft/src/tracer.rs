//! Bridge tracing infrastructure.
//!
//! The session carries a boxed [`BridgeTracer`] chosen by the caller. Every
//! hook has a no-op default, so implementations only override what they need.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No output (default) |
//! | [`StderrTracer`] | Human-readable log lines on stderr |
//! | [`RecordingTracer`] | Collects [`TraceEvent`]s for later inspection |

use std::sync::Arc;

use parking_lot::Mutex;

/// Event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A base-type provider was applied while building a synthetic type.
    Provider {
        host_type: String,
        /// Position of the provider in registration order.
        index: usize,
        before: Vec<String>,
        after: Vec<String>,
    },
    /// A synthetic type was built.
    TypeBuilt { host_type: String, mro: Vec<String> },
    /// A synthetic type was served from the cache.
    TypeCached { host_type: String },
    /// A host object crossed the boundary.
    Wrap { host_type: String, reused: bool },
    /// A `__getattr__` or `__setattr__` hook was dispatched.
    HookDispatch { hook: String, type_name: String, attr: String },
    /// A host method was invoked from the interpreter.
    Call { host_type: String, method: String, depth: usize },
}

/// Hook points for observing the bridge.
pub trait BridgeTracer: std::fmt::Debug + Send {
    /// Called after each provider returns, with the base names before and after.
    fn on_provider(&mut self, _host_type: &str, _index: usize, _before: &[String], _after: &[String]) {}

    /// Called when a synthetic type has been built and cached.
    fn on_type_built(&mut self, _host_type: &str, _mro: &[String]) {}

    /// Called when a synthetic type lookup hits the cache.
    fn on_type_cached(&mut self, _host_type: &str) {}

    /// Called when a host object is wrapped; `reused` is true if its proxy already existed.
    fn on_wrap(&mut self, _host_type: &str, _reused: bool) {}

    /// Called before an attribute hook runs.
    ///
    /// # Arguments
    /// * `hook` - `__getattr__` or `__setattr__`
    /// * `type_name` - Class of the instance the attribute was accessed on
    /// * `attr` - The attribute name
    fn on_hook_dispatch(&mut self, _hook: &str, _type_name: &str, _attr: &str) {}

    /// Called before a host method runs.
    ///
    /// # Arguments
    /// * `depth` - Call depth after entering the method
    fn on_call(&mut self, _host_type: &str, _method: &str, _depth: usize) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl BridgeTracer for NoopTracer {}

/// Tracer that prints a human-readable log to stderr.
///
/// Output format:
/// ```text
///   +++ TYPE Inherited          mro=[Inherited, Wrapper, Base, object]
///   ... WRAP Inherited          reused=false
///   >>> CALL Inherited.virt     depth=1
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer;

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BridgeTracer for StderrTracer {
    fn on_provider(&mut self, host_type: &str, index: usize, before: &[String], after: &[String]) {
        if before != after {
            eprintln!(
                "  ~~~ PROVIDER #{index} {host_type:<14} [{}] -> [{}]",
                before.join(", "),
                after.join(", ")
            );
        }
    }

    fn on_type_built(&mut self, host_type: &str, mro: &[String]) {
        eprintln!("  +++ TYPE {host_type:<18} mro=[{}]", mro.join(", "));
    }

    fn on_type_cached(&mut self, host_type: &str) {
        eprintln!("  === TYPE {host_type:<18} cached");
    }

    fn on_wrap(&mut self, host_type: &str, reused: bool) {
        eprintln!("  ... WRAP {host_type:<18} reused={reused}");
    }

    fn on_hook_dispatch(&mut self, hook: &str, type_name: &str, attr: &str) {
        eprintln!("  ??? {hook} {type_name}.{attr}");
    }

    fn on_call(&mut self, host_type: &str, method: &str, depth: usize) {
        let target = format!("{host_type}.{method}");
        eprintln!("  >>> CALL {target:<18} depth={depth}");
    }
}

/// Tracer that records every event.
///
/// Clones share the same buffer, so keep one clone to read the events after
/// handing the other to the session.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

impl BridgeTracer for RecordingTracer {
    fn on_provider(&mut self, host_type: &str, index: usize, before: &[String], after: &[String]) {
        self.push(TraceEvent::Provider {
            host_type: host_type.to_owned(),
            index,
            before: before.to_vec(),
            after: after.to_vec(),
        });
    }

    fn on_type_built(&mut self, host_type: &str, mro: &[String]) {
        self.push(TraceEvent::TypeBuilt {
            host_type: host_type.to_owned(),
            mro: mro.to_vec(),
        });
    }

    fn on_type_cached(&mut self, host_type: &str) {
        self.push(TraceEvent::TypeCached {
            host_type: host_type.to_owned(),
        });
    }

    fn on_wrap(&mut self, host_type: &str, reused: bool) {
        self.push(TraceEvent::Wrap {
            host_type: host_type.to_owned(),
            reused,
        });
    }

    fn on_hook_dispatch(&mut self, hook: &str, type_name: &str, attr: &str) {
        self.push(TraceEvent::HookDispatch {
            hook: hook.to_owned(),
            type_name: type_name.to_owned(),
            attr: attr.to_owned(),
        });
    }

    fn on_call(&mut self, host_type: &str, method: &str, depth: usize) {
        self.push(TraceEvent::Call {
            host_type: host_type.to_owned(),
            method: method.to_owned(),
            depth,
        });
    }
}
