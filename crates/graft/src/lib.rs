#![doc = include_str!("../../../README.md")]
mod heap;

mod attr;
mod config;
mod error;
mod expressions;
mod host;
pub mod mro;
mod parse;
mod provider;
mod proxy;
mod session;
mod synthetic;
pub mod tracer;
mod types;
mod value;
mod vm;

pub use crate::{
    config::{
        BridgeConfig, DEFAULT_MAX_INHERITANCE_DEPTH, DEFAULT_MAX_MRO_LENGTH, DEFAULT_MAX_RECURSION_DEPTH, LimitError,
    },
    error::{BridgeError, BridgeResult, ExcType, Exception, LinearizationError},
    heap::HeapId,
    host::{AdHocStore, HostIdentity, HostObject, HostRef, HostTypeDef, HostTypeId, downcast_host},
    parse::{CodeLoc, ParseError},
    provider::{BaseTypeProvider, BaseTypeProviderRegistry, FnProvider, ProviderContext, provider_fn},
    proxy::ProxyHandle,
    session::{Scope, Session, SharedSession, ShutdownReport, TypeHandle},
    tracer::{BridgeTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    value::{Builtin, BuiltinFunction, Value},
};
