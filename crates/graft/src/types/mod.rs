pub(crate) mod class;
pub(crate) mod dict;
pub(crate) mod function;

pub(crate) use class::{BuiltinClass, ClassObject, ClassOrigin, HostLink, Instance, SuperProxy};
pub(crate) use dict::Dict;
pub(crate) use function::{BoundMethod, HostMethod, HostProperty, ScriptFunction};
