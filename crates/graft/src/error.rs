//! Error types surfaced by the bridge.
//!
//! There is one error enum for the whole crate. Host callbacks, providers and
//! the embedded interpreter all return [`BridgeResult`], so a host property
//! getter can evaluate script code and recover from an `AttributeError` the
//! same way a caller of the public API does.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{config::LimitError, parse::ParseError};

/// Result alias used throughout the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Python exception types the embedded interpreter can raise.
///
/// Uses strum derives so the string form matches the variant name exactly
/// (e.g. `AttributeError` -> "AttributeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    Exception,
    AttributeError,
    TypeError,
    ValueError,
    KeyError,
    IndexError,
    NameError,
    ImportError,
    RuntimeError,
    RecursionError,
    OverflowError,
    ZeroDivisionError,
    ReferenceError,
    SyntaxError,
}

impl ExcType {
    /// Exception constructors exposed to scripts as builtin names.
    pub(crate) const SCRIPT_VISIBLE: [Self; 7] = [
        Self::Exception,
        Self::AttributeError,
        Self::TypeError,
        Self::ValueError,
        Self::KeyError,
        Self::NameError,
        Self::RuntimeError,
    ];
}

/// A raised exception: a type plus an optional message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    exc_type: ExcType,
    message: Option<String>,
}

impl Exception {
    #[must_use]
    pub fn new(exc_type: ExcType, message: Option<String>) -> Self {
        Self { exc_type, message }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// No consistent method resolution order exists for a list of bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearizationError {
    /// Name of the type whose construction failed.
    pub type_name: String,
    /// Names of the bases that could not be merged, in declaration order.
    pub bases: Vec<String>,
}

impl fmt::Display for LinearizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot create a consistent method resolution order (MRO) for '{}' with bases {}",
            self.type_name,
            self.bases.join(", ")
        )
    }
}

impl std::error::Error for LinearizationError {}

/// Errors produced by bridge operations and by code running inside the bridge.
///
/// Every variant carries the name of the offending type or attribute so that
/// failures can be diagnosed without a stack trace.
#[derive(Debug, Clone)]
pub enum BridgeError {
    /// Script source could not be parsed.
    Parse(ParseError),
    /// A base list has no consistent C3 linearization.
    Linearization(LinearizationError),
    /// Normal lookup failed and no `__getattr__` hook resolved the name.
    AttributeNotFound { type_name: String, attr: String },
    /// A method invoked by name does not exist on the target.
    NoSuchMethod { type_name: String, method: String },
    /// An exception raised while executing code across the boundary.
    Call(Exception),
    /// A provider tried to build a type that is already being built.
    ReentrantConstruction { host_type: String },
    /// A host object or type id was never registered with the session.
    UnknownHostType { type_name: String },
    /// A host type definition was rejected at registration.
    Registration { type_name: String, reason: String },
    /// A proxy outlived the host object it delegates to.
    HostObjectDropped { type_name: String },
    /// A configured limit was exceeded.
    Limit(LimitError),
}

impl BridgeError {
    /// Creates a `Call` error from an exception type and message.
    #[must_use]
    pub fn exception(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self::Call(Exception::new(exc_type, Some(message.into())))
    }

    #[must_use]
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::exception(ExcType::TypeError, message)
    }

    #[must_use]
    pub(crate) fn name_error(name: &str) -> Self {
        Self::exception(ExcType::NameError, format!("name '{name}' is not defined"))
    }

    #[must_use]
    pub(crate) fn attribute_error(type_name: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::AttributeNotFound {
            type_name: type_name.into(),
            attr: attr.into(),
        }
    }

    #[must_use]
    pub(crate) fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::exception(ExcType::RuntimeError, format!("internal error: {}", message.into()))
    }

    /// The Python exception type this error is seen as from inside a script.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::Parse(_) => ExcType::SyntaxError,
            Self::Linearization(_) | Self::UnknownHostType { .. } | Self::Registration { .. } => ExcType::TypeError,
            Self::AttributeNotFound { .. } | Self::NoSuchMethod { .. } => ExcType::AttributeError,
            Self::Call(exc) => exc.exc_type(),
            Self::ReentrantConstruction { .. } => ExcType::RuntimeError,
            Self::HostObjectDropped { .. } => ExcType::ReferenceError,
            Self::Limit(_) => ExcType::RecursionError,
        }
    }

    /// Whether this error is an attribute lookup failure, however it was raised.
    ///
    /// Mirrors `except AttributeError:` and is what host code should match on
    /// when falling back to ad-hoc storage.
    #[must_use]
    pub fn is_attribute_error(&self) -> bool {
        self.exc_type() == ExcType::AttributeError
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "{error}"),
            Self::Linearization(error) => write!(f, "TypeError: {error}"),
            Self::AttributeNotFound { type_name, attr } => {
                write!(f, "AttributeError: '{type_name}' object has no attribute '{attr}'")
            }
            Self::NoSuchMethod { type_name, method } => {
                write!(f, "AttributeError: '{type_name}' object has no method '{method}'")
            }
            Self::Call(exc) => write!(f, "{exc}"),
            Self::ReentrantConstruction { host_type } => write!(
                f,
                "RuntimeError: re-entrant construction of bridged type for '{host_type}'"
            ),
            Self::UnknownHostType { type_name } => {
                write!(f, "TypeError: host type '{type_name}' is not registered")
            }
            Self::Registration { type_name, reason } => {
                write!(f, "TypeError: cannot register host type '{type_name}': {reason}")
            }
            Self::HostObjectDropped { type_name } => {
                write!(f, "ReferenceError: host object behind '{type_name}' proxy has been dropped")
            }
            Self::Limit(error) => write!(f, "RecursionError: {error}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<ParseError> for BridgeError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<LinearizationError> for BridgeError {
    fn from(error: LinearizationError) -> Self {
        Self::Linearization(error)
    }
}

impl From<LimitError> for BridgeError {
    fn from(error: LimitError) -> Self {
        Self::Limit(error)
    }
}

impl From<Exception> for BridgeError {
    fn from(exc: Exception) -> Self {
        Self::Call(exc)
    }
}
