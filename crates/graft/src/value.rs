use std::fmt;

use crate::{
    error::{BridgeError, BridgeResult, ExcType},
    heap::{Heap, HeapData, HeapId},
};

/// A value flowing through the embedded interpreter.
///
/// Immediates are stored inline; everything else lives in the session heap and
/// is referenced by `Ref`. Equality on `Ref` is identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Ref(HeapId),
    Builtin(Builtin),
}

/// Callables that are not heap objects: builtin functions and exception types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Function(BuiltinFunction),
    Exception(ExcType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinFunction {
    Isinstance,
    Issubclass,
    Super,
    Getattr,
    Setattr,
    Hasattr,
    Len,
    Repr,
    /// `object.__setattr__`: stores into the instance dict, bypassing hooks.
    #[strum(serialize = "__setattr__")]
    ObjectSetattr,
    /// `object.__init__`: accepts and ignores its arguments.
    #[strum(serialize = "__init__")]
    ObjectInit,
}

impl Value {
    /// Returns the heap id if this is a reference.
    #[must_use]
    pub fn ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Python truthiness.
    pub(crate) fn is_truthy(&self, heap: &Heap) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Dict(dict) => !dict.is_empty(),
                HeapData::List(items) => !items.is_empty(),
                _ => true,
            },
            Self::Builtin(_) => true,
        }
    }

    /// Python `is`: identity for heap objects, value equality for immediates.
    pub(crate) fn is(&self, other: &Self) -> bool {
        self == other
    }

    /// Writes the `repr()` of this value.
    pub(crate) fn repr_fmt(&self, f: &mut impl fmt::Write, heap: &Heap) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Builtin(Builtin::Function(func)) => write!(f, "<built-in function {func}>"),
            Self::Builtin(Builtin::Exception(exc)) => write!(f, "<class '{exc}'>"),
            Self::Ref(id) => heap.repr_fmt(*id, f),
        }
    }

    pub(crate) fn repr(&self, heap: &Heap) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = self.repr_fmt(&mut out, heap);
        out
    }

    /// `str()` of this value: strings are returned unquoted, everything else uses `repr()`.
    pub(crate) fn str(&self, heap: &Heap) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.repr(heap),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::None
    }
}

/// Hashable projection of a value, used as a dict key.
///
/// Heap objects hash by identity, except dicts and lists which are unhashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DictKey {
    None,
    Int(i64),
    Str(String),
    Ref(HeapId),
    Builtin(Builtin),
}

impl DictKey {
    pub(crate) fn from_value(value: &Value, heap: &Heap) -> BridgeResult<Self> {
        Ok(match value {
            Value::None => Self::None,
            // True == 1 in Python, so bools share the int key space
            Value::Bool(b) => Self::Int(i64::from(*b)),
            Value::Int(i) => Self::Int(*i),
            Value::Str(s) => Self::Str(s.clone()),
            Value::Builtin(b) => Self::Builtin(*b),
            Value::Ref(id) => match heap.get(*id) {
                HeapData::Dict(_) | HeapData::List(_) => {
                    return Err(BridgeError::type_error(format!(
                        "unhashable type: '{}'",
                        heap.data_type_name(*id)
                    )));
                }
                _ => Self::Ref(*id),
            },
        })
    }
}
