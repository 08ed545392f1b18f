use std::fmt;

use serde::{Deserialize, Serialize};

/// Recommended maximum call depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 200;

/// Maximum length of the Method Resolution Order (MRO) list for any class.
///
/// Limits the output of C3 linearization so that adversarial diamond
/// hierarchies cannot consume unbounded memory.
pub const DEFAULT_MAX_MRO_LENGTH: usize = 2600;

/// Maximum depth of single-path inheritance chains.
pub const DEFAULT_MAX_INHERITANCE_DEPTH: usize = 1000;

/// Error returned when a configured limit is exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// Nested script or host calls went deeper than `max_recursion_depth`.
    Recursion { limit: usize, depth: usize },
    /// A computed MRO was longer than `max_mro_length`.
    MroLength { type_name: String, limit: usize, length: usize },
    /// A base's MRO was longer than `max_inheritance_depth`.
    InheritanceDepth { type_name: String, limit: usize, depth: usize },
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recursion { limit, depth } => {
                write!(f, "maximum recursion depth exceeded: {depth} > {limit}")
            }
            Self::MroLength {
                type_name,
                limit,
                length,
            } => write!(f, "MRO of '{type_name}' exceeds maximum length: {length} > {limit}"),
            Self::InheritanceDepth {
                type_name,
                limit,
                depth,
            } => write!(
                f,
                "inheritance chain of '{type_name}' too deep: {depth} > {limit}"
            ),
        }
    }
}

impl std::error::Error for LimitError {}

/// Configuration for a bridge session.
///
/// Every field has a default, so partial documents deserialize cleanly.
/// Build custom configurations with the builder methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum nesting of script function and host method calls.
    pub max_recursion_depth: usize,
    /// Maximum length of any computed MRO.
    pub max_mro_length: usize,
    /// Maximum length of any base's MRO when building a new type.
    pub max_inheritance_depth: usize,
    /// Name reported as the file in parse error locations.
    pub script_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_mro_length: DEFAULT_MAX_MRO_LENGTH,
            max_inheritance_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
            script_name: "<bridge>".to_owned(),
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON document; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: usize) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Sets the maximum MRO length.
    #[must_use]
    pub fn max_mro_length(mut self, limit: usize) -> Self {
        self.max_mro_length = limit;
        self
    }

    /// Sets the maximum inheritance depth.
    #[must_use]
    pub fn max_inheritance_depth(mut self, limit: usize) -> Self {
        self.max_inheritance_depth = limit;
        self
    }

    /// Sets the script name used in error locations.
    #[must_use]
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }
}
