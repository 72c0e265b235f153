//! Namespaced key resolution.
//!
//! Configuration keys come in two forms:
//! - *bare* keys such as `fps` are scoped to a namespace and resolve to
//!   `<namespace>/fps`
//! - *qualified* keys (anything containing `/` or starting with `.`) already
//!   carry their scope and pass through untouched
//!
//! Resolution is idempotent: resolving an already-resolved key is a no-op.

use serde_json::Value;

use crate::{Error, Result};

/// Returns true if `key` already carries namespace information.
pub fn is_qualified(key: &str) -> bool {
    key.starts_with('.') || key.contains('/')
}

/// Qualifies bare keys under a configuration group id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyResolver {
    namespace: String,
}

impl KeyResolver {
    /// Create a resolver for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace bare keys are qualified under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolve a key to its qualified form.
    pub fn resolve(&self, key: &str) -> String {
        if is_qualified(key) {
            key.to_string()
        } else {
            format!("{}/{}", self.namespace, key)
        }
    }

    /// Resolve a key that arrived as a dynamic value (e.g. a message param).
    ///
    /// Fails with [`Error::InvalidKey`] when the value is not a string.
    pub fn resolve_value(&self, key: &Value) -> Result<String> {
        match key {
            Value::String(key) => Ok(self.resolve(key)),
            other => Err(Error::InvalidKey(other.to_string())),
        }
    }
}
