//! Settings storage seam and the namespaced [`LocalStore`] over it.
//!
//! The underlying store is an external collaborator with synchronous
//! get/set. [`LocalStore`] adds key namespacing, per-key defaults and
//! change-only `value_updated` signaling on top of it.

mod file;

pub use file::JsonFileStore;

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::keys::KeyResolver;
use crate::signal::{Signal, ValueChange};
use crate::value::{same_value, to_f64};

/// Synchronous key-value store provided by the host.
pub trait SettingsStore {
    /// Read a value, `None` if the key has never been written.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// All keys currently present.
    fn keys(&self) -> Vec<String>;
}

/// In-memory store, used by tests and the loopback demo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// The settings surface a [`crate::bridge::HostBridge`] reads and writes.
pub trait SettingsApi {
    /// Qualify a key under this store's namespace.
    fn resolve(&self, key: &str) -> String;

    /// Read a value, falling back to registered then caller defaults.
    fn get_value(&self, key: &str, default: Option<Value>) -> Value;

    /// Write a value, tagging any resulting change with `origin`.
    ///
    /// Returns true when the value changed.
    fn set_value_from(&mut self, key: &str, value: Value, origin: &str) -> Result<bool>;
}

/// Origin tag for plain `set_value` calls.
pub const LOCAL_STORE_ORIGIN: &str = "LocalStore.setValue";

/// Namespaced wrapper around a [`SettingsStore`].
pub struct LocalStore<S> {
    resolver: KeyResolver,
    store: S,
    defaults: HashMap<String, Value>,
    value_updated: Signal<ValueChange>,
}

impl<S: SettingsStore> LocalStore<S> {
    pub fn new(namespace: impl Into<String>, store: S) -> Self {
        Self {
            resolver: KeyResolver::new(namespace),
            store,
            defaults: HashMap::new(),
            value_updated: Signal::new("valueUpdated"),
        }
    }

    pub fn namespace(&self) -> &str {
        self.resolver.namespace()
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Signal fired once per effective change.
    pub fn value_updated(&mut self) -> &mut Signal<ValueChange> {
        &mut self.value_updated
    }

    /// Register a default for `key` (resolved before storing).
    pub fn set_default(&mut self, key: &str, value: Value) {
        self.defaults.insert(self.resolver.resolve(key), value);
    }

    /// Registered default for `key`, if any.
    pub fn default_for(&self, key: &str) -> Option<&Value> {
        self.defaults.get(&self.resolver.resolve(key))
    }

    /// Qualified keys that have a registered default.
    pub fn default_keys(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    pub fn get_value(&self, key: &str, default: Option<Value>) -> Value {
        let key = self.resolver.resolve(key);
        self.store
            .get(&key)
            .or_else(|| self.defaults.get(&key).cloned())
            .or(default)
            .unwrap_or(Value::Null)
    }

    pub fn set_value(&mut self, key: &str, value: Value) -> Result<bool> {
        self.set_value_from(key, value, LOCAL_STORE_ORIGIN)
    }

    /// Write through to the store, signaling only when the value changed.
    pub fn set_value_from(&mut self, key: &str, value: Value, origin: &str) -> Result<bool> {
        let key = self.resolver.resolve(key);
        let old_value = self.get_value(&key, None);
        self.store.set(&key, value.clone())?;

        if same_value(&old_value, &value) {
            return Ok(false);
        }

        debug!(key = %key, origin, "{} -> {}", old_value, value);
        self.value_updated
            .emit(&ValueChange::new(key, value, old_value, origin));
        Ok(true)
    }

    /// Read a value as a float.
    ///
    /// Unparsable or non-finite values fall back to `default`, then `0.0`.
    pub fn get_float(&self, key: &str, default: Option<f64>) -> f64 {
        let fallback = default.filter(|f| f.is_finite()).unwrap_or(0.0);
        to_f64(&self.get_value(key, None)).unwrap_or(fallback)
    }
}

impl<S: SettingsStore> SettingsApi for LocalStore<S> {
    fn resolve(&self, key: &str) -> String {
        self.resolver.resolve(key)
    }

    fn get_value(&self, key: &str, default: Option<Value>) -> Value {
        LocalStore::get_value(self, key, default)
    }

    fn set_value_from(&mut self, key: &str, value: Value, origin: &str) -> Result<bool> {
        LocalStore::set_value_from(self, key, value, origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store() -> LocalStore<MemoryStore> {
        LocalStore::new("ns", MemoryStore::new())
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut local = store();
        local.set_value("fps", json!(90)).unwrap();

        assert_eq!(local.get_value("fps", None), json!(90));
        assert_eq!(local.get_value("ns/fps", None), json!(90));
        assert_eq!(local.store().get("ns/fps"), Some(json!(90)));
    }

    #[test]
    fn test_default_fallback_order() {
        let mut local = store();
        assert_eq!(local.get_value("missing", None), Value::Null);
        assert_eq!(local.get_value("missing", Some(json!(1))), json!(1));

        local.set_default("missing", json!(2));
        assert_eq!(local.get_value("missing", Some(json!(1))), json!(2));

        local.set_value("missing", json!(3)).unwrap();
        assert_eq!(local.get_value("missing", Some(json!(1))), json!(3));
    }

    #[test]
    fn test_change_only_signaling() {
        let mut local = store();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        local
            .value_updated()
            .connect(move |change: &ValueChange| sink.borrow_mut().push(change.clone()));

        assert!(local.set_value("x", json!(5)).unwrap());
        assert!(!local.set_value("x", json!(5)).unwrap());

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "ns/x");
        assert_eq!(events[0].value, json!(5));
        assert_eq!(events[0].old_value, Value::Null);
        assert_eq!(events[0].origin, LOCAL_STORE_ORIGIN);
    }

    #[test]
    fn test_whole_float_is_same_number() {
        let mut local = store();
        let events = Rc::new(RefCell::new(0));
        let sink = events.clone();
        local.value_updated().connect(move |_| *sink.borrow_mut() += 1);

        assert!(local.set_value("x", json!(7)).unwrap());
        assert!(!local.set_value("x", json!(7.0)).unwrap());
        assert!(local.set_value("x", json!("7")).unwrap());
        assert_eq!(*events.borrow(), 2);
    }

    #[test]
    fn test_setting_default_value_is_not_a_change() {
        let mut local = store();
        local.set_default("enabled", json!(false));
        assert!(!local.set_value("enabled", json!(false)).unwrap());
        assert_eq!(local.store().get("ns/enabled"), Some(json!(false)));
    }

    #[test]
    fn test_get_float() {
        let mut local = store();
        local.set_value("speed", json!("45.5")).unwrap();
        local.set_value("bad", json!("fast")).unwrap();

        assert_eq!(local.get_float("speed", None), 45.5);
        assert_eq!(local.get_float("bad", Some(2.0)), 2.0);
        assert_eq!(local.get_float("bad", Some(f64::NAN)), 0.0);
        assert_eq!(local.get_float("absent", None), 0.0);
    }
}
