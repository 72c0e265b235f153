//! Registry of live application state exposed as configuration.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

use super::item::{DualAuthorityItem, ItemDescriptor};
use crate::Result;
use crate::keys::KeyResolver;
use crate::signal::{Signal, ValueChange};
use crate::value::same_value;

/// Origin tag attached to changes made through [`ApplicationConfig::set_value`].
pub const APPLICATION_CONFIG_ORIGIN: &str = "ApplicationConfig.setValue";

/// A collection of [`DualAuthorityItem`]s keyed by qualified setting name.
///
/// Items are reachable by both their bare and qualified names.
pub struct ApplicationConfig {
    resolver: KeyResolver,
    items: BTreeMap<String, DualAuthorityItem>,
    aliases: HashMap<String, String>,
    value_updated: Signal<ValueChange>,
}

impl ApplicationConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            resolver: KeyResolver::new(namespace),
            items: BTreeMap::new(),
            aliases: HashMap::new(),
            value_updated: Signal::new("valueUpdated"),
        }
    }

    pub fn namespace(&self) -> &str {
        self.resolver.namespace()
    }

    pub fn value_updated(&mut self) -> &mut Signal<ValueChange> {
        &mut self.value_updated
    }

    /// Register items from `(name, descriptor)` pairs.
    ///
    /// Stops at the first item whose bindings all fail to resolve; items
    /// registered before it are kept.
    pub fn register<K, I>(&mut self, items: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ItemDescriptor)>,
    {
        for (name, descriptor) in items {
            let name = name.into();
            let qualified = self.resolver.resolve(&name);
            let item = DualAuthorityItem::new(qualified.clone(), descriptor)?;
            debug!(setting = %qualified, authority = %item.authority(), "registered");
            if name != qualified {
                self.aliases.insert(name, qualified.clone());
            }
            self.items.insert(qualified, item);
        }
        Ok(())
    }

    /// Qualified key for `key`, or `None` (logged) if it is not registered.
    pub fn resolve(&self, key: &str) -> Option<String> {
        if self.items.contains_key(key) {
            return Some(key.to_string());
        }
        if let Some(qualified) = self.aliases.get(key) {
            return Some(qualified.clone());
        }
        let qualified = self.resolver.resolve(key);
        if self.items.contains_key(&qualified) {
            return Some(qualified);
        }
        warn!("ApplicationConfig: unregistered setting '{}'", key);
        None
    }

    /// Whether `key` names a registered item (no logging on a miss).
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
            || self.aliases.contains_key(key)
            || self.items.contains_key(&self.resolver.resolve(key))
    }

    /// Qualified names of every registered item.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn item(&self, key: &str) -> Option<&DualAuthorityItem> {
        self.resolve(key).and_then(|k| self.items.get(&k))
    }

    /// Current value of the item, or `default` if it is not registered.
    pub fn get_value(&self, key: &str, default: Option<Value>) -> Value {
        match self.item(key) {
            Some(item) => item.get(),
            None => default.unwrap_or(Value::Null),
        }
    }

    /// Write the item, signaling iff the value changed.
    ///
    /// Returns false for unregistered keys and unchanged values.
    pub fn set_value(&mut self, key: &str, value: Value) -> bool {
        let Some(qualified) = self.resolve(key) else {
            return false;
        };
        let Some(item) = self.items.get(&qualified) else {
            return false;
        };

        let old_value = item.get();
        item.set(value.clone());
        if same_value(&old_value, &value) {
            return false;
        }
        self.value_updated.emit(&ValueChange::new(
            qualified,
            value,
            old_value,
            APPLICATION_CONFIG_ORIGIN,
        ));
        true
    }

    /// Re-align the item's secondary bindings with its primary.
    pub fn resync_value(&self, key: &str) -> Option<usize> {
        self.item(key).map(DualAuthorityItem::resync)
    }

    /// Push an externally received value into live application state.
    ///
    /// Returns true only if the key is registered and the value differed.
    pub fn apply_value(&mut self, key: &str, value: Value, origin: &str) -> bool {
        let Some(qualified) = self.resolve(key) else {
            return false;
        };
        let current = self.get_value(&qualified, None);
        if same_value(&current, &value) {
            return false;
        }
        debug!(key = %qualified, origin, "applying {} (was: {})", value, current);
        self.set_value(&qualified, value)
    }
}
