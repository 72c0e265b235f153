//! Registry of persisted settings with a defaults table.

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Result;
use crate::signal::{Signal, ValueChange};
use crate::snapshot::{self, ImportReport, SettingsSnapshot};
use crate::store::{LocalStore, SettingsApi, SettingsStore};

/// Origin tag attached to changes made through [`SettingsConfig::set_value`].
pub const SETTINGS_CONFIG_ORIGIN: &str = "SettingsConfig.setValue";

/// Namespaced settings over a [`LocalStore`], with defaults resolved up front.
///
/// Every instance carries a fresh session id, handed to the bridges so both
/// ends of a channel can recognise each other's messages.
pub struct SettingsConfig<S> {
    store: LocalStore<S>,
    uuid: String,
}

impl<S: SettingsStore> SettingsConfig<S> {
    /// Build a registry whose defaults table resolves every key in `defaults`.
    pub fn new<K, I>(namespace: impl Into<String>, defaults: I, store: S) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut store = LocalStore::new(namespace, store);
        for (key, value) in defaults {
            store.set_default(key.as_ref(), value);
        }
        Self {
            store,
            uuid: Uuid::new_v4().to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    /// Session id for this registry.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn resolve(&self, key: &str) -> String {
        self.store.resolver().resolve(key)
    }

    pub fn value_updated(&mut self) -> &mut Signal<ValueChange> {
        self.store.value_updated()
    }

    pub fn local_store(&self) -> &LocalStore<S> {
        &self.store
    }

    /// Whether `key` has an entry in the defaults table.
    pub fn is_registered(&self, key: &str) -> bool {
        self.store.default_for(key).is_some()
    }

    /// Qualified keys with defaults, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.store.default_keys().map(str::to_string).collect();
        keys.sort();
        keys
    }

    pub fn get_value(&self, key: &str, default: Option<Value>) -> Value {
        self.store.get_value(key, default)
    }

    pub fn set_value(&mut self, key: &str, value: Value) -> Result<bool> {
        self.store
            .set_value_from(key, value, SETTINGS_CONFIG_ORIGIN)
    }

    pub fn set_value_from(&mut self, key: &str, value: Value, origin: &str) -> Result<bool> {
        self.store.set_value_from(key, value, origin)
    }

    pub fn get_float(&self, key: &str, default: Option<f64>) -> f64 {
        self.store.get_float(key, default)
    }

    /// Write every default back, returning how many values changed.
    pub fn reset_to_defaults(&mut self, origin: &str) -> Result<usize> {
        let mut changed = 0;
        for key in self.keys() {
            let Some(value) = self.store.default_for(&key).cloned() else {
                continue;
            };
            if self.store.set_value_from(&key, value, origin)? {
                changed += 1;
            }
        }
        info!(namespace = %self.namespace(), changed, "reset to defaults");
        Ok(changed)
    }

    /// Export every registered setting as a nested snapshot.
    pub fn export(&self, name: Option<&str>) -> SettingsSnapshot {
        let values = self
            .keys()
            .into_iter()
            .map(|key| {
                let value = self.get_value(&key, None);
                (key, value)
            });
        SettingsSnapshot::new(name, self.namespace(), values)
    }

    /// Apply a snapshot, skipping keys that are not registered.
    pub fn import(&mut self, snapshot: &SettingsSnapshot) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let label = snapshot.name.as_deref().unwrap_or("import");
        for (key, value) in snapshot::rollup_paths(&snapshot.settings) {
            if !self.is_registered(&key) {
                warn!("skipping unregistered settings key: {}", key);
                report.skipped.push(key);
                continue;
            }
            let origin = format!("{}.settings.{}", label, key);
            if self.store.set_value_from(&key, value, &origin)? {
                report.applied.push(key);
            } else {
                report.unchanged.push(key);
            }
        }
        Ok(report)
    }
}

impl<S: SettingsStore> SettingsApi for SettingsConfig<S> {
    fn resolve(&self, key: &str) -> String {
        SettingsConfig::resolve(self, key)
    }

    fn get_value(&self, key: &str, default: Option<Value>) -> Value {
        SettingsConfig::get_value(self, key, default)
    }

    fn set_value_from(&mut self, key: &str, value: Value, origin: &str) -> Result<bool> {
        SettingsConfig::set_value_from(self, key, value, origin)
    }
}
