//! JSON object file implementing [`SettingsStore`].
//!
//! The file holds a single flat object of qualified key to value. A missing
//! file is an empty store; every `set` rewrites the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::SettingsStore;
use crate::Result;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing values if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(json) if json.trim().is_empty() => BTreeMap::new(),
            Ok(json) => serde_json::from_str(&json)?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use serde_json::json;

    #[test]
    fn test_missing_file_is_empty_store() {
        let env = TestEnv::new();
        let store = JsonFileStore::open(env.settings_path()).unwrap();
        assert!(store.keys().is_empty());
        assert!(!env.settings_path().exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let env = TestEnv::new();
        let mut store = JsonFileStore::open(env.settings_path()).unwrap();
        store.set("ns/fps", json!(90)).unwrap();
        store.set("ns/use-head", json!(true)).unwrap();

        let reopened = JsonFileStore::open(env.settings_path()).unwrap();
        assert_eq!(reopened.get("ns/fps"), Some(json!(90)));
        assert_eq!(reopened.get("ns/use-head"), Some(json!(true)));
        assert_eq!(reopened.keys(), vec!["ns/fps", "ns/use-head"]);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let env = TestEnv::new();
        std::fs::write(env.settings_path(), "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(env.settings_path()),
            Err(crate::Error::Json(_))
        ));
    }
}
