//! Settings snapshots for export and import.
//!
//! Qualified keys are stored as a nested tree by splitting on `/`, so
//! `app/rotation/speed = 1` becomes `{"app": {"rotation": {"speed": 1}}}`.
//! [`rollup_paths`] flattens a tree back into `path -> value`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot format version written by [`SettingsSnapshot::new`].
pub const SNAPSHOT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nested settings tree.
    pub settings: Value,
    #[serde(rename = "_metadata")]
    pub metadata: SnapshotMetadata,
}

impl SettingsSnapshot {
    pub fn new<I>(name: Option<&str>, namespace: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut settings = Value::Object(Map::new());
        for (key, value) in values {
            set_path(&mut settings, &key, value);
        }
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            name: name.map(str::to_string),
            settings,
            metadata: SnapshotMetadata {
                timestamp: Utc::now(),
                namespace: namespace.to_string(),
            },
        }
    }
}

/// Outcome of applying a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Keys whose value changed.
    pub applied: Vec<String>,
    /// Keys already holding the snapshot value.
    pub unchanged: Vec<String>,
    /// Keys not registered with the target.
    pub skipped: Vec<String>,
}

fn set_path(tree: &mut Value, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('/').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut node = tree;
    for segment in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(leaf.to_string(), value);
    }
}

/// Flatten a nested settings tree into `path -> leaf value`.
pub fn rollup_paths(tree: &Value) -> BTreeMap<String, Value> {
    let mut output = BTreeMap::new();
    let mut path = Vec::new();
    rollup(tree, &mut path, &mut output);
    output
}

fn rollup<'a>(node: &'a Value, path: &mut Vec<&'a str>, output: &mut BTreeMap<String, Value>) {
    match node {
        Value::Object(map) => {
            for (segment, child) in map {
                path.push(segment);
                rollup(child, path, output);
                path.pop();
            }
        }
        leaf if !path.is_empty() => {
            output.insert(path.join("/"), leaf.clone());
        }
        _ => {}
    }
}
