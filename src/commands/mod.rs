//! Command implementations for the `sbr` CLI.
//!
//! Each command returns a result type implementing [`Output`], which `main`
//! prints as JSON or as human-readable text.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::bridge::{Callback, HostBridge, MemoryTransport, PeerBridge, TransportSlot};
use crate::config::ResolvedConfig;
use crate::keys::KeyResolver;
use crate::registry::SettingsConfig;
use crate::snapshot::{ImportReport, SettingsSnapshot};
use crate::store::{JsonFileStore, MemoryStore, SettingsStore};
use crate::value::{same_value, string_form};
use crate::{Error, Result};

/// Origin tag for writes made from the command line.
pub const CLI_ORIGIN: &str = "sbr";

/// Web view address used by `sbr loopback`.
pub const LOOPBACK_URL: &str = "https://localhost/settings-bridge/index.html";

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Open the settings file and register every known key.
///
/// Registered keys are the `[defaults]` table plus any key already stored
/// under the namespace (whose stored value then serves as its default).
pub fn open_settings(config: &ResolvedConfig) -> Result<SettingsConfig<JsonFileStore>> {
    let store = JsonFileStore::open(config.store_path())?;
    Ok(registry_with_defaults(config, store))
}

fn registry_with_defaults<S: SettingsStore>(config: &ResolvedConfig, store: S) -> SettingsConfig<S> {
    let resolver = KeyResolver::new(config.namespace());
    let prefix = format!("{}/", config.namespace());

    let mut defaults: Vec<(String, Value)> = config
        .defaults
        .iter()
        .map(|(key, value)| (resolver.resolve(key), value.clone()))
        .collect();
    for key in store.keys() {
        if key.starts_with(&prefix) && !defaults.iter().any(|(k, _)| *k == key) {
            if let Some(value) = store.get(&key) {
                defaults.push((key, value));
            }
        }
    }
    debug!(count = defaults.len(), "registered settings");
    SettingsConfig::new(config.namespace(), defaults, store)
}

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// === resolve ===

#[derive(Serialize)]
pub struct ResolveResult {
    pub key: String,
    pub qualified: String,
    pub namespace: String,
}

impl Output for ResolveResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        self.qualified.clone()
    }
}

pub fn resolve(config: &ResolvedConfig, key: &str) -> Result<ResolveResult> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    let resolver = KeyResolver::new(config.namespace());
    Ok(ResolveResult {
        key: key.to_string(),
        qualified: resolver.resolve(key),
        namespace: config.namespace().to_string(),
    })
}

// === get / set ===

#[derive(Serialize)]
pub struct GetResult {
    pub key: String,
    pub value: Value,
    pub registered: bool,
}

impl Output for GetResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        string_form(&self.value)
    }
}

pub fn get(
    config: &ResolvedConfig,
    key: &str,
    default: Option<Value>,
    as_float: bool,
) -> Result<GetResult> {
    let settings = open_settings(config)?;
    let value = if as_float {
        let default = default.as_ref().and_then(crate::value::to_f64);
        Value::from(settings.get_float(key, default))
    } else {
        settings.get_value(key, default)
    };
    Ok(GetResult {
        key: settings.resolve(key),
        value,
        registered: settings.is_registered(key),
    })
}

#[derive(Serialize)]
pub struct SetResult {
    pub key: String,
    pub value: Value,
    pub previous: Value,
    pub changed: bool,
}

impl Output for SetResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        if self.changed {
            format!(
                "{}: {} -> {}",
                self.key,
                string_form(&self.previous),
                string_form(&self.value)
            )
        } else {
            format!("{}: unchanged ({})", self.key, string_form(&self.value))
        }
    }
}

pub fn set(config: &ResolvedConfig, key: &str, value: Value) -> Result<SetResult> {
    let mut settings = open_settings(config)?;
    let qualified = settings.resolve(key);
    let previous = settings.get_value(key, None);
    let changed = settings.set_value_from(key, value.clone(), CLI_ORIGIN)?;
    info!(key = %qualified, changed, "set from command line");
    Ok(SetResult {
        key: qualified,
        value,
        previous,
        changed,
    })
}

// === list ===

#[derive(Serialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: Value,
    pub default: Value,
}

#[derive(Serialize)]
pub struct ListResult {
    pub namespace: String,
    pub count: usize,
    pub settings: Vec<SettingEntry>,
}

impl Output for ListResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        if self.settings.is_empty() {
            return format!("No settings registered under '{}'.", self.namespace);
        }
        let mut lines = vec![format!(
            "{} setting(s) under '{}':",
            self.count, self.namespace
        )];
        for entry in &self.settings {
            let marker = if same_value(&entry.value, &entry.default) { " " } else { "*" };
            lines.push(format!(
                "{} {} = {}",
                marker,
                entry.key,
                string_form(&entry.value)
            ));
        }
        lines.join("\n")
    }
}

pub fn list(config: &ResolvedConfig) -> Result<ListResult> {
    let settings = open_settings(config)?;
    let entries: Vec<SettingEntry> = settings
        .keys()
        .into_iter()
        .map(|key| SettingEntry {
            value: settings.get_value(&key, None),
            default: settings
                .local_store()
                .default_for(&key)
                .cloned()
                .unwrap_or(Value::Null),
            key,
        })
        .collect();
    Ok(ListResult {
        namespace: settings.namespace().to_string(),
        count: entries.len(),
        settings: entries,
    })
}

// === reset ===

#[derive(Serialize)]
pub struct ResetResult {
    pub namespace: String,
    pub changed: usize,
}

impl Output for ResetResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Reset '{}' to defaults ({} value(s) changed)",
            self.namespace, self.changed
        )
    }
}

pub fn reset(config: &ResolvedConfig) -> Result<ResetResult> {
    let mut settings = open_settings(config)?;
    let changed = settings.reset_to_defaults(CLI_ORIGIN)?;
    Ok(ResetResult {
        namespace: settings.namespace().to_string(),
        changed,
    })
}

// === export / import ===

impl Output for SettingsSnapshot {
    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(name) = &self.name {
            lines.push(format!("Snapshot: {}", name));
        }
        lines.push(format!(
            "Namespace: {} (exported {})",
            self.metadata.namespace,
            self.metadata.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        for (key, value) in crate::snapshot::rollup_paths(&self.settings) {
            lines.push(format!("  {} = {}", key, string_form(&value)));
        }
        lines.join("\n")
    }
}

pub fn export(config: &ResolvedConfig, name: Option<&str>) -> Result<SettingsSnapshot> {
    let settings = open_settings(config)?;
    Ok(settings.export(name))
}

#[derive(Serialize)]
pub struct ImportResult {
    pub file: String,
    #[serde(flatten)]
    pub report: ImportReport,
}

impl Output for ImportResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Imported {}: {} applied, {} unchanged, {} skipped",
            self.file,
            self.report.applied.len(),
            self.report.unchanged.len(),
            self.report.skipped.len()
        )];
        for key in &self.report.skipped {
            lines.push(format!("  skipped unregistered key: {}", key));
        }
        lines.join("\n")
    }
}

pub fn import(config: &ResolvedConfig, path: &Path) -> Result<ImportResult> {
    let text = std::fs::read_to_string(path)?;
    let snapshot: SettingsSnapshot = serde_json::from_str(&text)?;
    let mut settings = open_settings(config)?;
    let report = settings.import(&snapshot)?;
    info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "imported {}",
        path.display()
    );
    Ok(ImportResult {
        file: path.display().to_string(),
        report,
    })
}

// === config show ===

impl Output for ResolvedConfig {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!(
                "namespace:        {} ({})",
                self.namespace.value, self.namespace.source
            ),
            format!(
                "store:            {} ({})",
                self.store.value.display(),
                self.store.source
            ),
            format!(
                "output-format:    {} ({})",
                self.output_format.value, self.output_format.source
            ),
            format!(
                "monitor-interval: {}ms ({})",
                self.monitor_interval_ms.value, self.monitor_interval_ms.source
            ),
            format!(
                "request-timeout:  {}ms ({})",
                self.request_timeout_ms.value, self.request_timeout_ms.source
            ),
            format!("debug:            {} ({})", self.debug.value, self.debug.source),
        ];
        match &self.config_path {
            Some(path) => lines.push(format!("config file:      {}", path.display())),
            None => lines.push("config file:      (none)".to_string()),
        }
        if !self.defaults.is_empty() {
            lines.push("defaults:".to_string());
            for (key, value) in &self.defaults {
                lines.push(format!("  {} = {}", key, string_form(value)));
            }
        }
        lines.join("\n")
    }
}

// === loopback ===

/// One message delivered during a loopback run.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub from: &'static str,
    pub message: Value,
}

#[derive(Serialize)]
pub struct LoopbackResult {
    pub key: String,
    pub session_url: String,
    pub transcript: Vec<TranscriptEntry>,
    pub host_value: Value,
    pub peer_value: Value,
    pub in_sync: bool,
}

impl Output for LoopbackResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Session: {}", self.session_url)];
        for entry in &self.transcript {
            lines.push(format!("  {:>4} -> {}", entry.from, entry.message));
        }
        lines.push(format!(
            "{}: host={} peer={} ({})",
            self.key,
            string_form(&self.host_value),
            string_form(&self.peer_value),
            if self.in_sync { "in sync" } else { "DIVERGED" }
        ));
        lines.join("\n")
    }
}

/// Both ends of an in-process bridge joined by memory transports.
struct Loopback {
    host: HostBridge<SettingsConfig<MemoryStore>>,
    peer: PeerBridge,
    host_out: MemoryTransport,
    peer_out: MemoryTransport,
    transcript: Vec<TranscriptEntry>,
}

impl Loopback {
    fn record(&mut self, from: &'static str, raw: &str) {
        let message = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        self.transcript.push(TranscriptEntry { from, message });
    }

    /// Deliver queued messages both ways until neither side has more to say.
    fn pump(&mut self) -> Result<()> {
        while !self.host_out.is_empty() || !self.peer_out.is_empty() {
            for raw in self.peer_out.drain() {
                self.record("peer", &raw);
                self.host.on_web_event_received(&raw)?;
            }
            for raw in self.host_out.drain() {
                self.record("host", &raw);
                self.peer.on_script_event_received(&raw);
            }
        }
        Ok(())
    }
}

/// Run a host and a peer in-process and walk them through the handshake,
/// a correlated read and a host-side drift push for `key`.
pub fn loopback(config: &ResolvedConfig, key: &str, value: Value) -> Result<LoopbackResult> {
    let settings = registry_with_defaults(config, MemoryStore::new());
    let uuid = settings.uuid().to_string();
    let namespace = config.namespace().to_string();

    let host_out = MemoryTransport::new();
    let peer_out = MemoryTransport::new();
    let host = HostBridge::new(&namespace, &uuid, LOOPBACK_URL, settings)
        .with_transport(TransportSlot::with(host_out.clone()))
        .with_extra_params(serde_json::json!({ "source": CLI_ORIGIN }))
        .with_monitor_interval(config.monitor_interval());
    let peer = PeerBridge::new(&namespace, &uuid, TransportSlot::with(peer_out.clone()))
        .with_request_timeout(config.request_timeout())
        .with_debug(config.debug());

    let mut run = Loopback {
        host,
        peer,
        host_out,
        peer_out,
        transcript: Vec::new(),
    };
    let session_url = run.host.session_url()?;

    run.peer.announce()?;
    run.pump()?;

    let reply = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&reply);
    run.peer.get_value_async(
        key,
        None,
        Some(Box::new(move |result: Result<Value>| {
            *sink.borrow_mut() = Some(result.map_err(|e| e.to_string()));
        }) as Callback),
    )?;
    run.pump()?;
    if let Some(Err(e)) = reply.borrow_mut().take() {
        return Err(Error::Remote(e));
    }

    run.host
        .settings_mut()
        .set_value_from(key, value, CLI_ORIGIN)?;
    let pushed = run.host.sync_settings()?;
    debug!(?pushed, "drift pushed");
    run.pump()?;

    let qualified = run.peer.resolve(key);
    let host_value = run.host.settings().get_value(key, None);
    let peer_value = run.peer.get_value(key, None);
    Ok(LoopbackResult {
        key: qualified,
        session_url,
        in_sync: same_value(&host_value, &peer_value),
        transcript: run.transcript,
        host_value,
        peer_value,
    })
}
