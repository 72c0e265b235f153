//! Host side of the settings bridge.
//!
//! [`HostBridge`] owns the session (namespace + uuid), answers the peer's
//! `Settings.getValue` / `Settings.setValue` requests against a
//! [`SettingsApi`], relays changes in both directions, and runs a drift
//! monitor while the web view is open.
//!
//! For every key it tracks three values:
//! - `sent`: last value pushed to the peer
//! - `received`: last value pushed by the peer
//! - `remote`: what the peer is believed to hold now
//!
//! Only `remote` is consulted when deciding whether the peer is stale.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::protocol::{self, EVENT_EXTRA_PARAMS, Envelope, METHOD_VALUE_UPDATED, Message};
use super::transport::{Screen, TransportSlot};
use crate::signal::{Signal, ValueChange};
use crate::store::SettingsApi;
use crate::timer::Interval;
use crate::value::same_value;
use crate::{Error, Result};

/// Origin used when the drift monitor pushes a changed settings value.
pub const DRIFT_ORIGIN: &str = "Settings";
/// Origin used for writes requested by the peer through `Settings.setValue`.
pub const REMOTE_SET_ORIGIN: &str = "remote.Settings.setValue";

/// Default drift monitor period.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Web view not shown.
    Inactive,
    /// Web view shown; the drift monitor runs.
    Active,
}

/// What the host screen switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenKind {
    Web,
    Home,
    Other,
}

/// Handler for messages the bridge does not recognise.
pub type UnhandledHook = Box<dyn FnMut(&Envelope)>;

pub struct HostBridge<S> {
    settings: S,
    namespace: String,
    uuid: String,
    url: String,
    extra_params: Value,
    state: BridgeState,
    transport: TransportSlot,
    screen: Option<Box<dyn Screen>>,
    sent: BTreeMap<String, Value>,
    received: BTreeMap<String, Value>,
    remote: BTreeMap<String, Value>,
    monitor: Interval,
    value_updated: Signal<ValueChange>,
    is_active_changed: Signal<bool>,
    on_unhandled_message: Option<UnhandledHook>,
}

impl<S: SettingsApi> HostBridge<S> {
    /// Create an inactive bridge for the web view at `url`.
    pub fn new(
        namespace: impl Into<String>,
        uuid: impl Into<String>,
        url: impl Into<String>,
        settings: S,
    ) -> Self {
        Self {
            settings,
            namespace: namespace.into(),
            uuid: uuid.into(),
            url: url.into(),
            extra_params: Value::Object(Default::default()),
            state: BridgeState::Inactive,
            transport: TransportSlot::new(),
            screen: None,
            sent: BTreeMap::new(),
            received: BTreeMap::new(),
            remote: BTreeMap::new(),
            monitor: Interval::new(DEFAULT_MONITOR_INTERVAL),
            value_updated: Signal::new("valueUpdated"),
            is_active_changed: Signal::new("isActiveChanged"),
            on_unhandled_message: None,
        }
    }

    pub fn with_transport(mut self, transport: TransportSlot) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_screen(mut self, screen: impl Screen + 'static) -> Self {
        self.screen = Some(Box::new(screen));
        self
    }

    pub fn with_extra_params(mut self, extra_params: Value) -> Self {
        self.extra_params = extra_params;
        self
    }

    pub fn with_monitor_interval(mut self, period: Duration) -> Self {
        self.monitor = Interval::new(period);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn transport(&self) -> &TransportSlot {
        &self.transport
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    pub fn extra_params(&self) -> &Value {
        &self.extra_params
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == BridgeState::Active
    }

    pub fn value_updated(&mut self) -> &mut Signal<ValueChange> {
        &mut self.value_updated
    }

    pub fn is_active_changed(&mut self) -> &mut Signal<bool> {
        &mut self.is_active_changed
    }

    /// Install the handler for messages the bridge does not recognise.
    pub fn set_unhandled_handler(&mut self, hook: impl FnMut(&Envelope) + 'static) {
        self.on_unhandled_message = Some(Box::new(hook));
    }

    /// Last value pushed to the peer.
    pub fn sent(&self, key: &str) -> Option<&Value> {
        self.sent.get(&self.settings.resolve(key))
    }

    /// Last value pushed by the peer.
    pub fn received(&self, key: &str) -> Option<&Value> {
        self.received.get(&self.settings.resolve(key))
    }

    /// What the peer is believed to hold.
    pub fn remote(&self, key: &str) -> Option<&Value> {
        self.remote.get(&self.settings.resolve(key))
    }

    /// Web view URL carrying the session parameters as `ns` and `uuid`.
    pub fn session_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::InvalidInput(format!("invalid web view url {}: {}", self.url, e)))?;
        url.query_pairs_mut()
            .append_pair("ns", &self.namespace)
            .append_pair("uuid", &self.uuid);
        Ok(url.to_string())
    }

    fn set_state(&mut self, state: BridgeState) {
        if self.state == state {
            return;
        }
        self.state = state;
        if state == BridgeState::Inactive {
            self.monitor.stop();
        }
        info!(namespace = %self.namespace, "bridge {:?}", state);
        self.is_active_changed.emit(&(state == BridgeState::Active));
    }

    /// Show or hide the web view; `None` flips the current state.
    pub fn toggle(&mut self, show: Option<bool>) -> Result<()> {
        let show = show.unwrap_or(!self.is_active());
        if show {
            let url = self.session_url()?;
            if let Some(screen) = self.screen.as_mut() {
                screen.goto_web_screen(&url);
            }
            self.set_state(BridgeState::Active);
        } else {
            if self.is_active() {
                if let Some(screen) = self.screen.as_mut() {
                    screen.goto_home_screen();
                }
            }
            self.set_state(BridgeState::Inactive);
        }
        Ok(())
    }

    /// Track the host screen; any screen other than this bridge's page deactivates it.
    pub fn on_screen_changed(&mut self, kind: ScreenKind, url: &str) {
        let ours = kind == ScreenKind::Web && url.starts_with(&self.url);
        trace!(?kind, url, ours, "screen changed");
        self.set_state(if ours {
            BridgeState::Active
        } else {
            BridgeState::Inactive
        });
    }

    /// Deactivate and release the hook. The transport is left attached.
    pub fn cleanup(&mut self) {
        if self.is_active() {
            if let Some(screen) = self.screen.as_mut() {
                screen.goto_home_screen();
            }
            self.set_state(BridgeState::Inactive);
        }
        self.monitor.stop();
        self.on_unhandled_message = None;
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        if !self.transport.is_attached() {
            return Err(Error::NoTransport);
        }
        self.transport.send(&envelope.encode()?)
    }

    /// Push `value` for `key` to the peer and signal it locally.
    pub fn sync_value(&mut self, key: &str, value: Value, origin: &str) -> Result<()> {
        let key = self.settings.resolve(key);
        let old_value = self.remote.get(&key).cloned().unwrap_or(Value::Null);
        let envelope = Envelope::event(
            &self.namespace,
            &self.uuid,
            METHOD_VALUE_UPDATED,
            vec![
                Value::from(key.clone()),
                value.clone(),
                old_value.clone(),
                Value::from(origin),
            ],
        );
        self.send(&envelope)?;

        debug!(key = %key, origin, "sync {} (was: {})", value, old_value);
        self.sent.insert(key.clone(), value.clone());
        self.remote.insert(key.clone(), value.clone());
        self.value_updated
            .emit(&ValueChange::new(key, value, old_value, origin));
        Ok(())
    }

    /// Handle one raw message from the web view.
    ///
    /// Messages for other sessions and malformed payloads are ignored.
    /// Errors are transport failures while replying, or a failed write of a
    /// value the peer pushed.
    pub fn on_web_event_received(&mut self, text: &str) -> Result<()> {
        let Some(message) = protocol::decode(text, &self.namespace, &self.uuid) else {
            return Ok(());
        };
        match message {
            Message::ValueUpdated(change) => self.apply_peer_value(change),
            Message::GetValue { id, key, default } => {
                let result = self.get_for_peer(&key, default);
                self.reply(id, result)
            }
            Message::SetValue { id, key, value } => {
                let result = self.set_for_peer(&key, value);
                self.reply(id, result)
            }
            Message::Ready => {
                self.set_state(BridgeState::Active);
                let envelope = Envelope::event(
                    &self.namespace,
                    &self.uuid,
                    EVENT_EXTRA_PARAMS,
                    vec![self.extra_params.clone()],
                );
                self.send(&envelope)
            }
            Message::ExtraParams(_) | Message::Response { .. } => {
                trace!("ignoring peer-bound message echoed to host");
                Ok(())
            }
            Message::Unhandled(envelope) => {
                match self.on_unhandled_message.as_mut() {
                    Some(hook) => hook(&envelope),
                    None => debug!("unhandled message: {:?}", envelope.method_name()),
                }
                Ok(())
            }
        }
    }

    /// Store a value pushed by the peer. Bookkeeping is only updated once
    /// the write has succeeded.
    fn apply_peer_value(&mut self, change: ValueChange) -> Result<()> {
        let key = self.settings.resolve(&change.key);
        let current = self.settings.get_value(&key, None);
        let changed = !same_value(&current, &change.value)
            && self
                .settings
                .set_value_from(&key, change.value.clone(), &change.origin)
                .inspect_err(|e| warn!(key = %key, "failed to store peer value: {}", e))?;

        self.received.insert(key.clone(), change.value.clone());
        self.remote.insert(key.clone(), change.value.clone());
        if changed {
            self.value_updated
                .emit(&ValueChange::new(key, change.value, current, change.origin));
        }
        Ok(())
    }

    fn request_key(&self, key: &Value) -> Result<String> {
        match key {
            Value::String(key) => Ok(self.settings.resolve(key)),
            other => Err(Error::InvalidKey(other.to_string())),
        }
    }

    fn get_for_peer(&mut self, key: &Value, default: Option<Value>) -> Result<Value> {
        let key = self.request_key(key)?;
        let value = self.settings.get_value(&key, default);
        self.sent.insert(key.clone(), value.clone());
        self.remote.insert(key, value.clone());
        Ok(value)
    }

    fn set_for_peer(&mut self, key: &Value, value: Value) -> Result<Value> {
        let key = self.request_key(key)?;
        let old_value = self.settings.get_value(&key, None);
        if self
            .settings
            .set_value_from(&key, value.clone(), REMOTE_SET_ORIGIN)?
        {
            self.value_updated.emit(&ValueChange::new(
                key.clone(),
                value.clone(),
                old_value,
                REMOTE_SET_ORIGIN,
            ));
        }
        let stored = self.settings.get_value(&key, None);
        self.sent.insert(key.clone(), stored.clone());
        self.remote.insert(key, stored.clone());
        Ok(stored)
    }

    fn reply(&self, id: Option<Value>, result: Result<Value>) -> Result<()> {
        let Some(id) = id else {
            if let Err(e) = result {
                warn!("peer request failed: {}", e);
            }
            return Ok(());
        };
        let envelope = Envelope::response(
            &self.namespace,
            &self.uuid,
            id,
            result.map_err(|e| e.to_string()),
        );
        self.send(&envelope)
    }

    pub fn start_monitor(&mut self, now: Instant) {
        self.monitor.start(now);
    }

    pub fn stop_monitor(&mut self) {
        self.monitor.stop();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Drive the drift monitor. Returns the keys pushed to the peer.
    ///
    /// While active, the first tick after activation arms the monitor; later
    /// ticks run [`HostBridge::sync_settings`] once per interval.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<String>> {
        if !self.is_active() {
            return Ok(Vec::new());
        }
        if !self.monitor.is_running() {
            self.monitor.start(now);
            return Ok(Vec::new());
        }
        if !self.monitor.poll(now) {
            return Ok(Vec::new());
        }
        self.sync_settings()
    }

    /// Push every previously sent key whose live value no longer matches `remote`.
    pub fn sync_settings(&mut self) -> Result<Vec<String>> {
        let keys: Vec<String> = self.sent.keys().cloned().collect();
        let mut pushed = Vec::new();
        for key in keys {
            let live = self.settings.get_value(&key, None);
            if self.remote.get(&key).is_some_and(|remote| same_value(remote, &live)) {
                continue;
            }
            self.sync_value(&key, live, DRIFT_ORIGIN)?;
            pushed.push(key);
        }
        Ok(pushed)
    }
}
