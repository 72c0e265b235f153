//! Peer (web view) side of the settings bridge.
//!
//! [`PeerBridge`] keeps a mirror of the values it has seen, writes changes
//! back to the host fire-and-forget, and issues correlated
//! `Settings.getValue` / `Settings.setValue` requests whose responses are
//! matched by numeric id.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::host::UnhandledHook;
use super::protocol::{
    self, Envelope, METHOD_GET_VALUE, METHOD_READY, METHOD_SET_VALUE, METHOD_VALUE_UPDATED,
    Message, RequestId,
};
use super::transport::TransportSlot;
use crate::keys::KeyResolver;
use crate::signal::{Signal, ValueChange};
use crate::value::same_value;
use crate::{Error, Result};

/// Origin tag for [`PeerBridge::set_value`].
pub const PEER_SET_ORIGIN: &str = "BridgedSettings.setValue";

/// Default time a correlated request may stay unanswered.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Completion handler for a correlated request.
pub type Callback = Box<dyn FnOnce(Result<Value>)>;

/// Time source stamping issued requests; compared against the `now`
/// passed to [`PeerBridge::expire_pending`].
pub type Clock = Box<dyn Fn() -> Instant>;

struct Pending {
    /// Mirror entry refreshed from a successful response.
    key: String,
    callback: Option<Callback>,
    issued_at: Instant,
}

pub struct PeerBridge {
    resolver: KeyResolver,
    uuid: String,
    transport: TransportSlot,
    mirror: BTreeMap<String, Value>,
    pending: BTreeMap<RequestId, Pending>,
    next_id: RequestId,
    request_timeout: Duration,
    clock: Clock,
    debug: bool,
    extra_params: Value,
    value_updated: Signal<ValueChange>,
    value_received: Signal<ValueChange>,
    callback_error: Signal<String>,
    pending_requests_finished: Signal<()>,
    on_unhandled_message: Option<UnhandledHook>,
}

impl PeerBridge {
    pub fn new(namespace: impl Into<String>, uuid: impl Into<String>, transport: TransportSlot) -> Self {
        Self {
            resolver: KeyResolver::new(namespace),
            uuid: uuid.into(),
            transport,
            mirror: BTreeMap::new(),
            pending: BTreeMap::new(),
            next_id: 1,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            clock: Box::new(Instant::now),
            debug: false,
            extra_params: Value::Null,
            value_updated: Signal::new("valueUpdated"),
            value_received: Signal::new("valueReceived"),
            callback_error: Signal::new("callbackError"),
            pending_requests_finished: Signal::new("pendingRequestsFinished"),
            on_unhandled_message: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> Instant + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Re-raise callback panics after reporting them.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn namespace(&self) -> &str {
        self.resolver.namespace()
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn resolve(&self, key: &str) -> String {
        self.resolver.resolve(key)
    }

    /// Parameters the host sent with `extraParams`, `Null` until then.
    pub fn extra_params(&self) -> &Value {
        &self.extra_params
    }

    pub fn value_updated(&mut self) -> &mut Signal<ValueChange> {
        &mut self.value_updated
    }

    pub fn value_received(&mut self) -> &mut Signal<ValueChange> {
        &mut self.value_received
    }

    pub fn callback_error(&mut self) -> &mut Signal<String> {
        &mut self.callback_error
    }

    pub fn pending_requests_finished(&mut self) -> &mut Signal<()> {
        &mut self.pending_requests_finished
    }

    pub fn set_unhandled_handler(&mut self, hook: impl FnMut(&Envelope) + 'static) {
        self.on_unhandled_message = Some(Box::new(hook));
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    /// Read from the local mirror only.
    pub fn get_value(&self, key: &str, default: Option<Value>) -> Value {
        self.mirror
            .get(&self.resolve(key))
            .cloned()
            .or(default)
            .unwrap_or(Value::Null)
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        self.transport.send(&envelope.encode()?)
    }

    fn request(
        &mut self,
        method: &str,
        key: String,
        params: Vec<Value>,
        callback: Option<Callback>,
    ) -> Result<RequestId> {
        let id = self.next_id;
        let envelope = Envelope::request(self.namespace(), &self.uuid, method, params, Some(id));
        self.send(&envelope)?;

        self.next_id += 1;
        self.pending.insert(
            id,
            Pending {
                key,
                callback,
                issued_at: (self.clock)(),
            },
        );
        trace!(id, method, "request issued");
        Ok(id)
    }

    /// Ask the host for the current value of `key`.
    ///
    /// The mirror is refreshed when the response arrives, whether or not a
    /// callback was supplied.
    pub fn get_value_async(
        &mut self,
        key: &str,
        default: Option<Value>,
        callback: Option<Callback>,
    ) -> Result<RequestId> {
        let key = self.resolve(key);
        let mut params = vec![Value::from(key.clone())];
        params.extend(default);
        self.request(METHOD_GET_VALUE, key, params, callback)
    }

    /// Write `value` through the host and receive the stored result.
    pub fn set_value_async(
        &mut self,
        key: &str,
        value: Value,
        callback: Option<Callback>,
    ) -> Result<RequestId> {
        let key = self.resolve(key);
        let params = vec![Value::from(key.clone()), value];
        self.request(METHOD_SET_VALUE, key, params, callback)
    }

    pub fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.sync_value(key, value, PEER_SET_ORIGIN)
    }

    /// Record `value` locally and notify the host, without waiting.
    pub fn sync_value(&mut self, key: &str, value: Value, origin: &str) -> Result<()> {
        let key = self.resolve(key);
        let previous = self.mirror.get(&key).cloned().unwrap_or(Value::Null);
        let envelope = Envelope::request(
            self.namespace(),
            &self.uuid,
            METHOD_VALUE_UPDATED,
            vec![
                Value::from(key.clone()),
                value.clone(),
                previous.clone(),
                Value::from(origin),
            ],
            None,
        );
        self.send(&envelope)?;

        self.mirror.insert(key.clone(), value.clone());
        if !same_value(&previous, &value) {
            self.value_updated
                .emit(&ValueChange::new(key, value, previous, origin));
        }
        Ok(())
    }

    /// Send an application message (`window.close`, `reset`, ...) to the host.
    pub fn send_event(&self, method: &str, params: Vec<Value>) -> Result<()> {
        self.send(&Envelope::request(
            self.namespace(),
            &self.uuid,
            method,
            params,
            None,
        ))
    }

    /// Tell the host this side is loaded.
    pub fn announce(&self) -> Result<()> {
        self.send_event(METHOD_READY, Vec::new())
    }

    /// Handle one raw message from the host.
    pub fn on_script_event_received(&mut self, text: &str) {
        let Some(message) = protocol::decode(text, self.namespace(), &self.uuid) else {
            return;
        };
        match message {
            Message::Response { id, result } => self.complete(id, result.map_err(Error::Remote)),
            Message::ValueUpdated(change) => self.receive_value(change),
            Message::ExtraParams(params) => {
                debug!("received extra params");
                self.extra_params = params;
            }
            Message::GetValue { .. } | Message::SetValue { .. } | Message::Ready => {
                trace!("ignoring host-bound message echoed to peer");
            }
            Message::Unhandled(envelope) => match self.on_unhandled_message.as_mut() {
                Some(hook) => hook(&envelope),
                None => debug!("unhandled message: {:?}", envelope.id),
            },
        }
    }

    fn receive_value(&mut self, change: ValueChange) {
        let key = self.resolve(&change.key);
        let previous = self.mirror.insert(key.clone(), change.value.clone());
        let change = ValueChange::new(key, change.value, change.old_value, change.origin);
        self.value_received.emit(&change);
        if !previous.as_ref().is_some_and(|p| same_value(p, &change.value)) {
            self.value_updated.emit(&ValueChange {
                old_value: previous.unwrap_or(Value::Null),
                ..change
            });
        }
    }

    fn complete(&mut self, id: RequestId, result: Result<Value>) {
        let Some(pending) = self.pending.remove(&id) else {
            trace!(id, "response for unknown request");
            return;
        };
        if let Ok(value) = &result {
            self.mirror.insert(pending.key.clone(), value.clone());
        }
        if let Some(callback) = pending.callback {
            self.invoke(callback, result);
        } else if let Err(e) = result {
            warn!(id, key = %pending.key, "request failed: {}", e);
        }
        if self.pending.is_empty() {
            self.pending_requests_finished.emit(&());
        }
    }

    fn invoke(&mut self, callback: Callback, result: Result<Value>) {
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || callback(result))) else {
            return;
        };
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "callback panicked".to_string());
        warn!("callback error: {}", message);
        self.callback_error.emit(&message);
        if self.debug {
            panic::resume_unwind(payload);
        }
    }

    /// Fail every request older than the configured timeout.
    ///
    /// Returns the number of requests expired.
    pub fn expire_pending(&mut self, now: Instant) -> usize {
        let timeout = self.request_timeout;
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.issued_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            debug!(id, "request timed out");
            self.complete(*id, Err(Error::Timeout(*id)));
        }
        expired.len()
    }
}
