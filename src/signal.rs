//! Minimal typed signal (observer) primitive.
//!
//! A [`Signal`] holds an ordered list of handlers. [`Signal::emit`] invokes
//! every handler synchronously, in registration order, with the same
//! argument. Each [`Signal::connect`] returns a [`SlotId`] that identifies
//! that registration for [`Signal::disconnect`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

struct Slot<A> {
    id: SlotId,
    once: bool,
    handler: Box<dyn FnMut(&A)>,
}

/// A named, synchronous, ordered event emitter.
pub struct Signal<A> {
    name: &'static str,
    slots: Vec<Slot<A>>,
    next_id: u64,
}

impl<A> Signal<A> {
    /// Create a signal with no handlers.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Vec::new(),
            next_id: 0,
        }
    }

    /// Signal name, used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a handler. Delivery is at most once per `emit` per connection.
    pub fn connect(&mut self, handler: impl FnMut(&A) + 'static) -> SlotId {
        self.push(handler, false)
    }

    /// Register a handler that is disconnected after its first delivery.
    pub fn connect_once(&mut self, handler: impl FnMut(&A) + 'static) -> SlotId {
        self.push(handler, true)
    }

    fn push(&mut self, handler: impl FnMut(&A) + 'static, once: bool) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            once,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a registration. Unknown slots are ignored.
    ///
    /// Returns true if a handler was removed.
    pub fn disconnect(&mut self, slot: SlotId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.id != slot);
        before != self.slots.len()
    }

    /// Invoke every connected handler with `args`.
    pub fn emit(&mut self, args: &A) {
        for slot in self.slots.iter_mut() {
            (slot.handler)(args);
        }
        self.slots.retain(|s| !s.once);
    }

    /// Number of connected handlers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("handlers", &self.slots.len())
            .finish()
    }
}

/// Payload of every `valueUpdated` signal: `(key, value, old_value, origin)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub key: String,
    pub value: Value,
    pub old_value: Value,
    /// Free-text tag naming the code path that caused the change.
    pub origin: String,
}

impl ValueChange {
    pub fn new(
        key: impl Into<String>,
        value: Value,
        old_value: Value,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            old_value,
            origin: origin.into(),
        }
    }
}

impl fmt::Display for ValueChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} = {} (was: {})",
            self.origin, self.key, self.value, self.old_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Box<dyn FnMut(&i32)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |tag: &'static str| -> Box<dyn FnMut(&i32)> {
            let sink = sink.clone();
            Box::new(move |v: &i32| sink.borrow_mut().push(format!("{}:{}", tag, v)))
        };
        (log, make)
    }

    #[test]
    fn test_emit_runs_handlers_in_registration_order() {
        let (log, make) = recorder();
        let mut signal = Signal::new("test");
        signal.connect(make("a"));
        signal.connect(make("b"));
        signal.connect(make("c"));

        signal.emit(&7);

        assert_eq!(*log.borrow(), vec!["a:7", "b:7", "c:7"]);
    }

    #[test]
    fn test_disconnect_by_identity() {
        let (log, make) = recorder();
        let mut signal = Signal::new("test");
        let _a = signal.connect(make("a"));
        let b = signal.connect(make("b"));

        assert!(signal.disconnect(b));
        signal.emit(&1);

        assert_eq!(*log.borrow(), vec!["a:1"]);
    }

    #[test]
    fn test_disconnect_unknown_slot_is_noop() {
        let mut signal: Signal<i32> = Signal::new("test");
        let slot = signal.connect(|_| {});
        assert!(signal.disconnect(slot));
        assert!(!signal.disconnect(slot));
        assert!(signal.is_empty());
    }

    #[test]
    fn test_emit_without_handlers() {
        let mut signal: Signal<i32> = Signal::new("empty");
        signal.emit(&3);
        assert_eq!(signal.len(), 0);
    }

    #[test]
    fn test_connect_once_delivers_single_time() {
        let (log, make) = recorder();
        let mut signal = Signal::new("test");
        signal.connect_once(make("once"));
        signal.connect(make("always"));

        signal.emit(&1);
        signal.emit(&2);

        assert_eq!(*log.borrow(), vec!["once:1", "always:1", "always:2"]);
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn test_value_change_display() {
        let change = ValueChange::new("ns/fps", 90.into(), 60.into(), "test");
        assert_eq!(change.to_string(), "[test] ns/fps = 90 (was: 60)");
    }
}
