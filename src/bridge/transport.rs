//! The message channel between host and peer.
//!
//! Transports are provided by the environment and may be swapped at any
//! time (the web view reloads, the tablet is recreated). A [`TransportSlot`]
//! is a shared handle to whichever transport is current; every send reads
//! the slot afresh.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc;

use crate::{Error, Result};

/// Outbound half of the serialized message channel.
pub trait Transport {
    fn emit(&mut self, message: &str) -> Result<()>;
}

/// Host screen navigation for the web view that hosts the peer.
pub trait Screen {
    fn goto_web_screen(&mut self, url: &str);

    fn goto_home_screen(&mut self);
}

/// Replaceable, shared handle to the current transport.
#[derive(Clone, Default)]
pub struct TransportSlot {
    inner: Rc<RefCell<Option<Box<dyn Transport>>>>,
}

impl TransportSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(transport: impl Transport + 'static) -> Self {
        let slot = Self::new();
        slot.replace(transport);
        slot
    }

    /// Install a new transport, dropping the old one.
    pub fn replace(&self, transport: impl Transport + 'static) {
        *self.inner.borrow_mut() = Some(Box::new(transport));
    }

    pub fn clear(&self) {
        *self.inner.borrow_mut() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.inner.borrow().is_some()
    }

    /// Send through the current transport.
    pub fn send(&self, message: &str) -> Result<()> {
        match self.inner.borrow_mut().as_mut() {
            Some(transport) => transport.emit(message),
            None => Err(Error::NoTransport),
        }
    }
}

impl fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Transport that queues messages for the caller to deliver.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    outbox: Rc<RefCell<VecDeque<String>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued message, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.outbox.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbox.borrow().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn emit(&mut self, message: &str) -> Result<()> {
        self.outbox.borrow_mut().push_back(message.to_string());
        Ok(())
    }
}

impl Transport for mpsc::Sender<String> {
    fn emit(&mut self, message: &str) -> Result<()> {
        self.send(message.to_string())
            .map_err(|_| Error::Other("transport channel closed".to_string()))
    }
}
