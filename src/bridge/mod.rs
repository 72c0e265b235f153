//! The message bridge between the host script and the web view peer.

pub mod host;
pub mod peer;
pub mod protocol;
pub mod transport;

pub use host::{BridgeState, HostBridge, ScreenKind};
pub use peer::{Callback, PeerBridge};
pub use protocol::{Envelope, Message};
pub use transport::{MemoryTransport, Screen, Transport, TransportSlot};
