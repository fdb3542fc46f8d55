//! Feed client: transport + protocol + event bus wired together.
//!
//! Every inbound line is parsed into an [`Event`] and dispatched on the
//! bus. `ping` is answered with a literal `pong` before dispatch. On a
//! (re)opened connection the bus snapshot is cleared - the host streams
//! the whole authoritative graph state after each connect.

use std::sync::Arc;

use stompproto::{command, Event};

use crate::bus::EventBus;
use crate::transport::{Transport, TransportEvent, TransportHandle, TransportOptions};

/// Client side of the host's event feed.
pub struct SocketClient {
    transport: Transport,
    bus: Arc<EventBus>,
}

impl SocketClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_options(addr, TransportOptions::default())
    }

    pub fn with_options(addr: impl Into<String>, options: TransportOptions) -> Self {
        Self {
            transport: Transport::new(addr, options),
            bus: Arc::new(EventBus::new()),
        }
    }

    /// The bus this client dispatches onto.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    /// Start the feed connection. Subscribe on [`Self::bus`] first so the
    /// initial state stream is not missed.
    pub fn connect(&self) {
        let bus = Arc::clone(&self.bus);
        let handle = self.transport.handle();

        self.transport.connect(Arc::new(move |transport_event| {
            match transport_event {
                TransportEvent::Open => bus.clear(),
                TransportEvent::Message(line) => {
                    tracing::trace!(line = %line, "feed recv");
                    let event = stompproto::parse(&line);
                    if matches!(event, Event::Ping) {
                        handle.send(command::pong());
                    }
                    bus.dispatch(event);
                }
                TransportEvent::Closed => {
                    tracing::info!("feed connection closed");
                }
            }
        }));
    }

    /// Close the feed and disable reconnection.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// Raw send handle, mainly for tests and diagnostics.
    pub fn handle(&self) -> TransportHandle {
        self.transport.handle()
    }

    /// Set a parameter over the feed. Dropped (returns `false`) when the
    /// connection is down.
    pub fn param_set(&self, label: &str, symbol: &str, value: f64) -> bool {
        self.transport
            .handle()
            .send(command::param_set(label, symbol, value))
    }

    /// Toggle bypass over the feed.
    pub fn bypass(&self, label: &str, bypassed: bool) -> bool {
        self.transport.handle().send(command::bypass(label, bypassed))
    }

    /// Push a canvas position over the feed.
    pub fn plugin_pos(&self, label: &str, x: f64, y: f64) -> bool {
        self.transport
            .handle()
            .send(command::plugin_pos(label, x, y))
    }
}
