//! stomprack - reactive client for a remote pedalboard effect host
//!
//! The host owns an audio-effect processing graph and is the sole source of
//! truth for it. This crate keeps a local mirror of that graph synchronized
//! over the host's line-oriented event feed, computes the port-to-port
//! routing for a linear effect chain between the hardware capture and
//! playback ports, and issues corrective REST calls whenever the mirror and
//! the desired routing drift apart.
//!
//! # Architecture
//!
//! - [`transport::Transport`] - persistent duplex feed connection with
//!   lifetime reconnection
//! - [`bus::EventBus`] - typed publish/subscribe with replay-on-subscribe
//! - [`client::SocketClient`] - transport + protocol + bus wiring
//! - [`rest::RestClient`] - one thin method per host REST endpoint
//! - [`routing`] - pure connection-pair math with "join" fan-out semantics
//! - [`layout`] - pure grid clustering, ordering, and normalization
//! - [`rack::Rack`] - the orchestrator: local state machine, debounced
//!   reconciliation, request API
//! - [`plugin`] - plugin and control-port value model
//!
//! # The one rule
//!
//! Request methods on [`rack::Rack`] never mutate local state. They ask the
//! host to make a change; the authoritative mutation happens when the
//! host's confirming event arrives back over the feed. A request that
//! "succeeds" has merely been accepted.

pub mod bus;
pub mod client;
pub mod error;
pub mod layout;
pub mod plugin;
pub mod rack;
pub mod rest;
pub mod routing;
pub mod slot;
pub mod transport;

pub use bus::{EventBus, Subscription};
pub use client::SocketClient;
pub use error::RackError;
pub use rack::{Rack, RackMode, RackOptions};
pub use rest::{EffectApi, RestClient, RestError, RestValue};
pub use slot::{ChainNode, HardwareSlot, PluginSlot, PortDirection};
