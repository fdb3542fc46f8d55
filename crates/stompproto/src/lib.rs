//! stompproto - Wire protocol types for the stomprack client
//!
//! The pedalboard host streams a line-oriented text feed: one event per
//! line, space-separated tokens, first token is the verb. This crate turns
//! those lines into a closed [`Event`] enum and formats the handful of
//! commands the client sends back over the same connection.
//!
//! The protocol has no schema version. Verbs we do not recognize, and lines
//! whose numeric fields fail to parse, degrade to [`Event::Unknown`] rather
//! than erroring - the feed must keep flowing no matter what the host says.
//!
//! Effect instances and their ports are addressed by *graph path*:
//! `/graph/<label>` for an instance, `/graph/<label>/<port>` for one of its
//! ports. Hardware ports are `/graph/<name>`. The `/graph/` prefix is
//! stripped during parsing; everything downstream works with bare labels
//! and `label/port` paths.

pub mod command;
pub mod event;
pub mod parse;

pub use command::{bypass, param_set, plugin_pos, pong};
pub use event::{Event, EventKey, EventKind};
pub use parse::{parse, strip_graph_prefix, GRAPH_PREFIX};
