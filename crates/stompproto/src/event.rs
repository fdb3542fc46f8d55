//! Typed events decoded from the host's feed.

use serde::{Deserialize, Serialize};

/// A single event from the host feed.
///
/// Coordinates and parameter values are `f64` as they arrive on the wire.
/// `Unknown` carries the raw line so callers can log what the host said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Keepalive. Must be answered with a literal `pong`.
    Ping,
    /// DSP load and xrun counter, streamed continuously.
    Stats { cpu_load: f64, xruns: i64 },
    /// System load figures, streamed less often.
    SysStats {
        mem_load: f64,
        cpu_freq: i64,
        cpu_temp: i64,
    },
    /// The host started (re)building its graph. All prior state is stale.
    LoadingStart,
    /// The host finished streaming the graph.
    LoadingEnd,
    /// Every effect instance was removed (`remove :all`).
    RemoveAll,
    /// The host dropped every connection.
    ResetConnections,
    /// A hardware audio port appeared.
    HardwarePortAdded { name: String, is_output: bool },
    /// An effect instance was loaded into the graph.
    PluginAdded {
        label: String,
        uri: String,
        x: f64,
        y: f64,
    },
    /// An effect instance was removed.
    PluginRemoved { label: String },
    /// An instance moved on the host's canvas.
    PluginPositionChanged { label: String, x: f64, y: f64 },
    /// A control parameter changed value.
    ParamChanged {
        label: String,
        symbol: String,
        value: f64,
    },
    /// The `:bypass` pseudo-parameter changed.
    BypassChanged { label: String, bypassed: bool },
    /// Two ports were connected.
    Connected { src_path: String, dst_path: String },
    /// Two ports were disconnected.
    Disconnected { src_path: String, dst_path: String },
    /// Anything we could not decode. Never an error.
    Unknown { msg_type: String, raw: String },
}

/// Variant tag, used to key listener maps and the state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Ping,
    Stats,
    SysStats,
    LoadingStart,
    LoadingEnd,
    RemoveAll,
    ResetConnections,
    HardwarePortAdded,
    PluginAdded,
    PluginRemoved,
    PluginPositionChanged,
    ParamChanged,
    BypassChanged,
    Connected,
    Disconnected,
    Unknown,
}

/// Identity of an event for de-duplication, ignoring volatile payload
/// fields.
///
/// Two `ParamChanged` for the same (label, symbol) share a key and only the
/// latest value is worth keeping; likewise two position changes for one
/// label, or two `Stats` lines. Connections are identified by both
/// endpoints. `Unknown` is keyed by verb so a chatty unrecognized message
/// type cannot grow the snapshot without bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Events whose entire payload is volatile (or empty).
    Variant(EventKind),
    /// Events identified by an instance label.
    Label(EventKind, String),
    /// `ParamChanged`, identified by (label, symbol).
    Param(String, String),
    /// `HardwarePortAdded`, identified by name and direction.
    HardwarePort(String, bool),
    /// Connect/disconnect, identified by the port pair.
    Pair(EventKind, String, String),
    /// `Unknown`, identified by the unrecognized verb.
    Verb(String),
}

impl Event {
    /// The variant tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Ping => EventKind::Ping,
            Event::Stats { .. } => EventKind::Stats,
            Event::SysStats { .. } => EventKind::SysStats,
            Event::LoadingStart => EventKind::LoadingStart,
            Event::LoadingEnd => EventKind::LoadingEnd,
            Event::RemoveAll => EventKind::RemoveAll,
            Event::ResetConnections => EventKind::ResetConnections,
            Event::HardwarePortAdded { .. } => EventKind::HardwarePortAdded,
            Event::PluginAdded { .. } => EventKind::PluginAdded,
            Event::PluginRemoved { .. } => EventKind::PluginRemoved,
            Event::PluginPositionChanged { .. } => EventKind::PluginPositionChanged,
            Event::ParamChanged { .. } => EventKind::ParamChanged,
            Event::BypassChanged { .. } => EventKind::BypassChanged,
            Event::Connected { .. } => EventKind::Connected,
            Event::Disconnected { .. } => EventKind::Disconnected,
            Event::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// The de-duplication key of this event.
    pub fn key(&self) -> EventKey {
        match self {
            Event::HardwarePortAdded { name, is_output } => {
                EventKey::HardwarePort(name.clone(), *is_output)
            }
            Event::PluginAdded { label, .. }
            | Event::PluginRemoved { label }
            | Event::PluginPositionChanged { label, .. }
            | Event::BypassChanged { label, .. } => EventKey::Label(self.kind(), label.clone()),
            Event::ParamChanged { label, symbol, .. } => {
                EventKey::Param(label.clone(), symbol.clone())
            }
            Event::Connected { src_path, dst_path } | Event::Disconnected { src_path, dst_path } => {
                EventKey::Pair(self.kind(), src_path.clone(), dst_path.clone())
            }
            Event::Unknown { msg_type, .. } => EventKey::Verb(msg_type.clone()),
            _ => EventKey::Variant(self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn param_key_ignores_value() {
        let a = Event::ParamChanged {
            label: "DS1_ab12".into(),
            symbol: "Dist".into(),
            value: 0.2,
        };
        let b = Event::ParamChanged {
            label: "DS1_ab12".into(),
            symbol: "Dist".into(),
            value: 0.9,
        };
        assert_eq!(a.key(), b.key());

        let c = Event::ParamChanged {
            label: "DS1_ab12".into(),
            symbol: "Tone".into(),
            value: 0.2,
        };
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn position_key_ignores_coordinates() {
        let a = Event::PluginPositionChanged {
            label: "fuzz_1".into(),
            x: 10.0,
            y: 20.0,
        };
        let b = Event::PluginPositionChanged {
            label: "fuzz_1".into(),
            x: 900.0,
            y: 40.0,
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn connect_and_disconnect_keys_differ() {
        let a = Event::Connected {
            src_path: "x/out".into(),
            dst_path: "y/in".into(),
        };
        let b = Event::Disconnected {
            src_path: "x/out".into(),
            dst_path: "y/in".into(),
        };
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn stats_collapse_to_one_key() {
        let a = Event::Stats {
            cpu_load: 12.5,
            xruns: 0,
        };
        let b = Event::Stats {
            cpu_load: 99.0,
            xruns: 7,
        };
        assert_eq!(a.key(), b.key());
    }
}
