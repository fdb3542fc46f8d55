//! Plugin and control-port value model.
//!
//! Built from the host's effect metadata (the `/effect/get` JSON) when a
//! server-confirmed add arrives. The rack mutates cached values from feed
//! events; the control surface only reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stompconf::PluginConfig;

/// An audio port on a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub symbol: String,
    pub name: String,
    /// Bare graph path, `<label>/<symbol>`.
    pub graph_path: String,
}

/// Control port properties, a small bitset.
///
/// Mirrors the property list the host reports per control: `toggled`,
/// `integer`, `logarithmic`, `enumeration`, `trigger`, `hasStrictBounds`,
/// `notOnGUI`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlFlags(u8);

impl ControlFlags {
    pub const TOGGLED: ControlFlags = ControlFlags(1);
    pub const INTEGER: ControlFlags = ControlFlags(1 << 1);
    pub const LOGARITHMIC: ControlFlags = ControlFlags(1 << 2);
    pub const ENUMERATION: ControlFlags = ControlFlags(1 << 3);
    pub const TRIGGER: ControlFlags = ControlFlags(1 << 4);
    pub const STRICT_BOUNDS: ControlFlags = ControlFlags(1 << 5);
    pub const NOT_ON_GUI: ControlFlags = ControlFlags(1 << 6);

    pub fn contains(self, other: ControlFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ControlFlags) {
        self.0 |= other.0;
    }

    /// Parse the host's property name list.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut flags = ControlFlags::default();
        for name in names {
            match name {
                "toggled" => flags.insert(Self::TOGGLED),
                "integer" => flags.insert(Self::INTEGER),
                "logarithmic" => flags.insert(Self::LOGARITHMIC),
                "enumeration" => flags.insert(Self::ENUMERATION),
                "trigger" => flags.insert(Self::TRIGGER),
                "hasStrictBounds" => flags.insert(Self::STRICT_BOUNDS),
                "notOnGUI" => flags.insert(Self::NOT_ON_GUI),
                _ => {}
            }
        }
        flags
    }
}

/// A discrete labeled value of an enumeration control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalePoint {
    pub value: f64,
    pub label: String,
}

/// Display unit of a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub symbol: String,
    pub label: String,
}

/// One controllable parameter of a plugin.
///
/// The current value is the only mutable part; writes clamp to range,
/// quantize to `range_steps` when discrete, and round when integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPort {
    pub symbol: String,
    pub name: String,
    pub short_name: String,
    pub index: i64,
    pub minimum: f64,
    pub maximum: f64,
    pub default: f64,
    pub flags: ControlFlags,
    pub scale_points: Vec<ScalePoint>,
    pub unit: Option<Unit>,
    /// 0 means continuous.
    pub range_steps: u32,
    value: Option<f64>,
}

impl ControlPort {
    /// Current value, or the default when never set.
    pub fn value(&self) -> f64 {
        self.value.unwrap_or(self.default)
    }

    /// Write a value, clamped and quantized.
    pub fn set_value(&mut self, value: f64) {
        self.value = Some(self.clamp(value));
    }

    pub fn is_toggled(&self) -> bool {
        self.flags.contains(ControlFlags::TOGGLED)
    }

    pub fn is_integer(&self) -> bool {
        self.flags.contains(ControlFlags::INTEGER)
    }

    pub fn is_logarithmic(&self) -> bool {
        self.flags.contains(ControlFlags::LOGARITHMIC)
    }

    pub fn is_enumeration(&self) -> bool {
        self.flags.contains(ControlFlags::ENUMERATION)
    }

    pub fn is_trigger(&self) -> bool {
        self.flags.contains(ControlFlags::TRIGGER)
    }

    /// Clamp to range, then quantize to discrete steps, then round when
    /// integer.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut clamped = value.clamp(self.minimum, self.maximum);

        if self.range_steps > 1 {
            let step = (self.maximum - self.minimum) / f64::from(self.range_steps - 1);
            let steps = ((clamped - self.minimum) / step).round();
            clamped = self.minimum + steps * step;
        }

        if self.is_integer() {
            clamped = clamped.round();
        }

        clamped
    }

    /// Map the current (or a given) value into the 0-1 slider domain.
    /// Logarithmic controls with a positive minimum use log scaling.
    pub fn normalize(&self, value: Option<f64>) -> f64 {
        let v = value.unwrap_or_else(|| self.value());
        if self.maximum == self.minimum {
            return 0.0;
        }

        if self.is_logarithmic() && self.minimum > 0.0 {
            return (v / self.minimum).ln() / (self.maximum / self.minimum).ln();
        }

        (v - self.minimum) / (self.maximum - self.minimum)
    }

    /// Map a 0-1 slider value back into the raw range, exponentially for
    /// logarithmic controls: `v = min * (max/min)^t`.
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let t = normalized.clamp(0.0, 1.0);

        let value = if self.is_logarithmic() && self.minimum > 0.0 {
            self.minimum * (self.maximum / self.minimum).powf(t)
        } else {
            self.minimum + t * (self.maximum - self.minimum)
        };

        self.clamp(value)
    }

    /// Label of the scale point matching a value, if any.
    pub fn scale_point_label(&self, value: f64) -> Option<&str> {
        self.scale_points
            .iter()
            .find(|sp| sp.value == value)
            .map(|sp| sp.label.as_str())
    }

    /// Human-readable rendering of the current value.
    pub fn format_value(&self) -> String {
        let v = self.value();

        if self.is_enumeration() {
            if let Some(label) = self.scale_point_label(v) {
                return label.to_string();
            }
        }

        if self.is_toggled() {
            return if v >= 0.5 { "On" } else { "Off" }.to_string();
        }

        let number = if self.is_integer() {
            format!("{}", v as i64)
        } else {
            let mut s = format!("{v:.2}");
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
            s
        };

        match &self.unit {
            Some(unit) => format!("{} {}", number, unit.symbol),
            None => number,
        }
    }

    /// Parse one control from the host's effect metadata.
    pub fn from_json(data: &Value) -> Option<ControlPort> {
        let symbol = data.get("symbol")?.as_str()?.to_string();
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&symbol)
            .to_string();
        let short_name = data
            .get("shortName")
            .and_then(Value::as_str)
            .unwrap_or(&name)
            .to_string();

        let ranges = data.get("ranges").cloned().unwrap_or(Value::Null);
        let range = |key: &str| ranges.get(key).and_then(Value::as_f64);

        let properties = data
            .get("properties")
            .and_then(Value::as_array)
            .map(|list| {
                ControlFlags::from_names(list.iter().filter_map(Value::as_str))
            })
            .unwrap_or_default();

        let scale_points = data
            .get("scalePoints")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|sp| {
                        Some(ScalePoint {
                            value: sp.get("value")?.as_f64()?,
                            label: sp.get("label")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let unit = data.get("units").and_then(|u| {
            let symbol = u.get("symbol")?.as_str()?;
            if symbol.is_empty() {
                return None;
            }
            Some(Unit {
                symbol: symbol.to_string(),
                label: u
                    .get("label")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            })
        });

        Some(ControlPort {
            symbol,
            name,
            short_name,
            index: data.get("index").and_then(Value::as_i64).unwrap_or(0),
            minimum: range("minimum").unwrap_or(0.0),
            maximum: range("maximum").unwrap_or(1.0),
            default: range("default").unwrap_or(0.0),
            flags: properties,
            scale_points,
            unit,
            range_steps: data
                .get("rangeSteps")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            value: None,
        })
    }
}

/// A loaded effect instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub uri: String,
    pub label: String,
    pub name: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub bypassed: bool,
    pub join_audio_inputs: bool,
    pub join_audio_outputs: bool,
    controls: BTreeMap<String, ControlPort>,
}

impl Plugin {
    /// Build a plugin from effect metadata, filtering ports disabled in
    /// the plugin's config entry.
    pub fn from_effect_data(
        label: &str,
        uri: &str,
        data: &Value,
        config: &PluginConfig,
    ) -> Plugin {
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(label)
            .to_string();

        let audio = data
            .get("ports")
            .and_then(|p| p.get("audio"))
            .cloned()
            .unwrap_or(Value::Null);

        let collect = |direction: &str| -> Vec<Port> {
            audio
                .get(direction)
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|p| {
                            let symbol = p.get("symbol")?.as_str()?;
                            if config.disable_ports.iter().any(|d| d == symbol) {
                                return None;
                            }
                            Some(Port {
                                symbol: symbol.to_string(),
                                name: p
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or(symbol)
                                    .to_string(),
                                graph_path: format!("{label}/{symbol}"),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let controls = data
            .get("ports")
            .and_then(|p| p.get("control"))
            .and_then(|c| c.get("input"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(ControlPort::from_json)
                    .map(|c| (c.symbol.clone(), c))
                    .collect()
            })
            .unwrap_or_default();

        Plugin {
            uri: uri.to_string(),
            label: label.to_string(),
            name,
            inputs: collect("input"),
            outputs: collect("output"),
            bypassed: false,
            join_audio_inputs: config.join_audio_inputs,
            join_audio_outputs: config.join_audio_outputs,
            controls,
        }
    }

    pub fn control(&self, symbol: &str) -> Option<&ControlPort> {
        self.controls.get(symbol)
    }

    pub fn controls(&self) -> impl Iterator<Item = &ControlPort> {
        self.controls.values()
    }

    /// Cache a value that changed on the host. Returns `false` for an
    /// unknown symbol.
    pub fn set_cached_value(&mut self, symbol: &str, value: f64) -> bool {
        match self.controls.get_mut(symbol) {
            Some(control) => {
                control.set_value(value);
                true
            }
            None => false,
        }
    }
}
