//! Chain slots: plugin instances and the hardware end caps.
//!
//! Routing only cares about a slot's audio path lists and join flags, so
//! both kinds sit behind [`ChainNode`].

use crate::plugin::Plugin;

/// Signal direction of a hardware slot, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Anything that can occupy a position in the linear chain.
pub trait ChainNode {
    /// Graph paths audio flows into.
    fn audio_inputs(&self) -> Vec<String>;
    /// Graph paths audio flows out of.
    fn audio_outputs(&self) -> Vec<String>;
    /// Fan every upstream output into every input.
    fn join_inputs(&self) -> bool;
    /// Fan every output into every downstream input.
    fn join_outputs(&self) -> bool;
}

/// A loaded plugin with its canvas position.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSlot {
    pub plugin: Plugin,
    pub x: f64,
    pub y: f64,
}

impl PluginSlot {
    pub fn new(plugin: Plugin, x: f64, y: f64) -> Self {
        PluginSlot { plugin, x, y }
    }

    pub fn label(&self) -> &str {
        &self.plugin.label
    }

    /// True when a reported position is a real move, not an echo of where
    /// the slot already is. Sub-unit jitter is ignored.
    pub fn pos_differs(&self, x: f64, y: f64) -> bool {
        (self.x - x).abs() >= 1.0 || (self.y - y).abs() >= 1.0
    }
}

impl ChainNode for PluginSlot {
    fn audio_inputs(&self) -> Vec<String> {
        self.plugin
            .inputs
            .iter()
            .map(|p| p.graph_path.clone())
            .collect()
    }

    fn audio_outputs(&self) -> Vec<String> {
        self.plugin
            .outputs
            .iter()
            .map(|p| p.graph_path.clone())
            .collect()
    }

    fn join_inputs(&self) -> bool {
        self.plugin.join_audio_inputs
    }

    fn join_outputs(&self) -> bool {
        self.plugin.join_audio_outputs
    }
}

/// A hardware end of the chain.
///
/// Direction is from the host's point of view, so the ports of an
/// `Input` slot (capture) are graph *outputs*, and the ports of an
/// `Output` slot (playback) are graph *inputs*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareSlot {
    ports: Vec<String>,
    direction: PortDirection,
    join: bool,
}

impl HardwareSlot {
    pub fn new(direction: PortDirection, join: bool) -> Self {
        HardwareSlot {
            ports: Vec::new(),
            direction,
            join,
        }
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn label(&self) -> &'static str {
        match self.direction {
            PortDirection::Input => "hw_in",
            PortDirection::Output => "hw_out",
        }
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn has_port(&self, name: &str) -> bool {
        self.ports.iter().any(|p| p == name)
    }

    /// Register a port announced by the host. Duplicates are ignored.
    pub fn add_port(&mut self, name: &str) -> bool {
        if self.has_port(name) {
            return false;
        }
        self.ports.push(name.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.ports.clear();
    }
}

impl ChainNode for HardwareSlot {
    fn audio_inputs(&self) -> Vec<String> {
        match self.direction {
            PortDirection::Input => Vec::new(),
            PortDirection::Output => self.ports.clone(),
        }
    }

    fn audio_outputs(&self) -> Vec<String> {
        match self.direction {
            PortDirection::Input => self.ports.clone(),
            PortDirection::Output => Vec::new(),
        }
    }

    // Hardware fan-out and fan-in both hang off the single join flag,
    // but only the side that has ports ever matters.
    fn join_inputs(&self) -> bool {
        self.join
    }

    fn join_outputs(&self) -> bool {
        self.join
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_ports_are_graph_outputs() {
        let mut capture = HardwareSlot::new(PortDirection::Input, false);
        assert!(capture.add_port("capture_1"));
        assert!(capture.add_port("capture_2"));
        assert!(!capture.add_port("capture_1"));

        assert_eq!(capture.audio_outputs(), vec!["capture_1", "capture_2"]);
        assert!(capture.audio_inputs().is_empty());
        assert_eq!(capture.label(), "hw_in");
    }

    #[test]
    fn playback_ports_are_graph_inputs() {
        let mut playback = HardwareSlot::new(PortDirection::Output, true);
        playback.add_port("playback_1");

        assert_eq!(playback.audio_inputs(), vec!["playback_1"]);
        assert!(playback.audio_outputs().is_empty());
        assert!(playback.join_inputs());
    }

    #[test]
    fn position_echo_is_not_a_move() {
        let plugin = Plugin::from_effect_data(
            "dist_1",
            "urn:example:dist",
            &serde_json::json!({}),
            &stompconf::PluginConfig {
                name: "Example".into(),
                uri: "urn:example:dist".into(),
                category: String::new(),
                disable_ports: Vec::new(),
                join_audio_inputs: false,
                join_audio_outputs: false,
            },
        );
        let slot = PluginSlot::new(plugin, 200.0, 200.0);

        assert!(!slot.pos_differs(200.0, 200.0));
        assert!(!slot.pos_differs(200.6, 199.5));
        assert!(slot.pos_differs(1200.0, 200.0));
    }
}
