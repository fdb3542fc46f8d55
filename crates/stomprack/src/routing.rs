//! Port pairing for the linear chain.
//!
//! Pure functions from slot shapes to (source, destination) graph-path
//! pairs. The rack diffs the result against its confirmed-connection
//! cache; nothing here talks to the host.

use std::collections::HashSet;

use crate::slot::{ChainNode, HardwareSlot, PluginSlot};

/// Pairs needed to wire `src` into `dst`.
///
/// If either side requests joining, every output goes to every input.
/// Otherwise ports pair positionally, `out[i]` to `in[min(i, last)]`,
/// walking the longer side: a mono output feeds every surplus input, and
/// surplus outputs all collapse into the last input (stereo into mono
/// keeps both channels).
pub fn connection_pairs(src: &dyn ChainNode, dst: &dyn ChainNode) -> Vec<(String, String)> {
    let outputs = src.audio_outputs();
    let inputs = dst.audio_inputs();
    if outputs.is_empty() || inputs.is_empty() {
        return Vec::new();
    }

    if src.join_outputs() || dst.join_inputs() {
        let mut pairs = Vec::with_capacity(outputs.len() * inputs.len());
        for out in &outputs {
            for inp in &inputs {
                pairs.push((out.clone(), inp.clone()));
            }
        }
        return pairs;
    }

    (0..outputs.len().max(inputs.len()))
        .map(|i| {
            (
                outputs[i.min(outputs.len() - 1)].clone(),
                inputs[i.min(inputs.len() - 1)].clone(),
            )
        })
        .collect()
}

/// Full connection list for `capture -> slots... -> playback`, in chain
/// order.
pub fn chain_connection_list(
    slots: &[PluginSlot],
    capture: &HardwareSlot,
    playback: &HardwareSlot,
) -> Vec<(String, String)> {
    let mut nodes: Vec<&dyn ChainNode> = Vec::with_capacity(slots.len() + 2);
    nodes.push(capture);
    for slot in slots {
        nodes.push(slot);
    }
    nodes.push(playback);

    let mut pairs = Vec::new();
    for pair in nodes.windows(2) {
        pairs.extend(connection_pairs(pair[0], pair[1]));
    }
    pairs
}

/// Same list as a set, for diffing against the connection cache.
pub fn desired_chain_connections(
    slots: &[PluginSlot],
    capture: &HardwareSlot,
    playback: &HardwareSlot,
) -> HashSet<(String, String)> {
    chain_connection_list(slots, capture, playback)
        .into_iter()
        .collect()
}
