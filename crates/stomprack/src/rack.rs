//! The rack: a local mirror of the host's effect graph.
//!
//! The host is the sole source of truth. Request methods ask the host to
//! change something and mutate nothing locally; the mirror only changes
//! when the corresponding event comes back on the feed. Chain order is
//! derived from canvas positions, and every confirmed structural change
//! schedules a debounced reorder pass that rewires and renormalizes the
//! chain.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use stompconf::Config;
use stompproto::{Event, EventKind};

use crate::bus::Subscription;
use crate::client::SocketClient;
use crate::error::RackError;
use crate::layout::{self, SlotPos};
use crate::plugin::Plugin;
use crate::rest::{EffectApi, RestClient};
use crate::routing;
use crate::slot::{ChainNode, HardwareSlot, PluginSlot, PortDirection};

/// Whether this rack instance is allowed to rewire the host.
///
/// An `Observer` mirrors state and derives order but never issues
/// structural REST calls, so several clients can watch one host while a
/// single `Manager` owns the routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RackMode {
    Observer,
    Manager,
}

/// Rack construction options.
#[derive(Debug, Clone)]
pub struct RackOptions {
    pub mode: RackMode,
    /// Quiet period before a scheduled reorder pass runs.
    pub debounce: Duration,
}

impl Default for RackOptions {
    fn default() -> Self {
        Self {
            mode: RackMode::Manager,
            debounce: Duration::from_millis(100),
        }
    }
}

/// Everything guarded by the rack lock. Holding the lock across a whole
/// read-diff-request sequence is what keeps two reorders from
/// interleaving.
struct RackState {
    slots: Vec<PluginSlot>,
    input_slot: HardwareSlot,
    output_slot: HardwareSlot,
    /// Connections the host has confirmed. Written only by `Connected`
    /// and `Disconnected` events.
    connections: HashSet<(String, String)>,
    /// True from startup or `LoadingStart` until `LoadingEnd`.
    loading: bool,
    /// True while we are pushing normalization positions, so their echoes
    /// are not mistaken for user moves.
    normalizing: bool,
}

impl RackState {
    fn slot_positions(&self) -> Vec<SlotPos> {
        self.slots
            .iter()
            .map(|s| SlotPos::new(s.label(), s.x, s.y))
            .collect()
    }

    fn slot_index(&self, label: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.label() == label)
    }
}

// Ping is answered inside the feed client; everything else flows here.
const RACK_KINDS: &[EventKind] = &[
    EventKind::Stats,
    EventKind::SysStats,
    EventKind::LoadingStart,
    EventKind::LoadingEnd,
    EventKind::RemoveAll,
    EventKind::ResetConnections,
    EventKind::HardwarePortAdded,
    EventKind::PluginAdded,
    EventKind::PluginRemoved,
    EventKind::PluginPositionChanged,
    EventKind::ParamChanged,
    EventKind::BypassChanged,
    EventKind::Connected,
    EventKind::Disconnected,
    EventKind::Unknown,
];

/// The orchestrator.
pub struct Rack {
    config: Config,
    api: Arc<dyn EffectApi>,
    client: SocketClient,
    state: Arc<Mutex<RackState>>,
    mode: RackMode,
    debounce: Duration,
    // Cancelling the current token aborts any pending debounce timer.
    reorder_token: StdMutex<CancellationToken>,
    // Sticky across a debounce burst: one forced schedule forces the pass.
    reorder_force: std::sync::atomic::AtomicBool,
    order_tx: broadcast::Sender<Vec<String>>,
    subscriptions: StdMutex<Vec<Subscription>>,
}

impl Rack {
    /// Build a rack talking to the host named in `config`.
    pub fn new(config: Config, options: RackOptions) -> Result<Arc<Self>, RackError> {
        let timeout = Duration::from_secs(config.server.request_timeout_secs);
        let rest = RestClient::new(&config.server.url, timeout)?;
        Ok(Self::with_api(config, Arc::new(rest), options))
    }

    /// Build a rack with an arbitrary host API, the test seam.
    pub fn with_api(config: Config, api: Arc<dyn EffectApi>, options: RackOptions) -> Arc<Self> {
        let client = SocketClient::new(config.server.feed_addr());
        let state = RackState {
            slots: Vec::new(),
            input_slot: HardwareSlot::new(PortDirection::Input, config.hardware.join_audio_inputs),
            output_slot: HardwareSlot::new(
                PortDirection::Output,
                config.hardware.join_audio_outputs,
            ),
            connections: HashSet::new(),
            loading: true,
            normalizing: false,
        };
        let (order_tx, _) = broadcast::channel(16);

        let rack = Arc::new(Rack {
            config,
            api,
            client,
            state: Arc::new(Mutex::new(state)),
            mode: options.mode,
            debounce: options.debounce,
            reorder_token: StdMutex::new(CancellationToken::new()),
            reorder_force: std::sync::atomic::AtomicBool::new(false),
            order_tx,
            subscriptions: StdMutex::new(Vec::new()),
        });

        // Bus callbacks run on the transport task and must not block, so
        // they only forward into a channel the rack task drains.
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        {
            let bus = rack.client.bus();
            let mut subs = rack.subscriptions.lock().expect("subscription lock");
            for &kind in RACK_KINDS {
                let tx = tx.clone();
                subs.push(bus.on(
                    kind,
                    Arc::new(move |event: &Event| {
                        let _ = tx.send(event.clone());
                    }),
                ));
            }
        }

        let worker = Arc::clone(&rack);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                worker.apply_event(event).await;
            }
            tracing::debug!("rack event task finished");
        });

        rack
    }

    /// Open the feed connection. The host streams its full state after
    /// connect, so the mirror fills itself in.
    pub fn connect(&self) {
        self.client.connect();
    }

    /// Close the feed and stop processing events.
    pub fn disconnect(&self) {
        self.client.disconnect();
        let bus = self.client.bus();
        for sub in self.subscriptions.lock().expect("subscription lock").drain(..) {
            bus.off(&sub);
        }
    }

    pub fn connected(&self) -> bool {
        self.client.connected()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chain-order changes, sent after every reorder pass that rewired.
    pub fn subscribe_order_changes(&self) -> broadcast::Receiver<Vec<String>> {
        self.order_tx.subscribe()
    }

    /// Labels in current chain order.
    pub async fn labels(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .slots
            .iter()
            .map(|s| s.label().to_string())
            .collect()
    }

    /// Snapshot of the confirmed connections.
    pub async fn connections(&self) -> HashSet<(String, String)> {
        self.state.lock().await.connections.clone()
    }

    /// Snapshot of one slot by label.
    pub async fn slot(&self, label: &str) -> Option<PluginSlot> {
        let state = self.state.lock().await;
        state.slot_index(label).map(|i| state.slots[i].clone())
    }

    /// Apply one confirmed event to the mirror.
    pub async fn apply_event(self: &Arc<Self>, event: Event) {
        match event {
            Event::LoadingStart => {
                let mut state = self.state.lock().await;
                state.slots.clear();
                state.input_slot.clear();
                state.output_slot.clear();
                state.connections.clear();
                state.loading = true;
                state.normalizing = false;
                tracing::info!("host graph reloading, mirror cleared");
            }
            Event::LoadingEnd => {
                self.state.lock().await.loading = false;
                tracing::info!("host graph loaded");
                self.schedule_reorder(true);
            }
            Event::HardwarePortAdded { name, is_output } => {
                if self.config.hardware.disable_ports.iter().any(|p| *p == name) {
                    tracing::debug!(port = %name, "hardware port disabled by config");
                    return;
                }
                let mut state = self.state.lock().await;
                // The wire flag marks the playback side. Capture ports
                // arrive with 0 and feed the head of the chain.
                let added = if is_output {
                    state.output_slot.add_port(&name)
                } else {
                    state.input_slot.add_port(&name)
                };
                let loading = state.loading;
                drop(state);
                if added && !loading {
                    self.schedule_reorder(true);
                }
            }
            Event::PluginAdded { label, uri, x, y } => {
                self.on_plugin_added(label, uri, x, y).await;
            }
            Event::PluginRemoved { label } => {
                let mut state = self.state.lock().await;
                let before = state.slots.len();
                state.slots.retain(|s| s.label() != label);
                let removed = state.slots.len() != before;
                let loading = state.loading;
                drop(state);
                if removed {
                    tracing::info!(label = %label, "plugin removed");
                    if !loading {
                        self.schedule_reorder(true);
                    }
                } else {
                    tracing::debug!(label = %label, "removal of unmanaged plugin");
                }
            }
            Event::RemoveAll => {
                let mut state = self.state.lock().await;
                state.slots.clear();
                let loading = state.loading;
                drop(state);
                tracing::info!("host removed all plugins");
                if !loading {
                    self.schedule_reorder(true);
                }
            }
            Event::ResetConnections => {
                self.state.lock().await.connections.clear();
                self.schedule_reorder(true);
            }
            Event::Connected { src_path, dst_path } => {
                self.state
                    .lock()
                    .await
                    .connections
                    .insert((src_path, dst_path));
            }
            Event::Disconnected { src_path, dst_path } => {
                self.state
                    .lock()
                    .await
                    .connections
                    .remove(&(src_path, dst_path));
            }
            Event::ParamChanged {
                label,
                symbol,
                value,
            } => {
                let mut state = self.state.lock().await;
                match state.slot_index(&label) {
                    Some(i) => {
                        if !state.slots[i].plugin.set_cached_value(&symbol, value) {
                            tracing::warn!(label = %label, symbol = %symbol, "unknown control");
                        }
                    }
                    None => tracing::debug!(label = %label, "param for unmanaged plugin"),
                }
            }
            Event::BypassChanged { label, bypassed } => {
                let mut state = self.state.lock().await;
                if let Some(i) = state.slot_index(&label) {
                    state.slots[i].plugin.bypassed = bypassed;
                }
            }
            Event::PluginPositionChanged { label, x, y } => {
                let mut state = self.state.lock().await;
                if state.normalizing {
                    return;
                }
                let Some(i) = state.slot_index(&label) else {
                    return;
                };
                if !state.slots[i].pos_differs(x, y) {
                    return;
                }
                state.slots[i].x = x;
                state.slots[i].y = y;
                let loading = state.loading;
                drop(state);
                if !loading {
                    self.schedule_reorder(false);
                }
            }
            Event::Stats { cpu_load, xruns } => {
                tracing::trace!(cpu_load, xruns, "host stats");
            }
            Event::SysStats {
                mem_load,
                cpu_freq,
                cpu_temp,
            } => {
                tracing::trace!(mem_load, cpu_freq, cpu_temp, "host sys stats");
            }
            Event::Unknown { msg_type, raw } => {
                tracing::debug!(verb = %msg_type, line = %raw, "unrecognized feed message");
            }
            Event::Ping => {}
        }
    }

    async fn on_plugin_added(self: &Arc<Self>, label: String, uri: String, x: f64, y: f64) {
        {
            let mut state = self.state.lock().await;
            if let Some(i) = state.slot_index(&label) {
                // Already mirrored; treat as a position update.
                state.slots[i].x = x;
                state.slots[i].y = y;
                let loading = state.loading;
                drop(state);
                if !loading {
                    self.schedule_reorder(false);
                }
                return;
            }
        }

        let Some(plugin_config) = self.config.plugin_by_uri(&uri).cloned() else {
            tracing::debug!(label = %label, uri = %uri, "ignoring unmanaged plugin");
            return;
        };

        // Metadata fetch happens outside the lock; events keep flowing.
        let Some(data) = self.api.effect_get(&uri).await else {
            tracing::warn!(label = %label, uri = %uri, "no metadata, plugin not mirrored");
            return;
        };

        let plugin = Plugin::from_effect_data(&label, &uri, &data, &plugin_config);

        let mut state = self.state.lock().await;
        if state.slot_index(&label).is_some() {
            return;
        }
        state.slots.push(PluginSlot::new(plugin, x, y));
        let loading = state.loading;
        drop(state);

        tracing::info!(label = %label, uri = %uri, "plugin mirrored");
        if !loading {
            self.schedule_reorder(true);
        }
    }

    /// Schedule a reorder pass after the debounce window. A new call
    /// within the window restarts the timer; bursts collapse into one
    /// pass, forced if any call in the burst was forced.
    fn schedule_reorder(self: &Arc<Self>, force: bool) {
        use std::sync::atomic::Ordering;

        self.reorder_force.fetch_or(force, Ordering::SeqCst);
        let token = {
            let mut current = self.reorder_token.lock().expect("reorder token lock");
            current.cancel();
            *current = CancellationToken::new();
            current.clone()
        };

        let rack = Arc::clone(self);
        let delay = self.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let force = rack.reorder_force.swap(false, Ordering::SeqCst);
                    rack.reorder_pass(force).await;
                }
            }
        });
    }

    /// Derive chain order from positions, rewire if it changed (or if
    /// forced), then normalize the grid. One lock across the whole pass.
    async fn reorder_pass(&self, force: bool) {
        let mut state = self.state.lock().await;
        if state.loading {
            return;
        }

        let old_order: Vec<String> = state.slots.iter().map(|s| s.label().to_string()).collect();
        let new_order = layout::sort_slots(&state.slot_positions());

        if new_order != old_order {
            let mut reordered = Vec::with_capacity(state.slots.len());
            for label in &new_order {
                if let Some(i) = state.slot_index(label) {
                    reordered.push(state.slots.remove(i));
                }
            }
            state.slots = reordered;
        }

        if new_order != old_order || force {
            tracing::debug!(order = ?new_order, "chain order");
            self.reconnect_seamless_locked(&mut state).await;
            let _ = self.order_tx.send(new_order);
            self.normalize_locked(&mut state).await;
        }
    }

    /// Diff desired connections against the confirmed cache and issue
    /// only the missing connects, then the stale disconnects. Connecting
    /// first keeps audio flowing through the change.
    async fn reconnect_seamless_locked(&self, state: &mut RackState) {
        if state.loading || self.mode == RackMode::Observer {
            return;
        }

        let desired_list =
            routing::chain_connection_list(&state.slots, &state.input_slot, &state.output_slot);
        let desired: HashSet<(String, String)> = desired_list.iter().cloned().collect();

        for (src, dst) in &desired_list {
            if !state.connections.contains(&(src.clone(), dst.clone())) {
                tracing::debug!(src = %src, dst = %dst, "connect");
                self.api.connect_ports(src, dst).await;
            }
        }

        let stale: Vec<(String, String)> = state
            .connections
            .iter()
            .filter(|pair| !desired.contains(*pair))
            .cloned()
            .collect();
        for (src, dst) in stale {
            tracing::debug!(src = %src, dst = %dst, "disconnect");
            self.api.disconnect_ports(&src, &dst).await;
        }
    }

    /// Rewire the chain without tearing down what already matches.
    pub async fn reconnect_seamless(&self) {
        let mut state = self.state.lock().await;
        self.reconnect_seamless_locked(&mut state).await;
    }

    /// Tear down every confirmed connection and rebuild the full chain.
    /// The blunt instrument; `reconnect_seamless` is the usual path.
    pub async fn reconnect(&self) {
        let mut state = self.state.lock().await;
        if state.loading || self.mode == RackMode::Observer {
            return;
        }

        let cached: Vec<(String, String)> = state.connections.iter().cloned().collect();
        for (src, dst) in cached {
            self.api.disconnect_ports(&src, &dst).await;
        }
        for (src, dst) in
            routing::chain_connection_list(&state.slots, &state.input_slot, &state.output_slot)
        {
            self.api.connect_ports(&src, &dst).await;
        }
    }

    /// Snap every slot onto the grid. Idempotent: a normalized layout
    /// produces no moves, so the resulting position echoes settle.
    async fn normalize_locked(&self, state: &mut RackState) {
        if state.loading || self.mode == RackMode::Observer {
            return;
        }

        let moves = layout::normalize(&state.slot_positions());
        if moves.is_empty() {
            return;
        }

        state.normalizing = true;
        for (label, (x, y)) in moves {
            if let Some(i) = state.slot_index(&label) {
                state.slots[i].x = x;
                state.slots[i].y = y;
            }
            self.api.set_position(&label, x, y).await;
        }
        state.normalizing = false;
    }

    /// Ask the host to load a whitelisted plugin (by name or URI) at a
    /// canvas position. Returns the generated label; the mirror changes
    /// only when the host's `add` event comes back.
    pub async fn request_add_plugin(&self, plugin: &str, x: f64, y: f64) -> Option<String> {
        if self.mode == RackMode::Observer {
            return None;
        }
        let Some(plugin_config) = self
            .config
            .plugin_by_uri(plugin)
            .or_else(|| self.config.plugin_by_name(plugin))
            .cloned()
        else {
            tracing::warn!(plugin = %plugin, "plugin not whitelisted");
            return None;
        };

        if self.state.lock().await.loading {
            return None;
        }

        let label = generate_label(&plugin_config.uri);

        let response = self.api.effect_add(&label, &plugin_config.uri, x, y).await?;
        let valid = response
            .get("valid")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !valid {
            tracing::warn!(label = %label, "host rejected plugin add");
            return None;
        }

        tracing::info!(label = %label, uri = %plugin_config.uri, "plugin add requested");
        Some(label)
    }

    /// Ask the host to load a whitelisted plugin at a chain index,
    /// converting the index to canvas coordinates first.
    pub async fn request_add_plugin_at(&self, plugin: &str, index: usize) -> Option<String> {
        let (x, y) = {
            let state = self.state.lock().await;
            layout::insertion_coords(&state.slot_positions(), index)
        };
        self.request_add_plugin(plugin, x, y).await
    }

    /// Ask the host to remove a plugin. Its chain neighbors are connected
    /// to each other first, so audio keeps flowing while the removal and
    /// the follow-up reorder land.
    pub async fn request_remove_plugin(&self, label: &str) -> bool {
        if self.mode == RackMode::Observer {
            return false;
        }

        let state = self.state.lock().await;
        let Some(index) = state.slot_index(label) else {
            tracing::warn!(label = %label, "cannot remove unknown plugin");
            return false;
        };

        let src: &dyn ChainNode = state.slots[..index]
            .last()
            .map(|s| s as &dyn ChainNode)
            .unwrap_or(&state.input_slot);
        let dst: &dyn ChainNode = state.slots[index + 1..]
            .first()
            .map(|s| s as &dyn ChainNode)
            .unwrap_or(&state.output_slot);

        for (out, inp) in routing::connection_pairs(src, dst) {
            if !state.connections.contains(&(out.clone(), inp.clone())) {
                self.api.connect_ports(&out, &inp).await;
            }
        }

        self.api.effect_remove(label).await
    }

    /// Move the slot at chain index `from` to index `to` by reassigning
    /// grid positions, then force a reorder pass.
    pub async fn move_slot(self: &Arc<Self>, from: usize, to: usize) -> bool {
        if self.mode == RackMode::Observer {
            return false;
        }

        {
            let mut state = self.state.lock().await;
            if state.loading || from >= state.slots.len() {
                return false;
            }
            if from == to {
                return true;
            }

            let positions = layout::move_coords(&state.slot_positions(), from, to);
            state.normalizing = true;
            for (label, (x, y)) in positions {
                let Some(i) = state.slot_index(&label) else {
                    continue;
                };
                if state.slots[i].pos_differs(x, y) {
                    state.slots[i].x = x;
                    state.slots[i].y = y;
                    self.api.set_position(&label, x, y).await;
                }
            }
            state.normalizing = false;
        }

        self.schedule_reorder(true);
        true
    }

    /// Ask the host to drop everything: all connections, all plugins.
    pub async fn clear(&self) -> bool {
        if self.mode == RackMode::Observer {
            return false;
        }

        let state = self.state.lock().await;
        let cached: Vec<(String, String)> = state.connections.iter().cloned().collect();
        let labels: Vec<String> = state.slots.iter().map(|s| s.label().to_string()).collect();
        drop(state);

        for (src, dst) in cached {
            self.api.disconnect_ports(&src, &dst).await;
        }
        for label in labels {
            self.api.effect_remove(&label).await;
        }
        self.api.reset().await
    }

    /// Push a parameter change over the feed. The cached value updates
    /// when the host echoes it back.
    pub async fn request_param_set(&self, label: &str, symbol: &str, value: f64) -> bool {
        let value = {
            let state = self.state.lock().await;
            let Some(i) = state.slot_index(label) else {
                return false;
            };
            match state.slots[i].plugin.control(symbol) {
                Some(control) => control.clamp(value),
                None => return false,
            }
        };
        self.client.param_set(label, symbol, value)
    }

    /// Push a bypass toggle over the feed.
    pub fn request_bypass(&self, label: &str, bypassed: bool) -> bool {
        self.client.bypass(label, bypassed)
    }
}

/// `<uri basename>_<8 hex chars>`, unique enough per session and short
/// enough for the feed's whitespace grammar.
fn generate_label(uri: &str) -> String {
    let basename = uri
        .rsplit(['/', '#'])
        .next()
        .unwrap_or(uri)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", basename, &suffix[..8])
}
