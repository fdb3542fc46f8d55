//! Configuration loading for stomprack.
//!
//! Configuration is a single TOML file describing the pedalboard host to
//! talk to, the hardware ports to route through, and the whitelist of
//! effect plugins the rack will manage. Anything the host adds that is not
//! whitelisted is observed but never loaded locally.
//!
//! # Config File Locations
//!
//! The first existing file wins:
//! 1. a path given on the command line
//! 2. `./stomprack.toml` (local override)
//! 3. `~/.config/stomprack/config.toml` (user)
//! 4. `/etc/stomprack/config.toml` (system)
//!
//! A missing file is not an error - defaults talk to a host on localhost.
//! `STOMPRACK_SERVER` overrides the server URL after the file is applied.
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! url = "http://127.0.0.1:18181"
//! feed_port = 18181
//!
//! [hardware]
//! join_audio_inputs = true
//! disable_ports = ["capture_3", "capture_4"]
//!
//! [[plugins]]
//! name = "DS1"
//! uri = "http://example.org/plugins/ds1"
//! category = "distortion"
//! ```

mod loader;

pub use loader::{discover_config_file, load_file};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the server URL.
pub const SERVER_ENV_VAR: &str = "STOMPRACK_SERVER";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Where and how to reach the pedalboard host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the host's REST API.
    pub url: String,
    /// Port of the line-oriented event feed on the same host.
    pub feed_port: u16,
    /// REST request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:18181".to_string(),
            feed_port: 18181,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Address of the event feed, derived from the REST URL's host.
    pub fn feed_addr(&self) -> String {
        let host = self
            .url
            .trim_start_matches("http://")
            .trim_start_matches("https://");
        let host = host.split('/').next().unwrap_or(host);
        let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
        let host = if host.is_empty() { "127.0.0.1" } else { host };
        format!("{}:{}", host, self.feed_port)
    }
}

/// Hardware I/O routing behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Fan every capture port into every first-slot input.
    pub join_audio_inputs: bool,
    /// Fan every last-slot output into every playback port.
    pub join_audio_outputs: bool,
    /// Hardware ports to keep out of the chain entirely.
    pub disable_ports: Vec<String>,
}

/// One whitelisted effect plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub category: String,
    /// Audio ports of this plugin to exclude from routing.
    #[serde(default)]
    pub disable_ports: Vec<String>,
    /// Fan-out flags for this plugin's slot.
    #[serde(default)]
    pub join_audio_inputs: bool,
    #[serde(default)]
    pub join_audio_outputs: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub hardware: HardwareConfig,
    pub plugins: Vec<PluginConfig>,
}

impl Config {
    /// Load config from a discovered file, or defaults when none exists,
    /// then apply environment overrides.
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match discover_config_file(cli_path) {
            Some(path) => load_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_ENV_VAR) {
            if !url.is_empty() {
                self.server.url = url;
            }
        }
    }

    /// Look up a whitelisted plugin by URI.
    pub fn plugin_by_uri(&self, uri: &str) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.uri == uri)
    }

    /// Look up a whitelisted plugin by name, case-insensitively.
    pub fn plugin_by_name(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// All plugins in a category, case-insensitively.
    pub fn plugins_by_category(&self, category: &str) -> Vec<&PluginConfig> {
        self.plugins
            .iter()
            .filter(|p| p.category.eq_ignore_ascii_case(category))
            .collect()
    }

    /// Sorted, de-duplicated list of categories.
    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self
            .plugins
            .iter()
            .filter(|p| !p.category.is_empty())
            .map(|p| p.category.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        toml::from_str(
            r#"
            [server]
            url = "http://pedal.local:18181"

            [hardware]
            join_audio_inputs = true
            disable_ports = ["capture_3"]

            [[plugins]]
            name = "DS1"
            uri = "http://example.org/ds1"
            category = "distortion"

            [[plugins]]
            name = "Shiroverb"
            uri = "http://example.org/shiroverb"
            category = "reverb"
            disable_ports = ["sidechain"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_sections_and_defaults() {
        let config = sample();
        assert_eq!(config.server.url, "http://pedal.local:18181");
        assert_eq!(config.server.feed_port, 18181);
        assert_eq!(config.server.request_timeout_secs, 10);
        assert!(config.hardware.join_audio_inputs);
        assert!(!config.hardware.join_audio_outputs);
        assert_eq!(config.plugins.len(), 2);
    }

    #[test]
    fn empty_input_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:18181");
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn feed_addr_from_url() {
        let config = sample();
        assert_eq!(config.server.feed_addr(), "pedal.local:18181");

        let mut with_port = ServerConfig::default();
        with_port.url = "http://10.0.0.5:9090/api".into();
        with_port.feed_port = 18181;
        assert_eq!(with_port.feed_addr(), "10.0.0.5:18181");
    }

    #[test]
    fn lookup_helpers() {
        let config = sample();
        assert!(config.plugin_by_uri("http://example.org/ds1").is_some());
        assert!(config.plugin_by_uri("http://example.org/nope").is_none());
        assert_eq!(config.plugin_by_name("ds1").unwrap().name, "DS1");
        assert_eq!(config.plugins_by_category("Reverb").len(), 1);
        assert_eq!(config.categories(), vec!["distortion", "reverb"]);
    }
}
