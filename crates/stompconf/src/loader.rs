//! Config file discovery and loading.

use crate::{Config, ConfigError};
use std::path::{Path, PathBuf};

/// Find the config file to use. The first existing candidate wins:
/// the CLI override, `./stomprack.toml`, the user config dir, then
/// `/etc/stomprack/config.toml`.
pub fn discover_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    let local = PathBuf::from("stomprack.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(dirs) = directories::BaseDirs::new() {
        let user = dirs.config_dir().join("stomprack/config.toml");
        if user.exists() {
            return Some(user);
        }
    }

    let system = PathBuf::from("/etc/stomprack/config.toml");
    if system.exists() {
        return Some(system);
    }

    None
}

/// Load config from a TOML file.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            url = "http://box:18181"

            [[plugins]]
            name = "Fuzz"
            uri = "http://example.org/fuzz"
            "#
        )
        .unwrap();

        let config = load_file(file.path()).unwrap();
        assert_eq!(config.server.url, "http://box:18181");
        assert_eq!(config.plugins.len(), 1);
    }

    #[test]
    fn parse_error_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = 12").unwrap();

        let err = load_file(file.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("failed to parse"), "unexpected error: {msg}");
    }

    #[test]
    fn missing_explicit_path_falls_through() {
        // A CLI path that does not exist is ignored by discovery rather
        // than reported, matching "missing file means defaults".
        let ghost = PathBuf::from("/nonexistent/stomprack.toml");
        let found = discover_config_file(Some(&ghost));
        if let Some(path) = found {
            assert_ne!(path, ghost);
        }
    }
}
