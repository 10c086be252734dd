use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawImehubConfig {
    #[serde(default)]
    pub plugins: RawPluginsConfig,

    #[serde(default)]
    pub host: RawHostConfig,
}

/// Plugin section as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPluginsConfig {
    /// Directory scanned for plugin libraries
    pub root: Option<PathBuf>,

    /// Rescan when the plugin directory changes
    pub watch: Option<bool>,

    /// Quiet period before a burst of file events triggers a rescan
    pub debounce_ms: Option<u64>,
}

/// Host section as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHostConfig {
    /// How long a blocking call waits for its reply
    pub call_timeout_ms: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImehubConfig {
    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    pub root: PathBuf,
    pub watch: bool,
    pub debounce_ms: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            root: imehub_paths::plugin_dir(),
            watch: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub call_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

/// Default debounce for plugin directory events
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default reply timeout for blocking calls
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ImehubConfig::default();
        assert!(config.plugins.root.ends_with("imehub/plugins"));
        assert!(config.plugins.watch);
        assert_eq!(config.plugins.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.host.call_timeout_ms, DEFAULT_CALL_TIMEOUT_MS);
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[plugins]
watch = false
"#;
        let raw: RawImehubConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.plugins.watch, Some(false));
        assert!(raw.plugins.root.is_none());
        assert!(raw.plugins.debounce_ms.is_none());
        assert!(raw.host.call_timeout_ms.is_none());
    }

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawImehubConfig = toml::from_str("").unwrap();
        assert!(raw.plugins.root.is_none());
        assert!(raw.plugins.watch.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ImehubConfig {
            plugins: PluginsConfig {
                root: PathBuf::from("/opt/imehub/plugins"),
                watch: false,
                debounce_ms: 50,
            },
            host: HostConfig {
                call_timeout_ms: 750,
            },
        };

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ImehubConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.plugins.root, PathBuf::from("/opt/imehub/plugins"));
        assert!(!parsed.plugins.watch);
        assert_eq!(parsed.plugins.debounce_ms, 50);
        assert_eq!(parsed.host.call_timeout_ms, 750);
    }
}
