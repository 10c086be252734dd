use super::types::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_DEBOUNCE_MS, HostConfig, ImehubConfig, PluginsConfig,
    RawHostConfig, RawImehubConfig, RawPluginsConfig,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<ImehubConfig> {
        Self::load_layers(
            Self::user_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Merge the layers that exist, later ones winning
    fn load_layers(user_path: Option<&Path>, project_path: &Path) -> Result<ImehubConfig> {
        let mut raw = RawImehubConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user_path
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(user_path)?);
        }

        // Layer 2: Project config
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<RawImehubConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "imehub").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with IMEHUB_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("IMEHUB_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".imehub/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawImehubConfig, overlay: RawImehubConfig) -> RawImehubConfig {
        RawImehubConfig {
            plugins: RawPluginsConfig {
                root: overlay.plugins.root.or(base.plugins.root),
                watch: overlay.plugins.watch.or(base.plugins.watch),
                debounce_ms: overlay.plugins.debounce_ms.or(base.plugins.debounce_ms),
            },
            host: RawHostConfig {
                call_timeout_ms: overlay.host.call_timeout_ms.or(base.host.call_timeout_ms),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawImehubConfig) -> ImehubConfig {
        ImehubConfig {
            plugins: PluginsConfig {
                root: raw.plugins.root.unwrap_or_else(imehub_paths::plugin_dir),
                watch: raw.plugins.watch.unwrap_or(true),
                debounce_ms: raw.plugins.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            },
            host: HostConfig {
                call_timeout_ms: raw.host.call_timeout_ms.unwrap_or(DEFAULT_CALL_TIMEOUT_MS),
            },
        }
    }
}
