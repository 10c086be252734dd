//! Directory layout for imehub.
//!
//! The hub resolves its directories the XDG way on every platform so that
//! plugin roots and config files live in predictable places for installers
//! and for the `imehub` CLI alike.

use std::path::PathBuf;

/// Name of the directory created under the XDG base directories.
const APP_DIR: &str = "imehub";

/// Resolve `$var/imehub`, falling back to `~/<home_relative>/imehub`.
fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
    match std::env::var_os(var) {
        Some(base) if !base.is_empty() => PathBuf::from(base).join(APP_DIR),
        _ => dirs::home_dir()
            .unwrap_or_default()
            .join(home_relative)
            .join(APP_DIR),
    }
}

/// Get the imehub config directory.
///
/// Returns `$XDG_CONFIG_HOME/imehub` if set, otherwise `~/.config/imehub`.
///
/// # Examples
///
/// ```
/// use imehub_paths::config_dir;
///
/// let settings = config_dir().join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Default root scanned for plugin modules: `<config_dir>/plugins`.
///
/// Plugin files may be nested in sub-directories below this root.
pub fn plugin_dir() -> PathBuf {
    config_dir().join("plugins")
}
