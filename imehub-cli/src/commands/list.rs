//! List plugin components

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use imehub_components::{PluginManager, PluginManagerComponent, PluginManagerConfig};
use imehub_ipc::MultiComponentHost;

use crate::config::ConfigLoader;

/// List arguments
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Plugin directory to scan instead of the configured one
    #[arg(long)]
    pub root: Option<PathBuf>,
}

/// Load every plugin under the root and print what it provides
pub fn run(args: ListArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let root = args.root.unwrap_or(config.plugins.root);

    let host = MultiComponentHost::new().context("Failed to start component host")?;
    let manager = PluginManager::new(
        PluginManagerConfig { root: root.clone() },
        host.clone(),
        PluginManagerComponent::new(),
    );
    let summary = manager.init()?;

    let components = manager.components();

    if components.is_empty() {
        println!("No plugin components found");
        println!();
        println!("Plugin directory: {}", root.display());
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Component").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Started").fg(Color::Cyan),
            Cell::new("Plugin").fg(Color::Cyan),
        ]);

        for info in &components {
            let started = if manager.is_started(&info.string_id) {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no").fg(Color::Red)
            };
            let plugin = manager
                .owner(&info.string_id)
                .map(|path| path.strip_prefix(&root).unwrap_or(&path).display().to_string())
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(&info.string_id),
                Cell::new(&info.name),
                started,
                Cell::new(plugin),
            ]);
        }

        println!("{table}");
    }

    for path in &summary.failed {
        eprintln!("Failed to load: {}", path.display());
    }

    drop(manager);
    host.shutdown();
    Ok(())
}
