//! Run the hub until interrupted

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use imehub_components::plugin_manager::DirectoryMonitor;
use imehub_components::{
    FrontendComponent, FrontendDelegate, PluginManager, PluginManagerComponent,
    PluginManagerConfig,
};
use imehub_ipc::{ComponentHost, MultiComponentHost};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::ConfigLoader;

/// Key code sent for an empty input line
const KEY_RETURN: i64 = 0x0d;

/// Run arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Plugin directory to host instead of the configured one
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Do not rescan when the plugin directory changes
    #[arg(long)]
    pub no_watch: bool,

    /// Attach a console frontend to this engine component
    #[arg(long)]
    pub engine: Option<String>,
}

/// Prints engine output to the terminal
struct ConsoleFrontend;

impl FrontendDelegate for ConsoleFrontend {
    fn composition_changed(&self, composition: &str) {
        println!("composition: {composition}");
    }

    fn candidates_changed(&self, candidates: &[String]) {
        let listed: Vec<String> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect();
        println!("candidates: {}", listed.join("  "));
    }

    fn insert_text(&self, text: &str) {
        println!("insert: {text}");
    }

    fn key_processed(&self, keycode: i64, handled: bool) {
        tracing::debug!(keycode, handled, "Key processed");
    }

    fn session_reset(&self) {
        println!("(session reset)");
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let root = args.root.unwrap_or(config.plugins.root);
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create plugin directory {}", root.display()))?;

    let host = MultiComponentHost::new().context("Failed to start component host")?;
    let component = PluginManagerComponent::new();
    let manager = Arc::new(PluginManager::new(
        PluginManagerConfig { root: root.clone() },
        host.clone(),
        component.clone(),
    ));
    component.attach(&manager);
    host.add_component(component)?;

    let summary = manager.init()?;
    for path in &summary.failed {
        tracing::warn!(path = %path.display(), "Plugin failed to load");
    }
    println!(
        "Hosting {} plugin component(s) from {}",
        manager.started_components().len(),
        root.display()
    );

    if config.plugins.watch && !args.no_watch {
        let monitor = DirectoryMonitor::new(
            root.clone(),
            Duration::from_millis(config.plugins.debounce_ms),
            tokio::runtime::Handle::current(),
        );
        if let Err(e) = manager.add_monitor(Box::new(monitor)) {
            tracing::warn!(error = %e, "Running without plugin directory monitor");
        }
    }

    match args.engine {
        Some(engine) => {
            let frontend = Arc::new(
                FrontendComponent::new(engine, Arc::new(ConsoleFrontend))
                    .with_call_timeout(Duration::from_millis(config.host.call_timeout_ms)),
            );
            host.add_component(frontend.clone())?;
            println!("Type to send keys; an empty line sends Return. Ctrl-C quits.");
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                result = feed_keys(&frontend) => result?,
            }
        }
        None => {
            println!("Press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
        }
    }

    tracing::info!("Shutting down");
    drop(manager);
    host.shutdown();
    Ok(())
}

/// Forward stdin to the frontend until end of input
async fn feed_keys(frontend: &FrontendComponent) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            frontend.inject_key(KEY_RETURN)?;
            continue;
        }
        for ch in line.chars() {
            frontend.inject_key(i64::from(u32::from(ch)))?;
        }
    }
    Ok(())
}
