//! Change monitors that tell the manager a rescan is warranted

use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::MonitorError;

/// Receiver of "the plugin set may have changed"
pub trait PluginMonitorDelegate: Send + Sync {
    fn plugin_changed(&self);
}

/// An observer that reports changes without saying what changed
pub trait PluginMonitor: Send {
    fn start(&mut self, delegate: Weak<dyn PluginMonitorDelegate>) -> Result<(), MonitorError>;

    fn stop(&mut self);
}

/// Watches a plugin root recursively and reports debounced bursts of changes
pub struct DirectoryMonitor {
    root: PathBuf,
    debounce: Duration,
    runtime: Handle,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl DirectoryMonitor {
    /// Create a monitor whose debounce loop runs on `runtime`
    pub fn new(root: impl Into<PathBuf>, debounce: Duration, runtime: Handle) -> Self {
        Self {
            root: root.into(),
            debounce,
            runtime,
            watcher: None,
            task: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Wait for a first event, then for a quiet period, then notify once
    async fn debounce_loop(
        mut rx: mpsc::Receiver<notify::Result<notify::Event>>,
        delegate: Weak<dyn PluginMonitorDelegate>,
        debounce: Duration,
    ) {
        loop {
            match rx.recv().await {
                Some(Ok(event)) if is_relevant(&event.kind) => {}
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Plugin watch error");
                    continue;
                }
                None => break,
            }

            tracing::debug!("Plugin change detected, starting debounce");

            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(_)) => {
                        tracing::trace!("More events during debounce, resetting timer");
                    }
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            let Some(delegate) = delegate.upgrade() else {
                tracing::debug!("Monitor delegate dropped, stopping");
                return;
            };
            tracing::info!("Plugin directory changed, requesting rescan");
            if let Err(e) = tokio::task::spawn_blocking(move || delegate.plugin_changed()).await {
                tracing::error!(error = %e, "Plugin change handler failed");
            }
        }
    }
}

/// Reads do not change the plugin set; scanning opens files itself.
fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

impl PluginMonitor for DirectoryMonitor {
    fn start(&mut self, delegate: Weak<dyn PluginMonitorDelegate>) -> Result<(), MonitorError> {
        if self.watcher.is_some() {
            return Err(MonitorError::AlreadyStarted);
        }
        if !self.root.is_dir() {
            return Err(MonitorError::DirNotFound {
                path: self.root.clone(),
            });
        }

        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>(100);
        let mut watcher = recommended_watcher(move |event| {
            // Use blocking_send since this callback runs in the notify thread
            let _ = tx.blocking_send(event);
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        self.task = Some(
            self.runtime
                .spawn(Self::debounce_loop(rx, delegate, self.debounce)),
        );
        self.watcher = Some(watcher);
        tracing::info!(root = %self.root.display(), "Watching plugin directory");
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the watcher closes the channel and ends the loop
        if self.watcher.take().is_some() {
            tracing::debug!(root = %self.root.display(), "Stopped watching plugin directory");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
