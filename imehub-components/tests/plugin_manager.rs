//! PluginManager behavior against manifest plugins on a temp directory

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use common::{Fixture, ManifestLoader, write_plugin};
use imehub_components::plugin_manager::{
    MonitorError, PluginManager, PluginManagerComponent, PluginManagerConfig, PluginManagerError,
    PluginMonitor, PluginMonitorDelegate,
};
use imehub_ipc::message_types::{
    MSG_PLUGIN_CHANGED, MSG_PLUGIN_QUERY_COMPONENTS, MSG_PLUGIN_START_COMPONENTS,
    MSG_PLUGIN_STOP_COMPONENTS,
};
use imehub_ipc::{
    Component, ComponentContext, ComponentHost, ComponentInfo, Message, MessagePayload,
    MultiComponentHost,
};

#[test]
fn test_new_plugin_is_discovered_and_started_on_change() {
    let fx = Fixture::new();
    fx.manager.init().unwrap();
    assert!(fx.manager.components().is_empty());
    assert_eq!(fx.host.count(), 0);

    write_plugin(fx.path(), "pinyin/engine.plugin.toml", &["test.a", "test.b"]);
    fx.manager.plugin_changed();

    assert_eq!(fx.component_ids(), vec!["test.a", "test.b"]);
    assert_eq!(fx.manager.started_components(), vec!["test.a", "test.b"]);
    assert_eq!(fx.host.string_ids(), vec!["test.a", "test.b"]);
    assert_eq!(fx.delegate.changes(), 1);
}

#[test]
fn test_stopped_component_stays_available() {
    let fx = Fixture::new();
    write_plugin(fx.path(), "engine.plugin.toml", &["test.a", "test.b"]);
    fx.manager.init().unwrap();

    fx.manager.stop_component("test.a").unwrap();

    assert_eq!(fx.component_ids(), vec!["test.a", "test.b"]);
    assert!(!fx.manager.is_started("test.a"));
    assert!(fx.manager.is_started("test.b"));
    assert_eq!(fx.host.string_ids(), vec!["test.b"]);
    assert_eq!(fx.delegate.changes(), 0);
}

#[test]
fn test_init_registers_every_exported_component() {
    let fx = Fixture::new();
    write_plugin(fx.path(), "one.plugin.toml", &["test.one"]);
    write_plugin(fx.path(), "nested/deeper/two.plugin.toml", &["test.two", "test.three"]);
    std::fs::write(fx.path().join("README.txt"), "not a plugin").unwrap();

    let summary = fx.manager.init().unwrap();

    assert_eq!(summary.added.len(), 2);
    assert_eq!(fx.component_ids(), vec!["test.one", "test.three", "test.two"]);
    assert_eq!(fx.host.count(), 3);
    assert_eq!(fx.manager.plugins().len(), 2);
}

#[test]
fn test_missing_root_scans_empty() {
    let fx = Fixture::new();
    let manager = PluginManager::with_loader(
        PluginManagerConfig {
            root: fx.path().join("absent"),
        },
        fx.host.clone(),
        fx.delegate.clone(),
        fx.loader.clone(),
    );
    let summary = manager.init().unwrap();
    assert!(summary.is_empty());
    assert!(manager.components().is_empty());
}

#[test]
fn test_scan_does_not_start_components() {
    let fx = Fixture::new();
    write_plugin(fx.path(), "engine.plugin.toml", &["test.a"]);

    fx.manager.scan_all_plugin_files().unwrap();

    assert_eq!(fx.component_ids(), vec!["test.a"]);
    assert!(fx.manager.started_components().is_empty());
    assert_eq!(fx.host.count(), 0);
}

#[test]
fn test_unchanged_files_are_not_reopened() {
    let fx = Fixture::new();
    write_plugin(fx.path(), "engine.plugin.toml", &["test.a"]);
    fx.manager.init().unwrap();
    let opens = fx.loader.opens();

    let summary = fx.manager.scan_all_plugin_files().unwrap();

    assert!(summary.is_empty());
    assert_eq!(fx.loader.opens(), opens);
}

#[test]
fn test_removed_file_drops_its_components() {
    let fx = Fixture::new();
    let keep = write_plugin(fx.path(), "keep.plugin.toml", &["test.keep"]);
    let gone = write_plugin(fx.path(), "gone.plugin.toml", &["test.gone"]);
    fx.manager.init().unwrap();

    std::fs::remove_file(&gone).unwrap();
    let summary = fx.manager.scan_all_plugin_files().unwrap();

    assert_eq!(summary.removed, vec![gone]);
    assert_eq!(fx.component_ids(), vec!["test.keep"]);
    assert_eq!(fx.host.string_ids(), vec!["test.keep"]);
    assert!(fx.manager.plugins().iter().all(|p| p.path == keep));
}

#[test]
fn test_changed_file_is_reloaded() {
    let fx = Fixture::new();
    let path = write_plugin(fx.path(), "engine.plugin.toml", &["test.a", "test.b"]);
    fx.manager.init().unwrap();

    write_plugin(fx.path(), "engine.plugin.toml", &["test.a", "test.c", "test.d"]);
    let summary = fx.manager.scan_all_plugin_files().unwrap();
    assert_eq!(summary.changed, vec![path]);
    assert_eq!(fx.component_ids(), vec!["test.a", "test.c", "test.d"]);
    // Components of a changed file stop until the next start pass
    assert_eq!(fx.host.count(), 0);

    fx.manager.plugin_changed();
    assert_eq!(fx.host.string_ids(), vec!["test.a", "test.c", "test.d"]);
}

#[test]
fn test_broken_file_is_retried_after_it_is_fixed() {
    let fx = Fixture::new();
    let path = fx.path().join("broken.plugin.toml");
    std::fs::write(&path, "[[component]\nstring_id = ").unwrap();

    let summary = fx.manager.init().unwrap();
    assert_eq!(summary.failed, vec![path.clone()]);
    assert!(fx.manager.components().is_empty());

    let again = fx.manager.scan_all_plugin_files().unwrap();
    assert_eq!(again.failed, vec![path]);

    write_plugin(fx.path(), "broken.plugin.toml", &["test.fixed"]);
    fx.manager.plugin_changed();
    assert_eq!(fx.manager.started_components(), vec!["test.fixed"]);
}

#[test]
fn test_duplicate_string_id_keeps_first_file() {
    let fx = Fixture::new();
    let first = write_plugin(fx.path(), "a.plugin.toml", &["test.shared", "test.a"]);
    write_plugin(fx.path(), "b.plugin.toml", &["test.shared", "test.b"]);

    fx.manager.init().unwrap();

    assert_eq!(fx.component_ids(), vec!["test.a", "test.b", "test.shared"]);
    assert_eq!(fx.host.count(), 3);
    assert_eq!(fx.manager.owner("test.shared"), Some(first));
}

#[test]
fn test_shadowed_component_returns_when_its_owner_is_removed() {
    let fx = Fixture::new();
    let first = write_plugin(fx.path(), "a.plugin.toml", &["test.shared", "test.a"]);
    let second = write_plugin(fx.path(), "b.plugin.toml", &["test.shared", "test.b"]);
    fx.manager.init().unwrap();

    std::fs::remove_file(&first).unwrap();
    fx.manager.plugin_changed();

    assert_eq!(fx.component_ids(), vec!["test.b", "test.shared"]);
    assert_eq!(fx.host.string_ids(), vec!["test.b", "test.shared"]);
    assert_eq!(fx.manager.started_components(), vec!["test.b", "test.shared"]);
    assert_eq!(fx.manager.owner("test.shared"), Some(second.clone()));

    std::fs::remove_file(&second).unwrap();
    fx.manager.plugin_changed();

    assert!(fx.component_ids().is_empty());
    assert_eq!(fx.host.count(), 0);
}

#[test]
fn test_unloading_owner_leaves_shadowed_component_available() {
    let fx = Fixture::new();
    let first = write_plugin(fx.path(), "a.plugin.toml", &["test.shared"]);
    let second = write_plugin(fx.path(), "b.plugin.toml", &["test.shared"]);
    fx.manager.init().unwrap();

    fx.manager.unload_plugin(&first).unwrap();

    assert_eq!(fx.component_ids(), vec!["test.shared"]);
    assert_eq!(fx.manager.owner("test.shared"), Some(second));
    assert!(!fx.manager.is_started("test.shared"));
    fx.manager.start_component("test.shared").unwrap();
    assert_eq!(fx.host.string_ids(), vec!["test.shared"]);
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let fx = Fixture::new();
    write_plugin(fx.path(), "engine.plugin.toml", &["test.a"]);
    fx.manager.init().unwrap();
    assert_eq!(fx.host.adds(), 1);

    fx.manager.start_component("test.a").unwrap();
    assert_eq!(fx.host.adds(), 1);

    fx.manager.stop_component("test.a").unwrap();
    fx.manager.stop_component("test.a").unwrap();
    assert_eq!(fx.host.removes(), 1);

    fx.manager.start_component("test.a").unwrap();
    assert_eq!(fx.host.adds(), 2);
    assert!(fx.manager.is_started("test.a"));
}

#[test]
fn test_unknown_component_is_an_error() {
    let fx = Fixture::new();
    fx.manager.init().unwrap();

    assert!(matches!(
        fx.manager.start_component("test.nothing"),
        Err(PluginManagerError::UnknownComponent { .. })
    ));
    assert!(matches!(
        fx.manager.stop_component("test.nothing"),
        Err(PluginManagerError::UnknownComponent { .. })
    ));
}

#[test]
fn test_unload_forgets_file_until_rescan() {
    let fx = Fixture::new();
    let path = write_plugin(fx.path(), "engine.plugin.toml", &["test.a", "test.b"]);
    fx.manager.init().unwrap();

    fx.manager.unload_plugin(&path).unwrap();
    assert!(fx.manager.components().is_empty());
    assert_eq!(fx.host.count(), 0);
    assert_eq!(fx.delegate.changes(), 1);

    assert!(matches!(
        fx.manager.unload_plugin(&path),
        Err(PluginManagerError::UnknownPlugin { .. })
    ));

    fx.manager.plugin_changed();
    assert_eq!(fx.manager.started_components(), vec!["test.a", "test.b"]);
}

#[test]
fn test_delegate_notified_once_per_change_request() {
    let fx = Fixture::new();
    fx.manager.init().unwrap();

    fx.manager.plugin_changed();
    assert_eq!(fx.delegate.changes(), 1);

    write_plugin(fx.path(), "a.plugin.toml", &["test.a"]);
    write_plugin(fx.path(), "b.plugin.toml", &["test.b"]);
    write_plugin(fx.path(), "c.plugin.toml", &["test.c"]);
    fx.manager.plugin_changed();
    assert_eq!(fx.delegate.changes(), 2);
}

#[test]
fn test_rescans_racing_requests_keep_host_in_line_with_table() {
    let fx = Fixture::new();
    let first = write_plugin(fx.path(), "a.plugin.toml", &["test.a1", "test.a2"]);
    write_plugin(fx.path(), "b.plugin.toml", &["test.b"]);
    fx.manager.init().unwrap();

    std::thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                for _ in 0..50 {
                    fx.manager.plugin_changed();
                }
            });
        }
        scope.spawn(|| {
            for round in 0..50 {
                match round % 5 {
                    0 => {
                        write_plugin(fx.path(), "c.plugin.toml", &["test.c"]);
                    }
                    2 => {
                        let _ = std::fs::remove_file(fx.path().join("c.plugin.toml"));
                    }
                    _ => {}
                }
            }
        });
        scope.spawn(|| {
            for _ in 0..50 {
                let _ = fx.manager.unload_plugin(&first);
                // Either the unload is still in effect or a rescan brought the file back
                match fx.manager.start_component("test.a1") {
                    Ok(()) | Err(PluginManagerError::UnknownComponent { .. }) => {}
                    Err(e) => panic!("unexpected start failure: {e}"),
                }
                let _ = fx.manager.stop_component("test.b");
                let _ = fx.manager.start_component("test.b");
            }
        });
    });

    let started = fx.manager.started_components();
    let available = fx.component_ids();
    assert!(started.iter().all(|id| available.contains(id)));
    assert_eq!(fx.host.string_ids(), started);
    assert_eq!(fx.host.adds() - fx.host.removes(), fx.host.count());

    // Settled: exactly what the files on disk export, all started
    fx.manager.plugin_changed();
    assert_eq!(fx.component_ids(), vec!["test.a1", "test.a2", "test.b"]);
    assert_eq!(fx.manager.started_components(), fx.component_ids());
    assert_eq!(fx.host.string_ids(), fx.component_ids());
}

#[test]
fn test_drop_removes_started_components_from_host() {
    let fx = Fixture::new();
    write_plugin(fx.path(), "engine.plugin.toml", &["test.a", "test.b"]);
    fx.manager.init().unwrap();
    assert_eq!(fx.host.count(), 2);

    let Fixture { host, manager, .. } = fx;
    drop(manager);

    assert_eq!(host.count(), 0);
}

/// Monitor driven by hand from the test
#[derive(Default)]
struct ManualMonitor {
    delegate: Arc<Mutex<Option<Weak<dyn PluginMonitorDelegate>>>>,
    stopped: Arc<AtomicBool>,
    fail: bool,
}

impl PluginMonitor for ManualMonitor {
    fn start(&mut self, delegate: Weak<dyn PluginMonitorDelegate>) -> Result<(), MonitorError> {
        if self.fail {
            return Err(MonitorError::AlreadyStarted);
        }
        *self.delegate.lock().unwrap() = Some(delegate);
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_monitor_triggers_rescan_and_stops_with_manager() {
    let fx = Fixture::new();
    fx.manager.init().unwrap();

    let monitor = ManualMonitor::default();
    let delegate = monitor.delegate.clone();
    let stopped = monitor.stopped.clone();
    fx.manager.add_monitor(Box::new(monitor)).unwrap();

    write_plugin(fx.path(), "engine.plugin.toml", &["test.a"]);
    let weak = delegate.lock().unwrap().clone().unwrap();
    weak.upgrade().unwrap().plugin_changed();
    assert_eq!(fx.manager.started_components(), vec!["test.a"]);

    let Fixture { manager, .. } = fx;
    drop(manager);
    assert!(stopped.load(Ordering::SeqCst));
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_failing_monitor_is_rejected() {
    let fx = Fixture::new();
    let monitor = ManualMonitor {
        fail: true,
        ..Default::default()
    };
    let stopped = monitor.stopped.clone();

    assert!(fx.manager.add_monitor(Box::new(monitor)).is_err());

    let Fixture { manager, .. } = fx;
    drop(manager);
    assert!(!stopped.load(Ordering::SeqCst));
}

/// Listens for change broadcasts
#[derive(Default)]
struct ChangeListener {
    changes: Mutex<usize>,
}

impl Component for ChangeListener {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::new("test.listener").consumes_messages([MSG_PLUGIN_CHANGED])
    }

    fn handle(&self, _message: Message, _ctx: &ComponentContext) {
        *self.changes.lock().unwrap() += 1;
    }
}

#[test]
fn test_manager_component_answers_over_the_bus() {
    let root = tempfile::tempdir().unwrap();
    write_plugin(root.path(), "engine.plugin.toml", &["test.a", "test.b"]);

    let host = MultiComponentHost::new().unwrap();
    let component = PluginManagerComponent::new();
    let manager = Arc::new(PluginManager::with_loader(
        PluginManagerConfig {
            root: root.path().to_path_buf(),
        },
        host.clone(),
        component.clone(),
        Arc::new(ManifestLoader::default()),
    ));
    component.attach(&manager);
    let manager_id = host.add_component(component.clone()).unwrap();
    let listener = Arc::new(ChangeListener::default());
    let caller = host.add_component(listener.clone()).unwrap();
    manager.init().unwrap();

    let timeout = Some(Duration::from_secs(5));
    let reply = host
        .send_with_reply(
            caller,
            Message::new(MSG_PLUGIN_QUERY_COMPONENTS, manager_id),
            timeout,
        )
        .unwrap();
    let ids: Vec<&str> = reply
        .payload
        .component_infos()
        .map(|c| c.string_id.as_str())
        .collect();
    assert_eq!(ids, vec!["test.a", "test.b"]);

    let reply = host
        .send_with_reply(
            caller,
            Message::new(MSG_PLUGIN_STOP_COMPONENTS, manager_id)
                .with_payload(MessagePayload::new().with("test.a").with("test.none")),
            timeout,
        )
        .unwrap();
    assert_eq!(reply.payload.booleans().collect::<Vec<_>>(), vec![true, false]);
    assert!(host.query_component("test.a").is_none());

    let reply = host
        .send_with_reply(
            caller,
            Message::new(MSG_PLUGIN_START_COMPONENTS, manager_id)
                .with_payload(MessagePayload::new().with("test.a")),
            timeout,
        )
        .unwrap();
    assert_eq!(reply.payload.boolean(0), Some(true));
    assert!(host.query_component("test.a").is_some());

    manager.plugin_changed();
    assert!(host.wait_idle(Duration::from_secs(5)));
    assert_eq!(*listener.changes.lock().unwrap(), 1);

    drop(manager);
    host.shutdown();
}
