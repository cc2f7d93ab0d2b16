//! Sidecar reload against a volume laid out like the orchestrator's
//! atomic writer produces it.
#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::write_atomic_volume;
use reconfigurator::reload::{create_combined_handler, load_descriptor, ConfigHandler};
use reconfigurator::resilience::FixedRetry;
use reconfigurator::updater::UpdaterOptions;
use reconfigurator::watcher::{EventOutcome, VolumeEvent, VolumeEventKind, VolumeWatcher};

fn descriptor(dir: &Path, mount: &Path, script: &str) -> std::path::PathBuf {
    let path = dir.join("descriptor.yaml");
    let yaml = format!(
        r#"- configSpecName: mysql
  reloadType: shell
  mountPoint: {mount}
  configFile: '^my\.cnf$'
  formatterConfig:
    format: ini
    ini:
      sectionName: mysqld
  reloadOptions:
    shell:
      command: ["sh", "-c", {script:?}]
"#,
        mount = mount.display(),
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

fn lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

struct Fixture {
    _root: tempfile::TempDir,
    mount: std::path::PathBuf,
    backup: std::path::PathBuf,
    out: std::path::PathBuf,
    watcher: VolumeWatcher,
    handler: Arc<dyn ConfigHandler>,
}

fn fixture(script: impl FnOnce(&Path) -> String, attempts: u32) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let mount = root.path().join("config");
    let backup = root.path().join("backup");
    std::fs::create_dir_all(&mount).unwrap();
    write_atomic_volume(&mount, "2024_01_01", &[("my.cnf", "[mysqld]\nmax_connections=100\n")]);

    let out = root.path().join("reload.log");
    let descriptor = descriptor(root.path(), &mount, &script(&out));
    let metas = load_descriptor(&descriptor).unwrap();
    let handler: Arc<dyn ConfigHandler> =
        Arc::new(create_combined_handler(&metas, Some(&backup), UpdaterOptions::default()).unwrap());
    let watcher = VolumeWatcher::new(
        vec![mount.clone()],
        handler.clone(),
        FixedRetry::new(attempts, Duration::from_millis(1)),
    );

    Fixture {
        _root: root,
        mount,
        backup,
        out,
        watcher,
        handler,
    }
}

fn record_params(out: &Path) -> String {
    format!("echo \"$0=$1\" >> {}", out.display())
}

#[tokio::test]
async fn test_swap_applies_changed_parameters() {
    let fx = fixture(record_params, 3);
    assert!(fx.backup.join("mysql").join("my.cnf").exists());

    let data = write_atomic_volume(
        &fx.mount,
        "2024_01_02",
        &[("my.cnf", "[mysqld]\nmax_connections=200\n")],
    );
    let outcome = fx
        .watcher
        .process_event(&VolumeEvent::new(data.clone(), VolumeEventKind::Create))
        .await;

    assert_eq!(outcome, EventOutcome::Handled);
    assert_eq!(lines(&fx.out), vec!["max_connections=200"]);
    let backed_up = std::fs::read_to_string(fx.backup.join("mysql").join("my.cnf")).unwrap();
    assert!(backed_up.contains("max_connections=200"));

    // same content again: nothing to apply
    let again = fx
        .watcher
        .process_event(&VolumeEvent::new(data, VolumeEventKind::Create))
        .await;
    assert_eq!(again, EventOutcome::Handled);
    assert_eq!(lines(&fx.out).len(), 1);
}

#[tokio::test]
async fn test_file_writes_are_filtered() {
    let fx = fixture(record_params, 3);
    std::fs::write(fx.mount.join("..2024_01_01").join("my.cnf"), "[mysqld]\nmax_connections=150\n").unwrap();

    let outcome = fx
        .watcher
        .process_event(&VolumeEvent::new(fx.mount.join("my.cnf"), VolumeEventKind::Write))
        .await;

    assert_eq!(outcome, EventOutcome::Filtered);
    assert!(lines(&fx.out).is_empty());
}

#[tokio::test]
async fn test_failing_reload_uses_retry_budget() {
    let fx = fixture(|out| format!("echo attempt >> {}; exit 1", out.display()), 2);
    let data = write_atomic_volume(
        &fx.mount,
        "2024_01_02",
        &[("my.cnf", "[mysqld]\nmax_connections=200\n")],
    );

    let outcome = fx
        .watcher
        .process_event(&VolumeEvent::new(data, VolumeEventKind::Create))
        .await;

    assert_eq!(outcome, EventOutcome::Dropped);
    assert_eq!(lines(&fx.out), vec!["attempt", "attempt"]);
    let backed_up = std::fs::read_to_string(fx.backup.join("mysql").join("my.cnf")).unwrap();
    assert!(backed_up.contains("max_connections=100"));
}

#[tokio::test]
async fn test_online_update_runs_per_parameter() {
    let fx = fixture(record_params, 1);
    let params = BTreeMap::from([
        ("max_connections".to_string(), "300".to_string()),
        ("wait_timeout".to_string(), "60".to_string()),
    ]);

    fx.handler.online_update("mysql", &params).await.unwrap();
    assert_eq!(lines(&fx.out), vec!["max_connections=300", "wait_timeout=60"]);
    assert!(fx.handler.online_update("redis", &params).await.is_err());
}
