//! Full sessions against `sh` stand-ins for the bundler and the test binary

#![cfg(unix)]

use std::fs;
use std::path::Path;

use specrig_common::{CommandSpec, HarnessConfig, PlatformTable};
use specrig_e2e::{Orchestrator, RunOptions, SessionState, FAILURE_EXIT_CODE};
use tempfile::TempDir;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script])
}

/// Bundler succeeds, native build is skipped, child runs `child_script`
fn config(root: &Path, child_script: &str) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.paths.workspace_root = root.to_path_buf();
    config.paths.test_root = root.join("specs");
    config.paths.snapshot_dir = root.join("snapshots");
    config.bundler.command = sh("true");
    config.bundler.production_args = Vec::new();
    config.native.binary_override = Some("/bin/sh".into());
    config.native.launch_args = vec!["-c".to_string(), child_script.to_string()];
    config
}

fn options() -> RunOptions {
    RunOptions {
        skip_build: true,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn failing_bundler_aborts_before_launch() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path(), "touch launched");
    config.bundler.command = sh(r#"printf '%s' "$SPECRIG_FILTER" > filter.txt; exit 2"#);

    let mut orchestrator = Orchestrator::new(config);
    let code = orchestrator
        .execute(RunOptions {
            filter_files: vec!["specs/a.ts".to_string(), "specs/b.ts".to_string()],
            ..options()
        })
        .await;

    assert_eq!(code, FAILURE_EXIT_CODE);
    assert_eq!(
        fs::read_to_string(tmp.path().join("filter.txt")).unwrap(),
        "specs/a.ts|specs/b.ts"
    );
    assert!(!tmp.path().join("launched").exists());
    assert_eq!(orchestrator.state(), SessionState::Terminated);
    assert_eq!(orchestrator.port(), None);
}

#[tokio::test]
async fn failing_native_build_aborts_before_launch() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path(), "touch launched");
    config.native.build = PlatformTable {
        linux: sh("exit 3"),
        macos: sh("exit 3"),
        windows: sh("exit 3"),
    };

    let mut orchestrator = Orchestrator::new(config);
    let code = orchestrator
        .execute(RunOptions {
            skip_build: false,
            ..options()
        })
        .await;

    assert_eq!(code, FAILURE_EXIT_CODE);
    assert!(!tmp.path().join("launched").exists());
}

#[tokio::test]
async fn child_exit_code_propagates() {
    let tmp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(config(tmp.path(), "exit 0"));
    assert_eq!(orchestrator.execute(options()).await, 0);
    assert!(orchestrator.port().is_some());

    let mut orchestrator = Orchestrator::new(config(tmp.path(), "exit 7"));
    assert_eq!(orchestrator.execute(options()).await, 7);
}

#[tokio::test]
async fn child_sees_session_environment() {
    let tmp = TempDir::new().unwrap();
    let script = r#"
        test "$SPECRIG_TEST_MODE" = true || exit 10
        test "$SPECRIG_CAPTURE_PORT" -ge 11000 -a "$SPECRIG_CAPTURE_PORT" -le 14000 || exit 11
        test "$SPECRIG_NAME_FILTER" = "layout" || exit 12
        test "$SPECRIG_ENABLE_FEATURE_X" = true || exit 13
        test -n "$SPECRIG_TEST_ROOT" || exit 14
        exit 0
    "#;
    let mut orchestrator = Orchestrator::new(config(tmp.path(), script));
    let code = orchestrator
        .execute(RunOptions {
            name_filter: Some("layout".to_string()),
            enable_feature_x: true,
            ..options()
        })
        .await;
    assert_eq!(code, 0);
}

#[tokio::test]
async fn signal_death_is_a_failure() {
    let tmp = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(config(tmp.path(), "kill -KILL $$"));
    assert_eq!(orchestrator.execute(options()).await, FAILURE_EXIT_CODE);
}

#[tokio::test]
async fn missing_binary_is_a_spawn_failure() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path(), "exit 0");
    config.native.binary_override = Some(tmp.path().join("does-not-exist"));

    let mut orchestrator = Orchestrator::new(config);
    assert_eq!(orchestrator.execute(options()).await, FAILURE_EXIT_CODE);
}

#[tokio::test]
async fn child_capture_reaches_the_snapshot_dir() {
    if !Path::new("/bin/bash").exists() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let script = r#"
        exec 3<>/dev/tcp/127.0.0.1/$SPECRIG_CAPTURE_PORT
        printf '%s\n' '{"method":"match_snapshot","id":1,"path":"dom/a.html","data":"aGVsbG8="}' >&3
        read -r reply <&3
        case "$reply" in *'"matched":true'*) exit 0 ;; *) exit 20 ;; esac
    "#;
    let mut config = config(tmp.path(), script);
    config.native.binary_override = Some("/bin/bash".into());

    let mut orchestrator = Orchestrator::new(config);
    assert_eq!(orchestrator.execute(options()).await, 0);
    assert_eq!(
        fs::read(tmp.path().join("snapshots/dom/a.html.png")).unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn capture_sent_right_before_exit_is_stored_and_counted() {
    if !Path::new("/bin/bash").exists() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let script = r#"
        exec 3<>/dev/tcp/127.0.0.1/$SPECRIG_CAPTURE_PORT
        printf '%s\n' '{"method":"match_snapshot","id":1,"path":"dom/b.html","index":"0","data":"d29ybGQ="}' >&3
        exit 0
    "#;
    let mut config = config(tmp.path(), script);
    config.native.binary_override = Some("/bin/bash".into());

    let mut orchestrator = Orchestrator::new(config);
    assert_eq!(orchestrator.execute(options()).await, 0);

    assert_eq!(
        fs::read(tmp.path().join("snapshots/dom/b.html.0.png")).unwrap(),
        b"world"
    );
    let captures = orchestrator.captures().unwrap();
    assert_eq!(captures.received, 1);
    assert_eq!(captures.created, 1);
}
