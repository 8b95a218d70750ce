//! Daemon launching against stand-in executables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use torino::launcher::{read_port_file, DaemonProcess, LaunchConfig, COOKIE_FILE};
use torino::AppError;

#[tokio::test]
async fn port_file_is_read_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("control_port");
    std::fs::write(&path, "PORT=127.0.0.1:45123\n").expect("write port file");

    let addr = read_port_file(&path).await.expect("port file");

    assert_eq!(addr.port(), 45123);
    assert!(addr.ip().is_loopback());
}

#[tokio::test]
async fn missing_port_file_is_a_launch_error() {
    let dir = tempfile::tempdir().expect("temp dir");

    assert!(matches!(
        read_port_file(&dir.path().join("control_port")).await,
        Err(AppError::Launch(_))
    ));
}

#[tokio::test]
async fn missing_executable_is_a_launch_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = LaunchConfig {
        executable: Some(dir.path().join("no-such-daemon")),
        ..LaunchConfig::default()
    };

    match DaemonProcess::spawn(&config).await {
        Err(AppError::Launch(message)) => assert!(message.contains("spawn"), "{message}"),
        other => panic!("expected launch error, got {other:?}"),
    }
}

#[cfg(unix)]
fn fake_daemon(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-daemon.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

#[cfg(unix)]
#[tokio::test]
async fn bootstrap_progress_is_followed() {
    let bin = tempfile::tempdir().expect("bin dir");
    let data = tempfile::tempdir().expect("data dir");
    let config = LaunchConfig {
        executable: Some(fake_daemon(
            bin.path(),
            "echo '[notice] Bootstrapped 5% (conn): Connecting'\n\
             echo '[warn] Something looks off'\n\
             echo '[notice] Bootstrapped 100% (done): Done'\n\
             sleep 30",
        )),
        data_directory: Some(data.path().join("tor")),
        startup_timeout: Duration::from_secs(10),
        ..LaunchConfig::default()
    };

    let mut daemon = DaemonProcess::spawn(&config).await.expect("spawn");
    daemon.wait_bootstrapped().await.expect("bootstrap");

    assert_eq!(*daemon.progress().borrow(), 100);
    assert!(daemon.data_directory().is_dir());
    assert_eq!(daemon.cookie_file(), data.path().join("tor").join(COOKIE_FILE));
    daemon.kill().await.expect("kill");
}

#[cfg(unix)]
#[tokio::test]
async fn early_exit_is_reported() {
    let bin = tempfile::tempdir().expect("bin dir");
    let config = LaunchConfig {
        executable: Some(fake_daemon(
            bin.path(),
            "echo '[err] Reading config failed'\nexit 1",
        )),
        startup_timeout: Duration::from_secs(10),
        ..LaunchConfig::default()
    };

    let mut daemon = DaemonProcess::spawn(&config).await.expect("spawn");

    match daemon.wait_bootstrapped().await {
        Err(AppError::Launch(message)) => assert!(message.contains("exited"), "{message}"),
        other => panic!("expected launch error, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn stalled_bootstrap_times_out() {
    let bin = tempfile::tempdir().expect("bin dir");
    let config = LaunchConfig {
        executable: Some(fake_daemon(
            bin.path(),
            "echo '[notice] Bootstrapped 10% (conn_done)'\nsleep 30",
        )),
        startup_timeout: Duration::from_millis(300),
        ..LaunchConfig::default()
    };

    let mut daemon = DaemonProcess::spawn(&config).await.expect("spawn");

    match daemon.wait_bootstrapped().await {
        Err(AppError::Launch(message)) => {
            assert!(message.starts_with("startup timeout"), "{message}");
        }
        other => panic!("expected launch error, got {other:?}"),
    }
}
