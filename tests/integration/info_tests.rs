//! Information queries, configuration, and signals.

use std::time::Duration;

use torino::controller::Signal;
use torino::AppError;

use super::test_helpers::connect;

#[tokio::test]
async fn version_is_fetched_once() {
    let (controller, mut daemon) = connect();

    let (version, ()) = tokio::join!(
        controller.version(),
        daemon.expect("GETINFO version", "250-version=0.4.8.10 (git-abc)\r\n250 OK\r\n"),
    );
    assert_eq!(version, Ok("0.4.8.10 (git-abc)".to_owned()));

    assert_eq!(controller.version().await, Ok("0.4.8.10 (git-abc)".to_owned()));
    assert!(daemon.command_within(Duration::from_millis(50)).await.is_none());
}

#[tokio::test]
async fn pid_must_be_numeric() {
    let (controller, mut daemon) = connect();

    let (pid, ()) = tokio::join!(
        controller.pid(),
        daemon.expect("GETINFO process/pid", "250-process/pid=abc\r\n250 OK\r\n"),
    );
    assert!(matches!(pid, Err(AppError::Protocol(_))));

    // A failed lookup is not memoized.
    let (pid, ()) = tokio::join!(
        controller.pid(),
        daemon.expect("GETINFO process/pid", "250-process/pid=4242\r\n250 OK\r\n"),
    );
    assert_eq!(pid, Ok(4242));
}

#[tokio::test]
async fn get_conf_reports_defaults_as_none() {
    let (controller, mut daemon) = connect();

    let (values, ()) = tokio::join!(
        controller.get_conf(&["SocksPort", "ORPort"]),
        daemon.expect("GETCONF SocksPort ORPort", "250-SocksPort=9050\r\n250 ORPort\r\n"),
    );

    assert_eq!(
        values.expect("GETCONF must succeed"),
        vec![
            ("SocksPort".to_owned(), Some("9050".to_owned())),
            ("ORPort".to_owned(), None),
        ]
    );
}

#[tokio::test]
async fn set_conf_quotes_values() {
    let (controller, mut daemon) = connect();

    let (set, ()) = tokio::join!(
        controller.set_conf(&[("ContactInfo", Some("ops at example")), ("ORPort", None)]),
        daemon.expect("SETCONF ContactInfo=\"ops at example\" ORPort", "250 OK\r\n"),
    );

    assert!(set.is_ok());
}

#[tokio::test]
async fn signal_uses_wire_name() {
    let (controller, mut daemon) = connect();

    let (sent, ()) = tokio::join!(
        controller.signal(Signal::ClearDnsCache),
        daemon.expect("SIGNAL CLEARDNSCACHE", "250 OK\r\n"),
    );

    assert!(sent.is_ok());
}

#[tokio::test]
async fn missing_key_in_reply_is_a_protocol_error() {
    let (controller, mut daemon) = connect();

    let (value, ()) = tokio::join!(
        controller.get_info_value("process/user"),
        daemon.expect("GETINFO process/user", "250 OK\r\n"),
    );

    assert!(matches!(value, Err(AppError::Protocol(_))));
}
