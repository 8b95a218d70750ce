//! Command correlation over a live (in-memory) connection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use torino::protocol::command::Command;
use torino::protocol::reply::ReplyCode;
use torino::AppError;

use super::test_helpers::connect;

#[tokio::test]
async fn single_line_reply_is_returned() {
    let (controller, mut daemon) = connect();

    let (reply, ()) = tokio::join!(
        controller.send_command(Command::Signal, Some("NEWNYM")),
        daemon.expect("SIGNAL NEWNYM", "250 OK\r\n"),
    );

    let reply = reply.expect("command must succeed");
    assert_eq!(reply.len(), 1);
    assert_eq!(reply.status(), ReplyCode::Ok);
    assert_eq!(reply.first().content(), "OK");
}

#[tokio::test]
async fn multi_line_reply_keeps_arrival_order() {
    let (controller, mut daemon) = connect();

    let (values, ()) = tokio::join!(
        controller.get_info(&["version", "process/pid"]),
        daemon.expect(
            "GETINFO version process/pid",
            "250-version=0.4.8.10\r\n250-process/pid=4242\r\n250 OK\r\n",
        ),
    );

    assert_eq!(
        values.expect("GETINFO must succeed"),
        vec![
            ("version".to_owned(), "0.4.8.10".to_owned()),
            ("process/pid".to_owned(), "4242".to_owned()),
        ]
    );
}

#[tokio::test]
async fn data_block_and_closing_line_form_one_reply() {
    let (controller, mut daemon) = connect();

    let (values, ()) = tokio::join!(
        controller.get_info(&["config-text"]),
        daemon.expect(
            "GETINFO config-text",
            "250+config-text=\r\nSocksPort 9050\r\n\r\nLog notice stdout\r\n.\r\n250 OK\r\n",
        ),
    );

    assert_eq!(
        values.expect("GETINFO must succeed"),
        vec![(
            "config-text".to_owned(),
            "SocksPort 9050\n\nLog notice stdout".to_owned()
        )]
    );
}

#[tokio::test]
async fn error_status_raises_command_error() {
    let (controller, mut daemon) = connect();

    let (reply, ()) = tokio::join!(
        controller.send_command(Command::GetInfo, Some("bogus")),
        daemon.expect("GETINFO bogus", "552 Unrecognized key \"bogus\"\r\n"),
    );

    assert_eq!(
        reply,
        Err(AppError::Command {
            code: ReplyCode::UnrecognizedEntity,
            message: "Unrecognized key \"bogus\"".to_owned(),
        })
    );
    assert!(!controller.is_closed(), "command errors are local to the caller");
}

#[tokio::test]
async fn unnecessary_operation_counts_as_success() {
    let (controller, mut daemon) = connect();

    let (reply, ()) = tokio::join!(
        controller.send_command(Command::TakeOwnership, None),
        daemon.expect("TAKEOWNERSHIP", "251 Already owned\r\n"),
    );

    assert!(reply.is_ok());
}

#[tokio::test]
async fn reply_to_cancelled_command_is_discarded() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();

    let (first, ()) = tokio::join!(
        controller.send_command_cancellable(Command::GetInfo, Some("slow"), &cancel),
        async {
            assert_eq!(daemon.next_command().await, "GETINFO slow");
            cancel.cancel();
        },
    );
    assert_eq!(first, Err(AppError::Cancelled));

    // The abandoned command's reply arrives late.
    daemon.send("250-slow=stale\r\n250 OK\r\n").await;

    let (values, ()) = tokio::join!(
        controller.get_info(&["version"]),
        daemon.expect("GETINFO version", "250-version=fresh\r\n250 OK\r\n"),
    );
    assert_eq!(
        values.expect("second command must succeed"),
        vec![("version".to_owned(), "fresh".to_owned())]
    );
}

#[tokio::test]
async fn reply_to_abandoned_command_arriving_after_next_send_is_skipped() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();

    let (first, ()) = tokio::join!(
        controller.send_command_cancellable(Command::GetInfo, Some("slow"), &cancel),
        async {
            daemon.next_command().await;
            cancel.cancel();
        },
    );
    assert_eq!(first, Err(AppError::Cancelled));

    let (values, ()) = tokio::join!(controller.get_info(&["version"]), async {
        assert_eq!(daemon.next_command().await, "GETINFO version");
        daemon
            .send("250-slow=stale\r\n250 OK\r\n250-version=fresh\r\n250 OK\r\n")
            .await;
    });
    assert_eq!(
        values.expect("second command must succeed"),
        vec![("version".to_owned(), "fresh".to_owned())]
    );
}

#[tokio::test]
async fn only_one_command_is_outstanding() {
    let (controller, mut daemon) = connect();

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.send_command(Command::Signal, Some("NEWNYM")).await }
    });
    let line = daemon.next_command().await;

    let second = tokio::spawn({
        let controller = controller.clone();
        async move { controller.send_command(Command::Signal, Some("RELOAD")).await }
    });
    assert!(
        daemon.command_within(Duration::from_millis(100)).await.is_none(),
        "second command must wait for the first reply"
    );

    daemon.send("250 OK\r\n").await;
    let next = daemon.next_command().await;
    daemon.send("250 OK\r\n").await;

    assert!(first.await.expect("join").is_ok());
    assert!(second.await.expect("join").is_ok());
    let mut lines = vec![line, next];
    lines.sort();
    assert_eq!(lines, vec!["SIGNAL NEWNYM".to_owned(), "SIGNAL RELOAD".to_owned()]);
}

#[tokio::test]
async fn malformed_line_closes_connection() {
    let (controller, mut daemon) = connect();

    let (reply, ()) = tokio::join!(
        controller.send_command(Command::GetInfo, Some("version")),
        daemon.expect("GETINFO version", "20\r\n"),
    );

    match reply {
        Err(AppError::ConnectionClosed(reason)) => {
            assert!(reason.contains("malformed"), "reason was {reason}");
        }
        other => panic!("expected connection closed, got {other:?}"),
    }
    assert!(controller.is_closed());
    assert!(matches!(
        controller.send_command(Command::GetInfo, Some("version")).await,
        Err(AppError::ConnectionClosed(_))
    ));
}

#[tokio::test]
async fn stream_end_fails_pending_command() {
    let (controller, mut daemon) = connect();

    let (reply, ()) = tokio::join!(
        controller.send_command(Command::GetInfo, Some("version")),
        async move {
            daemon.next_command().await;
            daemon.hang_up();
        },
    );

    match reply {
        Err(AppError::ConnectionClosed(reason)) => {
            assert!(reason.contains("empty socket content"), "reason was {reason}");
        }
        other => panic!("expected connection closed, got {other:?}"),
    }
}

#[tokio::test]
async fn close_sends_quit_and_shuts_down() {
    let (controller, mut daemon) = connect();

    let (closed, ()) = tokio::join!(
        controller.close(),
        daemon.expect("QUIT", "250 closing connection\r\n"),
    );

    assert!(closed.is_ok());
    assert!(controller.is_closed());
    assert_eq!(
        controller.send_command(Command::GetInfo, Some("version")).await,
        Err(AppError::ConnectionClosed("closed by caller".to_owned()))
    );
}

#[tokio::test]
async fn line_breaks_in_arguments_are_rejected_before_sending() {
    let (controller, mut daemon) = connect();

    let reply = controller
        .send_command(Command::SetConf, Some("a=b\r\nSIGNAL HALT"))
        .await;

    assert!(matches!(reply, Err(AppError::Protocol(_))));
    assert!(daemon.command_within(Duration::from_millis(50)).await.is_none());
}
