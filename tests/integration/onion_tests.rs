//! Hidden-service creation and descriptor publication waits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use torino::controller::{HiddenService, KeyBlob, OnionFlag, OnionKey, OnionRequest};
use torino::AppError;

use super::test_helpers::connect;

fn request() -> OnionRequest {
    OnionRequest::new(OnionKey::New(KeyBlob::Ed25519V3)).port_to(80, "127.0.0.1:8080")
}

const ADD_ONION_LINE: &str = "ADD_ONION NEW:ED25519-V3 Port=80,127.0.0.1:8080";

const CREATED: &str = "250-ServiceID=abcdefghijklmnop\r\n\
                       250-PrivateKey=ED25519-V3:c2VjcmV0\r\n\
                       250 OK\r\n";

#[tokio::test]
async fn one_confirmed_upload_publishes_the_service() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();
    let request = request();

    let (created, ()) = tokio::join!(
        controller.create_hidden_service(&request, true, &cancel),
        async {
            daemon.expect("SETEVENTS HS_DESC", "250 OK\r\n").await;
            daemon.expect(ADD_ONION_LINE, CREATED).await;
            daemon
                .send(concat!(
                    "650 HS_DESC UPLOAD abcdefghijklmnop UNKNOWN $AAAA desc1 HSDIR_INDEX=01\r\n",
                    "650 HS_DESC UPLOAD someoneelse UNKNOWN $CCCC desc9\r\n",
                    "650 HS_DESC UPLOAD abcdefghijklmnop UNKNOWN $BBBB desc1 HSDIR_INDEX=02\r\n",
                    "650 HS_DESC UPLOADED UNKNOWN UNKNOWN $AAAA\r\n",
                    "650 HS_DESC FAILED UNKNOWN UNKNOWN $BBBB REASON=UPLOAD_REJECTED\r\n",
                ))
                .await;
            daemon.expect("SETEVENTS", "250 OK\r\n").await;
        },
    );

    assert_eq!(
        created,
        Ok(HiddenService {
            service_id: "abcdefghijklmnop".to_owned(),
            private_key: Some("ED25519-V3:c2VjcmV0".to_owned()),
        })
    );
    assert!(controller.subscribed_kinds().is_empty());
}

#[tokio::test]
async fn every_upload_failing_is_a_publication_error() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();
    let request = request();

    let (created, ()) = tokio::join!(
        controller.create_hidden_service(&request, true, &cancel),
        async {
            daemon.expect("SETEVENTS HS_DESC", "250 OK\r\n").await;
            daemon.expect(ADD_ONION_LINE, CREATED).await;
            daemon
                .send(concat!(
                    "650 HS_DESC UPLOAD abcdefghijklmnop UNKNOWN $AAAA desc1\r\n",
                    "650 HS_DESC UPLOAD abcdefghijklmnop UNKNOWN $BBBB desc1\r\n",
                    "650 HS_DESC FAILED UNKNOWN UNKNOWN $AAAA REASON=UPLOAD_REJECTED\r\n",
                    "650 HS_DESC FAILED UNKNOWN UNKNOWN $BBBB REASON=UPLOAD_REJECTED\r\n",
                ))
                .await;
            daemon.expect("SETEVENTS", "250 OK\r\n").await;
        },
    );

    assert!(matches!(created, Err(AppError::Publication(_))));
}

#[tokio::test]
async fn without_waiting_no_subscription_is_made() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();
    let request = OnionRequest::new(OnionKey::New(KeyBlob::Best))
        .flag(OnionFlag::DiscardPk)
        .port(80);

    let (created, ()) = tokio::join!(
        controller.create_hidden_service(&request, false, &cancel),
        daemon.expect(
            "ADD_ONION NEW:BEST Flags=DiscardPK Port=80",
            "250-ServiceID=xyz\r\n250 OK\r\n",
        ),
    );

    let service = created.expect("service must be created");
    assert_eq!(service.onion_address(), "xyz.onion");
    assert_eq!(service.private_key, None);
}

#[tokio::test]
async fn rejected_request_unsubscribes() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();
    let request = request();

    let (created, ()) = tokio::join!(
        controller.create_hidden_service(&request, true, &cancel),
        async {
            daemon.expect("SETEVENTS HS_DESC", "250 OK\r\n").await;
            daemon
                .expect(ADD_ONION_LINE, "512 Bad argument to ADD_ONION\r\n")
                .await;
            daemon.expect("SETEVENTS", "250 OK\r\n").await;
        },
    );

    assert!(matches!(created, Err(AppError::Command { .. })));
    assert!(controller.subscribed_kinds().is_empty());
}

#[tokio::test]
async fn invalid_request_is_rejected_locally() {
    let (controller, mut daemon) = connect();
    let cancel = CancellationToken::new();
    let request = OnionRequest::new(OnionKey::New(KeyBlob::Best));

    let created = controller
        .create_hidden_service(&request, true, &cancel)
        .await;

    assert!(matches!(created, Err(AppError::Protocol(_))));
    assert!(daemon.command_within(Duration::from_millis(50)).await.is_none());
}

#[tokio::test]
async fn remove_strips_onion_suffix() {
    let (controller, mut daemon) = connect();

    let (removed, ()) = tokio::join!(
        controller.remove_hidden_service("xyz.onion"),
        daemon.expect("DEL_ONION xyz", "250 OK\r\n"),
    );

    assert!(removed.is_ok());
}
