//! Classification of wire-level event text.

use torino::events::classify;
use torino::events::payload::{
    HsDescAction, HsDescAuthType, OrConnStatus, StatusSeverity, StreamStatus,
};
use torino::protocol::reader::ReplyReader;
use torino::protocol::reply::Response;
use torino::{AppError, Event, EventKind, EventPayload};

async fn read(raw: &'static str) -> Response {
    ReplyReader::new(raw.as_bytes())
        .receive()
        .await
        .expect("wire text must form a response")
}

async fn event(raw: &'static str) -> Event {
    classify(&read(raw).await).expect("event must classify")
}

#[tokio::test]
async fn classification_is_repeatable() {
    let response = read("650 CIRC 3 EXTENDED $A~a PURPOSE=HS_CLIENT_REND\r\n").await;

    let once = classify(&response).expect("first");
    let twice = classify(&response).expect("second");

    assert_eq!(once, twice);
    assert_eq!(once.response(), &response);
}

#[tokio::test]
async fn stream_event_fields() {
    let ev = event("650 STREAM 14 SUCCEEDED 7 example.com:443 PURPOSE=USER\r\n").await;

    let EventPayload::Stream(stream) = ev.payload() else {
        panic!("unexpected payload {:?}", ev.payload());
    };
    assert_eq!(stream.id, "14");
    assert_eq!(stream.status, StreamStatus::Succeeded);
    assert_eq!(stream.circuit_id, "7");
    assert_eq!(stream.target, "example.com:443");
    assert_eq!(stream.purpose.as_deref(), Some("USER"));
    assert_eq!(stream.reason, None);
}

#[tokio::test]
async fn or_conn_event_fields() {
    let ev = event("650 ORCONN $AAAA~relay CLOSED REASON=DONE NCIRCS=3\r\n").await;

    let EventPayload::OrConn(conn) = ev.payload() else {
        panic!("unexpected payload {:?}", ev.payload());
    };
    assert_eq!(conn.target, "$AAAA~relay");
    assert_eq!(conn.status, OrConnStatus::Closed);
    assert_eq!(conn.reason.as_deref(), Some("DONE"));
    assert_eq!(conn.circuit_count, Some(3));
}

#[tokio::test]
async fn hs_desc_failure_with_unknown_address() {
    let ev = event("650 HS_DESC FAILED UNKNOWN UNKNOWN $BBBB~dir REASON=UPLOAD_REJECTED\r\n").await;

    let EventPayload::HsDesc(desc) = ev.payload() else {
        panic!("unexpected payload {:?}", ev.payload());
    };
    assert_eq!(desc.action, HsDescAction::Failed);
    assert_eq!(desc.auth_type, HsDescAuthType::Unknown);
    assert_eq!(desc.directory, "$BBBB~dir");
    assert_eq!(desc.descriptor_id, None);
    assert_eq!(desc.reason.as_deref(), Some("UPLOAD_REJECTED"));
}

#[tokio::test]
async fn addrmap_with_expiry_and_cache_flag() {
    let ev = event(
        "650 ADDRMAP example.com 93.184.216.34 \"2026-10-19 12:00:00\" EXPIRES=\"2026-10-19 10:00:00\" CACHED=\"YES\"\r\n",
    )
    .await;

    let EventPayload::AddrMap(map) = ev.payload() else {
        panic!("unexpected payload {:?}", ev.payload());
    };
    assert_eq!(map.address, "example.com");
    assert_eq!(map.new_address, "93.184.216.34");
    assert!(!map.is_error());
    assert_eq!(
        map.expiry.map(|t| t.to_string()).as_deref(),
        Some("2026-10-19 12:00:00")
    );
    assert_eq!(
        map.utc_expiry.map(|t| t.to_string()).as_deref(),
        Some("2026-10-19 10:00:00")
    );
    assert_eq!(map.cached, Some(true));
}

#[tokio::test]
async fn status_event_keeps_arguments() {
    let ev = event("650 STATUS_CLIENT NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY=\"Done\"\r\n").await;

    assert_eq!(ev.kind(), EventKind::StatusClient);
    let EventPayload::Status(status) = ev.payload() else {
        panic!("unexpected payload {:?}", ev.payload());
    };
    assert_eq!(status.severity, StatusSeverity::Notice);
    assert_eq!(status.action, "BOOTSTRAP");
    assert_eq!(status.arguments, "PROGRESS=100 TAG=done SUMMARY=\"Done\"");
    assert_eq!(ev.get("PROGRESS"), "100");
}

#[tokio::test]
async fn log_event_keeps_message_text() {
    let ev = event("650 WARN Something   odd happened\r\n").await;

    assert_eq!(
        ev.payload(),
        &EventPayload::Log(torino::events::payload::LogMessage {
            message: "Something   odd happened".to_owned()
        })
    );
}

#[tokio::test]
async fn network_liveness_and_signal() {
    let down = event("650 NETWORK_LIVENESS DOWN\r\n").await;
    assert_eq!(down.payload(), &EventPayload::NetworkLiveness { up: false });

    let signal = event("650 SIGNAL NEWNYM\r\n").await;
    assert_eq!(
        signal.payload(),
        &EventPayload::Signal {
            name: "NEWNYM".to_owned()
        }
    );
}

#[tokio::test]
async fn multi_line_conf_changed() {
    let ev = event("650-CONF_CHANGED\r\n650-SocksPort=9150\r\n650-ExitPolicy\r\n650 OK\r\n").await;

    let EventPayload::ConfChanged(changed) = ev.payload() else {
        panic!("unexpected payload {:?}", ev.payload());
    };
    assert_eq!(
        changed.changes,
        vec![
            ("SocksPort".to_owned(), Some("9150".to_owned())),
            ("ExitPolicy".to_owned(), None),
        ]
    );
}

#[tokio::test]
async fn malformed_known_kind_is_a_protocol_error() {
    let response = read("650 BW lots none\r\n").await;

    assert!(matches!(classify(&response), Err(AppError::Protocol(_))));
}

#[tokio::test]
async fn events_serialize_with_kind_and_payload_type() {
    let ev = event("650 BW 1024 2048\r\n").await;

    let json = serde_json::to_value(&ev).expect("serialize");

    assert_eq!(
        json,
        serde_json::json!({
            "kind": "BW",
            "payload": { "type": "bandwidth", "read": 1024, "written": 2048 }
        })
    );
}
