//! Wire engine read cycles over in-memory byte streams.

use torino::protocol::reader::{ReplyReader, EMPTY_CONTENT, MALFORMED_BEGINNING};
use torino::protocol::reply::{Divider, ReplyCode};
use torino::AppError;

fn reader(input: &'static str) -> ReplyReader<&'static [u8]> {
    ReplyReader::new(input.as_bytes())
}

#[tokio::test]
async fn single_line_reply() {
    let mut r = reader("250 OK\r\n");

    let response = r.receive().await.expect("reply");

    assert_eq!(response.len(), 1);
    let entry = response.first();
    assert_eq!(entry.status(), ReplyCode::Ok);
    assert_eq!(entry.divider(), Divider::Space);
    assert_eq!(entry.content(), "OK");
}

#[tokio::test]
async fn data_block_lines_are_joined() {
    let mut r = reader("250+info/names=x\r\n250-AUTH METHODS=COOKIE\r\n.\r\n");

    let response = r.receive().await.expect("reply");

    assert_eq!(response.len(), 1);
    assert_eq!(response.first().divider(), Divider::Plus);
    assert_eq!(
        response.first().content(),
        "info/names=x\n250-AUTH METHODS=COOKIE"
    );
}

#[tokio::test]
async fn dash_lines_accumulate_until_space_line() {
    let mut r = reader("250-version=0.4.8.10\r\n250-process/pid=42\r\n250 OK\r\n");

    let response = r.receive().await.expect("reply");

    let contents: Vec<&str> = response.iter().map(|e| e.content()).collect();
    assert_eq!(contents, vec!["version=0.4.8.10", "process/pid=42", "OK"]);
    assert!(response.is_complete());
}

#[tokio::test]
async fn plus_line_after_dash_lines_closes_the_cycle() {
    let mut r = reader("250-a=1\r\n250+b=\r\nline\r\n.\r\n250 OK\r\n");

    let first = r.receive().await.expect("first cycle");
    assert_eq!(first.len(), 2);
    assert_eq!(first[1].content(), "b=\nline");
    assert!(!first.is_complete());

    let second = r.receive().await.expect("closing line");
    assert_eq!(second.first().content(), "OK");
}

#[tokio::test]
async fn empty_lines_inside_data_block_are_data() {
    let mut r = reader("250+config-text=\r\nA\r\n\r\nB\r\n.\r\n");

    let response = r.receive().await.expect("reply");

    assert_eq!(response.first().content(), "config-text=\nA\n\nB");
}

#[tokio::test]
async fn bare_line_feeds_are_accepted() {
    let mut r = reader("650 BW 1 2\n250 OK\n");

    let event = r.receive().await.expect("event");
    assert!(event.is_async());
    assert_eq!(event.first().get("@2"), "2");
    assert!(r.receive().await.expect("reply").is_ok());
}

#[tokio::test]
async fn responses_are_read_in_order() {
    let mut r = reader("650 BW 1 2\r\n250 OK\r\n650 CIRC 1 BUILT\r\n");

    assert!(r.receive().await.expect("first").is_async());
    assert!(r.receive().await.expect("second").is_ok());
    assert_eq!(r.receive().await.expect("third").first().get("@0"), "CIRC");
}

#[tokio::test]
async fn short_line_is_malformed() {
    let mut r = reader("20\r\n");

    assert_eq!(
        r.receive().await,
        Err(AppError::Format(MALFORMED_BEGINNING.into()))
    );
}

#[tokio::test]
async fn unknown_status_code_is_a_format_error() {
    let mut r = reader("299 Huh\r\n");

    assert!(matches!(r.receive().await, Err(AppError::Format(_))));
}

#[tokio::test]
async fn end_of_stream_is_empty_content() {
    let mut r = reader("");

    assert_eq!(r.receive().await, Err(AppError::Format(EMPTY_CONTENT.into())));
}

#[tokio::test]
async fn end_of_stream_inside_data_block_is_empty_content() {
    let mut r = reader("250+config-text=\r\nA\r\n");

    assert_eq!(r.receive().await, Err(AppError::Format(EMPTY_CONTENT.into())));
}

#[tokio::test]
async fn end_of_stream_inside_dash_run_is_empty_content() {
    let mut r = reader("250-a=1\r\n");

    assert_eq!(r.receive().await, Err(AppError::Format(EMPTY_CONTENT.into())));
}
