//! Error display and classification.

use torino::protocol::reply::ReplyCode;
use torino::AppError;

#[test]
fn display_prefixes_the_category() {
    assert_eq!(
        AppError::Format("bad line".into()).to_string(),
        "format: bad line"
    );
    assert_eq!(
        AppError::Command {
            code: ReplyCode::UnrecognizedEntity,
            message: "Unrecognized key \"x\"".into(),
        }
        .to_string(),
        "command: 552 Unrecognized key \"x\""
    );
    assert_eq!(
        AppError::Cancelled.to_string(),
        "cancelled: wait aborted by caller"
    );
}

#[test]
fn only_transport_failures_are_fatal() {
    assert!(AppError::Format("x".into()).is_fatal());
    assert!(AppError::ConnectionClosed("x".into()).is_fatal());
    assert!(AppError::Io("x".into()).is_fatal());
    assert!(!AppError::Protocol("x".into()).is_fatal());
    assert!(!AppError::Cancelled.is_fatal());
    assert!(!AppError::Timeout("no reply within 5s".into()).is_fatal());
    assert!(!AppError::Unresolved("x".into()).is_fatal());
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();

    assert_eq!(err, AppError::Io("pipe closed".into()));
}

#[test]
fn reply_codes_round_trip() {
    for value in [250_u16, 251, 451, 500, 510, 515, 552, 555, 650] {
        let code = ReplyCode::from_u16(value).expect("known code");
        assert_eq!(code.as_u16(), value);
        assert_eq!(value.to_string().parse::<ReplyCode>(), Ok(code));
    }
    assert!(ReplyCode::from_u16(299).is_none());
    assert!(ReplyCode::Ok.is_success());
    assert!(ReplyCode::UnnecessaryOperation.is_success());
    assert!(!ReplyCode::UnrecognizedEntity.is_success());
}
