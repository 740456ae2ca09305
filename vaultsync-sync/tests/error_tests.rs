use std::path::PathBuf;
use vaultsync_sync::{classify_message, ErrorClass, SyncError};

#[test]
fn transient_variants() {
    for err in [
        SyncError::Network("reset".into()),
        SyncError::Timeout("slow".into()),
        SyncError::RateLimited("429".into()),
        SyncError::Unavailable("503".into()),
    ] {
        assert_eq!(err.class(), ErrorClass::Transient, "{err}");
        assert!(err.is_retryable());
    }
}

#[test]
fn permanent_variants() {
    for err in [
        SyncError::Auth("expired".into()),
        SyncError::NotFound("vault".into()),
        SyncError::PermissionDenied("no".into()),
        SyncError::InvalidInput("bad".into()),
    ] {
        assert_eq!(err.class(), ErrorClass::Permanent, "{err}");
        assert!(!err.is_retryable());
    }
}

#[test]
fn local_variants() {
    let io = SyncError::io(
        "/tmp/.env",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    );
    let parse = SyncError::Parse {
        path: PathBuf::from(".env"),
        line: 3,
        message: "missing '='".into(),
    };
    let config = SyncError::Config("bad".into());
    let serde = SyncError::from(serde_json::from_str::<u32>("x").unwrap_err());

    for err in [io, parse, config, serde] {
        assert_eq!(err.class(), ErrorClass::Local, "{err}");
        assert!(!err.is_retryable());
    }
}

#[test]
fn remote_message_is_classified() {
    assert_eq!(
        SyncError::Remote("connection refused".into()).class(),
        ErrorClass::Transient
    );
    assert_eq!(
        SyncError::Remote("something odd".into()).class(),
        ErrorClass::Permanent
    );
}

#[test]
fn classify_messages() {
    assert_eq!(classify_message("request timed out"), ErrorClass::Transient);
    assert_eq!(classify_message("Too Many Requests"), ErrorClass::Transient);
    assert_eq!(classify_message("HTTP 503"), ErrorClass::Transient);
    assert_eq!(classify_message("dns error"), ErrorClass::Transient);
    assert_eq!(classify_message("401 Unauthorized"), ErrorClass::Permanent);
    assert_eq!(classify_message("item isn't an item"), ErrorClass::Permanent);
    assert_eq!(classify_message(""), ErrorClass::Permanent);
}

#[test]
fn permanent_marker_wins_over_transient() {
    assert_eq!(
        classify_message("connection closed: permission denied"),
        ErrorClass::Permanent
    );
}

#[test]
fn operation_label_keeps_class_and_source() {
    let err = SyncError::Unavailable("503".into()).in_operation("push Private/app");
    assert_eq!(err.class(), ErrorClass::Transient);
    assert_eq!(
        err.to_string(),
        "push Private/app failed: service unavailable: 503"
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn display_includes_path_and_line() {
    let io = SyncError::io(
        "/srv/.env",
        std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    );
    assert!(io.to_string().contains("/srv/.env"));

    let parse = SyncError::Parse {
        path: PathBuf::from("app.env"),
        line: 7,
        message: "missing '='".into(),
    };
    assert_eq!(
        parse.to_string(),
        "parse error in app.env line 7: missing '='"
    );
}

#[test]
fn type_errors_become_invalid_input() {
    let err: SyncError = vaultsync_types::Error::InvalidName("".into()).into();
    assert!(matches!(err, SyncError::InvalidInput(_)));
}

#[test]
fn every_failure_exits_with_two() {
    assert_eq!(SyncError::Config("x".into()).exit_code(), 2);
    assert_eq!(SyncError::Auth("x".into()).exit_code(), 2);
}
