//! Integration tests for error handling

use argon_core::error::{ArgonError, ResultExt, TransportScope};

#[test]
fn test_error_context_chaining() {
    let base_error = ArgonError::stream_start("node 42 vanished");
    let with_context = base_error.with_context("Restarting capture");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Restarting capture"));
    assert!(msg.contains("node 42 vanished"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = ArgonError::pipewire("connection refused");
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Opening stream");
    assert_eq!(hint_before, with_context.user_hint());
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), ArgonError> = Err(ArgonError::portal("Connection failed"));
    let err = result.context("Querying shareable content").unwrap_err();

    assert!(err.to_string().contains("Querying shareable content"));
}

#[test]
fn test_user_hints() {
    let err = ArgonError::portal("test");
    assert!(err.user_hint().unwrap().contains("xdg-desktop-portal"));

    let err = ArgonError::pipewire("test");
    assert!(err.user_hint().unwrap().contains("PipeWire"));

    let err = ArgonError::config("test");
    assert!(err.user_hint().unwrap().contains("config.toml"));

    let err = ArgonError::permission_denied("test");
    assert!(err.user_hint().unwrap().contains("screen sharing"));

    assert!(ArgonError::invalid_state("test").user_hint().is_none());
}

#[test]
fn test_permission_denied_through_context() {
    let err = ArgonError::permission_denied("not authorized").with_context("Starting share");
    assert!(err.is_permission_denied());
    assert!(!ArgonError::portal("not authorized").is_permission_denied());
}

#[test]
fn test_transport_error_names_scope() {
    let err = ArgonError::transport(TransportScope::Subscriber, "stream lost");
    assert_eq!(err.to_string(), "Transport subscriber error: stream lost");

    match err {
        ArgonError::Transport { scope, message } => {
            assert_eq!(scope, TransportScope::Subscriber);
            assert_eq!(message, "stream lost");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: ArgonError = io.into();
    assert!(matches!(err, ArgonError::Io(_)));
}
