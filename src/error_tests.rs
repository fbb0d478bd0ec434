use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::unauthenticated("no").http_status(), 401);
    assert_eq!(AppError::session_expired("gone").http_status(), 401);
    assert_eq!(AppError::invalid_credential("bad").http_status(), 401);
    assert_eq!(AppError::forbidden("role").http_status(), 403);
    assert_eq!(AppError::invalid_code("mismatch").http_status(), 400);
    assert_eq!(AppError::throttled(12, "tok").http_status(), 429);
    assert_eq!(AppError::already_activated("dup").http_status(), 409);
    assert_eq!(AppError::duplicate_email("dup").http_status(), 409);
    assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::io("io", "io").http_status(), 503);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn serialized_type_tag_matches_kind() {
    let errors = vec![
        AppError::unauthenticated("a"),
        AppError::session_expired("b"),
        AppError::forbidden("c"),
        AppError::throttled(3, "t"),
        AppError::duplicate_email("d"),
        AppError::internal("x", "y"),
    ];
    for e in errors {
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], e.kind());
    }
}

#[test]
fn throttled_carries_wait_and_token() {
    let e = AppError::throttled(42, "activation.jwt");
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v["remaining_seconds"], 42);
    assert_eq!(v["activation_token"], "activation.jwt");
    assert!(e.message().contains("42"));
}

#[test]
fn plumbing_errors_are_server_faults() {
    let e: AppError = anyhow::anyhow!("disk on fire").into();
    assert!(e.is_server_fault());
    assert_eq!(e.http_status(), 500);
    let e: AppError = std::io::Error::new(std::io::ErrorKind::Other, "nope").into();
    assert!(e.is_server_fault());
    assert_eq!(e.http_status(), 503);
    assert!(!AppError::forbidden("x").is_server_fault());
}
