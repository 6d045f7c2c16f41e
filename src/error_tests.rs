use super::*;

#[test]
fn code_mapping() {
    assert_eq!(AppError::invalid("k").code_str(), "INVALID_ARGUMENT");
    assert_eq!(AppError::not_found("k").code_str(), "NOT_FOUND");
    assert_eq!(AppError::conflict("k").code_str(), "CONFLICT");
    assert_eq!(AppError::storage("get_state", "disk").code_str(), "STORAGE_ERROR");
    assert_eq!(AppError::decode("k", "bad json").code_str(), "DECODE_ERROR");
    assert_eq!(AppError::query("{}", "bad").code_str(), "QUERY_ERROR");
    assert_eq!(AppError::identity("no cert").code_str(), "IDENTITY_ERROR");
    assert_eq!(AppError::Authentication("x".into()).code_str(), "UNAUTHENTICATED");
    assert_eq!(AppError::Authorization("x".into()).code_str(), "PERMISSION_DENIED");
    assert_eq!(AppError::internal("rng").code_str(), "INTERNAL_ERROR");
}

#[test]
fn query_error_keeps_selector_text() {
    let err = AppError::from(StoreError::MalformedSelector {
        selector: "{\"selector\":1}".into(),
        reason: "selector must be an object".into(),
    });
    match &err {
        AppError::Query { selector, .. } => assert_eq!(selector, "{\"selector\":1}"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.to_string().contains("{\"selector\":1}"));
}

#[test]
fn security_boundary_conversion() {
    let e = AppError::storage("get_query_result", "backend down").into_authentication();
    assert!(matches!(e, AppError::Authentication(_)));

    let e = AppError::identity("missing creator").into_authorization();
    assert!(matches!(e, AppError::Authorization(_)));

    // decode failures are not folded into "invalid credentials"
    let e = AppError::decode("alice", "expected string").into_authentication();
    assert!(matches!(e, AppError::Decode { .. }));

    let e = AppError::internal("entropy source unavailable").into_authorization();
    assert!(matches!(e, AppError::Internal(_)));
}

#[test]
fn response_json_shape() {
    let body: serde_json::Value = serde_json::from_str(&AppError::not_found("user 'bob'").to_response_json()).unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "not found: user 'bob'");
}
