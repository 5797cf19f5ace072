use super::*;

#[test]
fn test_forge_api_display_includes_status_and_body() {
    let err = Error::forge_api(422, r#"{"message":"Validation Failed"}"#);
    let message = err.to_string();
    assert!(message.contains("422"));
    assert!(message.contains("Validation Failed"));
}

#[test]
fn test_core_errors_pass_through_transparently() {
    let core_err = gh_app_auth_core::Error::no_match("github.com/x/y");
    let expected = core_err.to_string();
    let err: Error = core_err.into();
    assert_eq!(err.to_string(), expected);
    assert!(err.is_pass_through());
}

#[test]
fn test_forge_errors_never_pass_through() {
    assert!(!Error::forge_api(500, "boom").is_pass_through());
    assert!(!Error::invalid_key_format("bad PEM").is_pass_through());
    assert!(!Error::jwt("encode failed").is_pass_through());
}
