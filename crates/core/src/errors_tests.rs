use super::*;

#[test]
fn test_invalid_url_display() {
    let err = Error::invalid_url("git@", "missing path separator");
    assert_eq!(err.to_string(), "Invalid URL 'git@': missing path separator");
}

#[test]
fn test_key_file_permissions_display_mentions_chmod() {
    let err = Error::key_file_permissions("/home/user/key.pem", 0o644);
    let message = err.to_string();
    assert!(message.contains("644"));
    assert!(message.contains("chmod 600"));
}

#[test]
fn test_keyring_timeout_display() {
    let err = Error::keyring_timeout("get", 3);
    assert_eq!(err.to_string(), "keyring get timed out after 3s");
}

#[test]
fn test_pass_through_classification() {
    assert!(Error::no_match("github.com/x/y").is_pass_through());
    assert!(Error::not_found("my-app", "private_key").is_pass_through());

    assert!(!Error::invalid_config("bad").is_pass_through());
    assert!(!Error::keyring_timeout("get", 3).is_pass_through());
    assert!(!Error::key_file_permissions("k.pem", 0o644).is_pass_through());
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io { .. }));
}
