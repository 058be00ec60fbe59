//! Unit tests for error display formatting.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::*;

#[test]
fn package_not_found_names_the_plugin() {
    let err = InvocationError::PackageNotFound {
        plugin: "generator".into(),
    };
    assert!(err.to_string().contains("generator"));
}

#[test]
fn output_directory_creation_names_the_path() {
    let err = InvocationError::OutputDirectoryCreation {
        path: PathBuf::from("/build/plugin-out"),
        source: Arc::new(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
    };
    let rendered = err.to_string();
    assert!(rendered.contains("/build/plugin-out"));
    assert!(rendered.contains("denied"));
}

#[test]
fn incompatible_version_reports_both_versions() {
    let err = InvocationError::IncompatibleApiVersion {
        expected: 2,
        actual: 1,
    };
    let rendered = err.to_string();
    assert!(rendered.contains('2'));
    assert!(rendered.contains('1'));
}

#[test]
fn message_decoding_preserves_the_frame() {
    let source = serde_json::from_slice::<serde_json::Value>(b"not json")
        .expect_err("invalid json should fail");
    let err = InvocationError::MessageDecoding {
        frame: b"not json".to_vec(),
        source: Arc::new(source),
    };
    let InvocationError::MessageDecoding { frame, .. } = &err else {
        panic!("expected MessageDecoding");
    };
    assert_eq!(frame, b"not json");
}
