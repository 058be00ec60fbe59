//! Unit tests for grant resolution and launch preflight.
//!
//! Actually entering the sandbox needs namespace privileges that are not
//! guaranteed in every test environment, so these tests stop at the grant
//! and validation layer.

use std::path::PathBuf;

use tempfile::tempdir;

use super::*;
use crate::policy::SandboxPolicy;

#[test]
fn relative_program_is_rejected() {
    let sandbox = Sandbox::new(SandboxPolicy::new());
    let command = SandboxCommand::new("plugin");
    let err = sandbox.spawn(command).expect_err("relative path");
    assert!(matches!(err, SandboxError::RelativeProgramPath { .. }));
}

#[test]
fn missing_program_is_a_program_grant_failure() {
    let sandbox = Sandbox::new(SandboxPolicy::new());
    let command = SandboxCommand::new("/nonexistent/mason-plugin");
    let err = sandbox.spawn(command).expect_err("missing program");
    let SandboxError::GrantUnavailable { grant, path, .. } = err else {
        panic!("expected GrantUnavailable, got {err}");
    };
    assert_eq!(grant, PolicyGrant::Program);
    assert_eq!(path, PathBuf::from("/nonexistent/mason-plugin"));
}

#[test]
fn missing_writable_directory_fails_the_launch() {
    let dir = tempdir().expect("create tempdir");
    let program = dir.path().join("plugin");
    std::fs::write(&program, b"#!/bin/sh\n").expect("write program");

    let policy = SandboxPolicy::new().allow_writable_directory("/nonexistent/output");
    let err = Sandbox::new(policy)
        .spawn(SandboxCommand::new(&program))
        .expect_err("missing writable dir");
    let SandboxError::GrantUnavailable { grant, .. } = err else {
        panic!("expected GrantUnavailable, got {err}");
    };
    assert_eq!(grant, PolicyGrant::Writable);
}

#[test]
fn required_paths_report_the_grant_they_serve() {
    let err = required_paths(
        &[PathBuf::from("/nonexistent/tools")],
        PolicyGrant::ToolSearch,
    )
    .expect_err("missing tool dir");
    let SandboxError::GrantUnavailable { grant, .. } = err else {
        panic!("expected GrantUnavailable, got {err}");
    };
    assert_eq!(grant, PolicyGrant::ToolSearch);
}

#[test]
fn required_paths_resolve_and_deduplicate() {
    let dir = tempdir().expect("create tempdir");
    let resolved = required_paths(
        &[dir.path().to_path_buf(), dir.path().to_path_buf()],
        PolicyGrant::Writable,
    )
    .expect("existing dir resolves");
    assert_eq!(resolved.len(), 1);
}

#[test]
fn advisory_paths_skip_absent_roots() {
    let dir = tempdir().expect("create tempdir");
    let resolved = advisory_paths(&[
        dir.path().to_path_buf(),
        PathBuf::from("/nonexistent/sdk-root"),
    ]);
    assert_eq!(resolved.len(), 1, "only the existing root survives");
}
