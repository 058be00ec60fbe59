//! Unit tests for the plugin compiler cache.
//!
//! A small shell script stands in for the toolchain compiler: it records
//! each invocation and writes a dummy artifact to the `-o` path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{TempDir, tempdir};

use crate::fs::LocalFileSystem;

use super::*;

struct Fixture {
    _workspace: TempDir,
    compiler: PluginCompiler<LocalFileSystem>,
    plugin_root: PathBuf,
    invocation_log: PathBuf,
}

fn fixture() -> Fixture {
    let workspace = tempdir().expect("create workspace");
    let root = workspace.path();

    let invocation_log = root.join("invocations.log");
    let compiler_script = root.join("fake-compiler");
    let script = format!(
        "#!/bin/sh\n\
         echo run >> {log}\n\
         out=\"\"\n\
         prev=\"\"\n\
         for arg in \"$@\"; do\n\
         \x20 if [ \"$prev\" = \"-o\" ]; then out=\"$arg\"; fi\n\
         \x20 prev=\"$arg\"\n\
         done\n\
         printf artifact > \"$out\"\n",
        log = invocation_log.display()
    );
    write_executable(&compiler_script, &script);

    let plugin_root = root.join("plugin");
    std::fs::create_dir_all(&plugin_root).expect("create plugin root");
    std::fs::write(plugin_root.join("main.mason"), b"plugin body").expect("write source");

    let toolchain = ToolchainDescription::new(&compiler_script, "toolchain-1.0");
    let compiler = PluginCompiler::new(root.join("cache"), toolchain, Arc::new(LocalFileSystem));
    Fixture {
        _workspace: workspace,
        compiler,
        plugin_root,
        invocation_log,
    }
}

fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, contents).expect("write script");
    let mut permissions = std::fs::metadata(path).expect("stat script").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions).expect("mark executable");
}

fn request_for(fixture: &Fixture) -> CompileRequest {
    CompileRequest::new(
        "generator",
        &fixture.plugin_root,
        vec![fixture.plugin_root.join("main.mason")],
        "6.0",
    )
}

fn invocation_count(fixture: &Fixture) -> usize {
    std::fs::read_to_string(&fixture.invocation_log)
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Cache behaviour
// ---------------------------------------------------------------------------

#[test]
fn first_compile_runs_the_compiler() {
    let fixture = fixture();
    let mut started = 0;
    let result = fixture
        .compiler
        .compile(&request_for(&fixture), &mut || started += 1)
        .expect("compile");

    assert!(result.succeeded());
    assert!(!result.cache_hit());
    assert_eq!(started, 1);
    assert_eq!(invocation_count(&fixture), 1);
    assert!(result.executable().exists());
    assert!(
        result
            .executable()
            .to_string_lossy()
            .contains("generator-")
    );
}

#[test]
fn identical_request_hits_the_cache() {
    let fixture = fixture();
    let request = request_for(&fixture);
    let mut started = 0;

    let first = fixture
        .compiler
        .compile(&request, &mut || started += 1)
        .expect("first compile");
    let second = fixture
        .compiler
        .compile(&request, &mut || started += 1)
        .expect("second compile");

    assert!(second.cache_hit());
    assert!(second.succeeded());
    assert_eq!(second.executable(), first.executable());
    assert_eq!(started, 1, "cache hit must not signal a compile start");
    assert_eq!(invocation_count(&fixture), 1);
}

#[test]
fn changed_source_contents_miss_the_cache() {
    let fixture = fixture();
    let request = request_for(&fixture);
    let first = fixture
        .compiler
        .compile(&request, &mut || {})
        .expect("first compile");

    std::fs::write(fixture.plugin_root.join("main.mason"), b"edited body").expect("edit source");
    let second = fixture
        .compiler
        .compile(&request, &mut || {})
        .expect("second compile");

    assert!(!second.cache_hit());
    assert_ne!(second.executable(), first.executable());
    assert_eq!(invocation_count(&fixture), 2);
}

#[test]
fn changed_flags_and_tools_version_miss_the_cache() {
    let fixture = fixture();
    let base = request_for(&fixture);
    let flagged = request_for(&fixture).with_extra_flags(vec!["-O".into()]);
    let newer_tools = CompileRequest::new(
        "generator",
        &fixture.plugin_root,
        vec![fixture.plugin_root.join("main.mason")],
        "6.1",
    );

    let a = fixture.compiler.compile(&base, &mut || {}).expect("base");
    let b = fixture.compiler.compile(&flagged, &mut || {}).expect("flagged");
    let c = fixture
        .compiler
        .compile(&newer_tools, &mut || {})
        .expect("newer tools");

    assert_ne!(a.executable(), b.executable());
    assert_ne!(a.executable(), c.executable());
    assert_eq!(invocation_count(&fixture), 3);
}

#[test]
fn concurrent_identical_requests_compile_once() {
    let fixture = Arc::new(fixture());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let fixture = Arc::clone(&fixture);
        handles.push(std::thread::spawn(move || {
            fixture
                .compiler
                .compile(&request_for(&fixture), &mut || {})
                .expect("compile")
        }));
    }
    for handle in handles {
        let result = handle.join().expect("join");
        assert!(result.succeeded());
    }
    assert_eq!(invocation_count(&fixture), 1);
}

// ---------------------------------------------------------------------------
// Failure reporting
// ---------------------------------------------------------------------------

#[test]
fn failing_compiler_reports_output_without_erroring() {
    let workspace = tempdir().expect("create workspace");
    let root = workspace.path();
    let compiler_script = root.join("broken-compiler");
    write_executable(&compiler_script, "#!/bin/sh\necho boom >&2\nexit 1\n");

    let plugin_root = root.join("plugin");
    std::fs::create_dir_all(&plugin_root).expect("create plugin root");
    std::fs::write(plugin_root.join("main.mason"), b"body").expect("write source");

    let compiler = PluginCompiler::new(
        root.join("cache"),
        ToolchainDescription::new(&compiler_script, "toolchain-1.0"),
        Arc::new(LocalFileSystem),
    );
    let request = CompileRequest::new(
        "generator",
        &plugin_root,
        vec![plugin_root.join("main.mason")],
        "6.0",
    );

    let result = compiler.compile(&request, &mut || {}).expect("compile runs");
    assert!(!result.succeeded());
    assert!(!result.cache_hit());
    assert!(result.output().contains("boom"));
    assert!(result.command_line().iter().any(|arg| arg == "-o"));
}

#[test]
fn missing_source_is_a_fingerprint_error() {
    let fixture = fixture();
    let request = CompileRequest::new(
        "generator",
        &fixture.plugin_root,
        vec![fixture.plugin_root.join("nonexistent.mason")],
        "6.0",
    );
    let err = fixture
        .compiler
        .compile(&request, &mut || {})
        .expect_err("missing source");
    assert!(matches!(err, CompileError::SourceRead { .. }));
}
