//! Unit tests for the context serializer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::graph::{Module, ModuleKind, Package, PluginCapability, Project, ProjectTarget};
use crate::tools::{ResolvedTool, ToolOrigin};

use super::*;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[test]
fn paths_share_prefixes() {
    let mut serializer = ContextSerializer::new();
    let first = serializer
        .serialise_path(Path::new("/pkg/Sources/app/main.mason"))
        .expect("first path");
    let second = serializer
        .serialise_path(Path::new("/pkg/Sources/app/util.mason"))
        .expect("second path");
    assert_ne!(first, second);

    let input = serializer
        .into_wire_input(Path::new("/work"), &[], &[], None, &BTreeMap::new())
        .expect("wire input");

    // Root, pkg, Sources, app, two leaves, work: seven entries rather than
    // two full copies of the directory chain.
    assert_eq!(input.paths.len(), 7);
    assert_eq!(input.paths[first.0].base, input.paths[second.0].base);
}

#[test]
fn repeated_paths_reuse_ids() {
    let mut serializer = ContextSerializer::new();
    let first = serializer
        .serialise_path(Path::new("/pkg/Sources"))
        .expect("path");
    let second = serializer
        .serialise_path(Path::new("/pkg/Sources"))
        .expect("same path");
    assert_eq!(first, second);
}

#[test]
fn relative_paths_are_rejected() {
    let mut serializer = ContextSerializer::new();
    let err = serializer
        .serialise_path(Path::new("Sources/app"))
        .expect_err("relative path");
    assert!(err.to_string().contains("not absolute"));
}

// ---------------------------------------------------------------------------
// Modules and packages
// ---------------------------------------------------------------------------

#[test]
fn library_and_executable_modules_serialise() {
    let mut serializer = ContextSerializer::new();
    let library = Module::new("core", ModuleKind::Library, "/pkg/Sources/core")
        .with_source_files(vec![PathBuf::from("/pkg/Sources/core/lib.mason")]);
    let id = serializer
        .serialise_module(&library)
        .expect("serialise")
        .expect("library is representable");
    assert_eq!(id, TargetId(0));
}

#[test]
fn plugin_and_binary_modules_are_not_representable() {
    let mut serializer = ContextSerializer::new();
    let plugin = Module::new(
        "generator",
        ModuleKind::Plugin(PluginCapability::Command),
        "/pkg/Plugins/generator",
    );
    let binary = Module::new(
        "bundle",
        ModuleKind::Binary {
            executables: vec![],
        },
        "/pkg/Binaries",
    );
    assert!(serializer.serialise_module(&plugin).expect("plugin").is_none());
    assert!(serializer.serialise_module(&binary).expect("binary").is_none());
}

#[test]
fn package_serialises_modules_and_products() {
    let core = Module::new("core", ModuleKind::Library, "/pkg/Sources/core");
    let app = Module::new("app", ModuleKind::Executable, "/pkg/Sources/app");
    let package = Package::new(
        "demo",
        "/pkg",
        vec![core, app],
        vec![crate::graph::Product::new("app-product", vec!["app".into()])],
    );

    let mut serializer = ContextSerializer::new();
    let package_id = serializer.serialise_package(&package).expect("package");
    let again = serializer.serialise_package(&package).expect("dedup");
    assert_eq!(package_id, again);

    let input = serializer
        .into_wire_input(Path::new("/work"), &[], &[], None, &BTreeMap::new())
        .expect("wire input");
    assert_eq!(input.packages.len(), 1);
    assert_eq!(input.packages[0].targets.len(), 2);
    assert_eq!(input.products.len(), 1);
    assert_eq!(input.products[0].name, "app-product");
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[test]
fn project_targets_reference_their_project() {
    let project = Project::new(
        "ide-project",
        "/proj",
        vec![ProjectTarget::new("app"), ProjectTarget::new("tests")],
    );

    let mut serializer = ContextSerializer::new();
    let target_id = serializer
        .serialise_project_target(&project, "tests")
        .expect("serialise")
        .expect("known target");

    let input = serializer
        .into_wire_input(Path::new("/work"), &[], &[], None, &BTreeMap::new())
        .expect("wire input");
    assert_eq!(input.projects.len(), 1);
    assert_eq!(input.projects[0].targets.len(), 2);
    assert_eq!(input.project_targets[target_id.0].name, "tests");
    assert_eq!(input.project_targets[target_id.0].project, ProjectId(0));
}

#[test]
fn unknown_project_target_yields_none() {
    let project = Project::new("ide-project", "/proj", vec![ProjectTarget::new("app")]);
    let mut serializer = ContextSerializer::new();
    let id = serializer
        .serialise_project_target(&project, "nonexistent")
        .expect("serialise");
    assert!(id.is_none());
}

// ---------------------------------------------------------------------------
// Snapshot assembly
// ---------------------------------------------------------------------------

#[test]
fn snapshot_serialises_session_paths_and_tools() {
    let mut tools = BTreeMap::new();
    let _ = tools.insert(
        "gen".to_owned(),
        ResolvedTool::new(PathBuf::from("/build/debug/gen"), None, ToolOrigin::Built),
    );
    let _ = tools.insert(
        "protoc".to_owned(),
        ResolvedTool::new(
            PathBuf::from("/artifacts/protoc"),
            Some(vec!["x86_64-unknown-linux-gnu".into()]),
            ToolOrigin::Vended,
        ),
    );

    let serializer = ContextSerializer::new();
    let input = serializer
        .into_wire_input(
            Path::new("/work/plugin"),
            &[PathBuf::from("/build/debug")],
            &[PathBuf::from("/usr/lib/pkgconfig")],
            Some(Path::new("/opt/sdk")),
            &tools,
        )
        .expect("wire input");

    assert_eq!(input.tool_search_directories.len(), 1);
    assert_eq!(input.pkg_config_search_directories.len(), 1);
    assert!(input.sdk_root.is_some());
    assert_eq!(input.accessible_tools.len(), 2);

    let gen = &input.accessible_tools["gen"];
    assert!(gen.triples.is_none());
    let protoc = &input.accessible_tools["protoc"];
    assert_eq!(
        protoc.triples.as_deref(),
        Some(&["x86_64-unknown-linux-gnu".to_owned()][..])
    );

    // Every id referenced by the snapshot resolves in the path table.
    let resolve = |id: PathId| &input.paths[id.0];
    let _ = resolve(input.plugin_work_directory);
    for id in &input.tool_search_directories {
        let _ = resolve(*id);
    }
    for tool in input.accessible_tools.values() {
        let _ = resolve(tool.path);
    }
}
