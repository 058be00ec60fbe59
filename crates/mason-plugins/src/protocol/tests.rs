//! Unit tests for the wire protocol types and codec.

use std::collections::BTreeMap;

use rstest::rstest;

use crate::graph::BuildConfiguration;

use super::*;

fn sample_configuration(version: u32) -> WireCommandConfiguration {
    WireCommandConfiguration {
        version,
        display_name: Some("generate".into()),
        executable: "/usr/bin/gen".into(),
        arguments: vec!["--input".into(), "/src/in".into()],
        environment: BTreeMap::new(),
        working_directory: None,
    }
}

fn sample_input() -> WireInput {
    let mut accessible_tools = BTreeMap::new();
    let _ = accessible_tools.insert(
        "gen".to_owned(),
        WireTool {
            path: PathId(2),
            triples: None,
        },
    );
    WireInput {
        paths: vec![
            WirePath {
                base: None,
                subpath: "/".into(),
            },
            WirePath {
                base: Some(PathId(0)),
                subpath: "pkg".into(),
            },
            WirePath {
                base: Some(PathId(1)),
                subpath: "gen".into(),
            },
        ],
        targets: vec![WireTarget {
            name: "app".into(),
            directory: PathId(1),
            source_files: vec![],
        }],
        products: vec![],
        packages: vec![WirePackage {
            identity: "demo".into(),
            display_name: "demo".into(),
            directory: PathId(1),
            targets: vec![TargetId(0)],
            products: vec![],
        }],
        projects: vec![],
        project_targets: vec![],
        plugin_work_directory: PathId(1),
        tool_search_directories: vec![],
        pkg_config_search_directories: vec![],
        sdk_root: None,
        accessible_tools,
    }
}

// ---------------------------------------------------------------------------
// Message tag shape
// ---------------------------------------------------------------------------

#[rstest]
#[case::emit_progress(
    PluginToHost::EmitProgress { message: "half way".into() },
    "emit_progress"
)]
#[case::emit_diagnostic(
    PluginToHost::EmitDiagnostic {
        severity: WireSeverity::Warning,
        message: "careful".into(),
        file: None,
        line: None,
    },
    "emit_diagnostic"
)]
#[case::symbol_graph_request(
    PluginToHost::SymbolGraphRequest {
        target: "app".into(),
        options: SymbolGraphOptions {
            minimum_access_level: SymbolAccessLevel::Public,
            include_synthesized: false,
            include_spi: false,
        },
    },
    "symbol_graph_request"
)]
fn plugin_messages_carry_the_kind_tag(#[case] message: PluginToHost, #[case] expected: &str) {
    let json = serde_json::to_value(&message).expect("serialise");
    assert_eq!(
        json.get("kind").and_then(serde_json::Value::as_str),
        Some(expected),
        "expected kind tag '{expected}' in {json}"
    );
}

#[test]
fn host_action_carries_context_and_ids() {
    let message = HostToPlugin::CreateBuildToolCommands {
        context: sample_input(),
        package: PackageId(0),
        target: TargetId(0),
        generated_sources: vec![],
        generated_resources: vec![],
    };
    let json = serde_json::to_value(&message).expect("serialise");
    assert_eq!(
        json.get("kind").and_then(serde_json::Value::as_str),
        Some("create_build_tool_commands")
    );
    assert_eq!(
        json.pointer("/context/plugin_work_directory")
            .and_then(serde_json::Value::as_u64),
        Some(1)
    );
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn host_message_round_trip() {
    let message = HostToPlugin::PerformCommand {
        context: sample_input(),
        package: PackageId(0),
        arguments: vec!["--verbose".into()],
    };
    let payload = encode(&message).expect("encode");
    let back: HostToPlugin = serde_json::from_slice(&payload).expect("deserialise");
    assert_eq!(back, message);
}

#[rstest]
#[case::diagnostic(PluginToHost::EmitDiagnostic {
    severity: WireSeverity::Error,
    message: "missing input".into(),
    file: Some("/src/in.txt".into()),
    line: Some(12),
})]
#[case::build_command(PluginToHost::DefineBuildCommand {
    configuration: sample_configuration(PLUGIN_API_VERSION),
    input_files: vec!["/src/in".into()],
    output_files: vec!["/out/gen.rs".into()],
})]
#[case::prebuild_command(PluginToHost::DefinePrebuildCommand {
    configuration: sample_configuration(PLUGIN_API_VERSION),
    output_files_directory: "/out/prebuild".into(),
})]
#[case::build_request(PluginToHost::BuildOperationRequest {
    subset: BuildSubset::Product { name: "tool".into() },
    parameters: BuildParameters {
        configuration: BuildConfiguration::Release,
        echo_logs: true,
    },
})]
#[case::test_request(PluginToHost::TestOperationRequest {
    subset: TestSubset::Filtered { patterns: vec!["Unit.*".into()] },
    parameters: TestParameters { enable_code_coverage: false },
})]
fn plugin_message_round_trip(#[case] message: PluginToHost) {
    let payload = serde_json::to_vec(&message).expect("serialise");
    let back = decode(&payload).expect("decode");
    assert_eq!(back, message);
}

/// Decoding then re-encoding a schema-valid frame yields the same JSON.
#[test]
fn decode_encode_is_lossless() {
    let valid = br#"{"kind":"emit_diagnostic","severity":"remark","message":"done"}"#;

    let decoded = decode(valid).expect("decode");
    let reencoded = serde_json::to_vec(&decoded).expect("encode");
    let original: serde_json::Value = serde_json::from_slice(valid).expect("parse original");
    let round_tripped: serde_json::Value =
        serde_json::from_slice(&reencoded).expect("parse reencoded");
    assert_eq!(round_tripped, original);
}

// ---------------------------------------------------------------------------
// Input snapshot
// ---------------------------------------------------------------------------

#[test]
fn wire_input_round_trip() {
    let input = sample_input();
    let json = serde_json::to_string(&input).expect("serialise");
    let back: WireInput = serde_json::from_str(&json).expect("deserialise");
    assert_eq!(back, input);
}

#[test]
fn optional_snapshot_fields_are_omitted_when_empty() {
    let input = sample_input();
    let json = serde_json::to_value(&input).expect("serialise");
    assert!(json.get("sdk_root").is_none());
    assert!(json.get("pkg_config_search_directories").is_none());
}

#[rstest]
#[case::error(WireSeverity::Error, "error")]
#[case::warning(WireSeverity::Warning, "warning")]
#[case::remark(WireSeverity::Remark, "remark")]
fn severity_serialises_snake_case(#[case] severity: WireSeverity, #[case] expected: &str) {
    let json = serde_json::to_string(&severity).expect("serialise");
    assert_eq!(json, format!("\"{expected}\""));
}

#[test]
fn unknown_message_tag_is_rejected() {
    let err = decode(br#"{"kind":"launch_missiles"}"#).expect_err("unknown tag");
    assert!(err.to_string().contains("launch_missiles") || err.is_data());
}
