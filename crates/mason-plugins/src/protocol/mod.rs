//! Wire protocol between the host and a running plugin.
//!
//! Messages are JSON payloads exchanged over the plugin's standard streams:
//! host-to-plugin frames on stdin, plugin-to-host frames on stdout, with
//! free-form output on stderr. Each payload is internally tagged with a
//! `kind` discriminator so either side can dispatch without peeking at
//! surrounding state. Framing is supplied by [`frame`]; the codec itself is
//! pure and performs no I/O.
//!
//! The context snapshot ([`WireInput`]) flattens the package graph into
//! dense id-keyed tables. This keeps the payload acyclic and bounded, and
//! lets the plugin resolve references without walking pointers. Ids are
//! indices into the snapshot's backing vectors and are only meaningful
//! within a single session.
//!
//! The `version` field carried by command configurations is an ABI
//! boundary: the host accepts exactly [`PLUGIN_API_VERSION`], and bumps
//! require coordinated plugin-side changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod frame;

/// Command configuration version the host understands.
pub const PLUGIN_API_VERSION: u32 = 2;

macro_rules! wire_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub usize);
    };
}

wire_id!(
    /// Index into [`WireInput::paths`].
    PathId
);
wire_id!(
    /// Index into [`WireInput::targets`].
    TargetId
);
wire_id!(
    /// Index into [`WireInput::products`].
    ProductId
);
wire_id!(
    /// Index into [`WireInput::packages`].
    PackageId
);
wire_id!(
    /// Index into [`WireInput::projects`].
    ProjectId
);
wire_id!(
    /// Index into [`WireInput::project_targets`].
    ProjectTargetId
);

/// One component of a serialised path.
///
/// Paths share prefixes: a path is its final component plus the id of its
/// parent, so deep trees serialise each directory once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePath {
    /// Parent path id; `None` for a filesystem root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<PathId>,
    /// Final path component, or the root itself when `base` is `None`.
    pub subpath: String,
}

/// A module flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTarget {
    /// Module name.
    pub name: String,
    /// Module root directory.
    pub directory: PathId,
    /// Source files belonging to the module.
    pub source_files: Vec<PathId>,
}

/// A product flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProduct {
    /// Product name.
    pub name: String,
    /// Modules composing the product.
    pub targets: Vec<TargetId>,
}

/// A package flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePackage {
    /// Package identity.
    pub identity: String,
    /// User-facing name.
    pub display_name: String,
    /// Package root directory.
    pub directory: PathId,
    /// Modules owned by the package.
    pub targets: Vec<TargetId>,
    /// Products exported by the package.
    pub products: Vec<ProductId>,
}

/// An IDE-style project flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProject {
    /// Project name.
    pub name: String,
    /// Project root directory.
    pub directory: PathId,
    /// Targets owned by the project.
    pub targets: Vec<ProjectTargetId>,
}

/// A project target flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProjectTarget {
    /// Target name.
    pub name: String,
    /// Owning project.
    pub project: ProjectId,
}

/// An accessible tool restated with serialised path ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTool {
    /// Resolved absolute path of the tool.
    pub path: PathId,
    /// Triples the tool supports; `None` for built tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triples: Option<Vec<String>>,
}

/// The flattened context snapshot sent once at session start.
///
/// Every id referenced by the enclosing action message resolves in one of
/// these tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireInput {
    /// Path table.
    pub paths: Vec<WirePath>,
    /// Module table.
    pub targets: Vec<WireTarget>,
    /// Product table.
    pub products: Vec<WireProduct>,
    /// Package table.
    pub packages: Vec<WirePackage>,
    /// Project table.
    pub projects: Vec<WireProject>,
    /// Project target table.
    pub project_targets: Vec<WireProjectTarget>,
    /// The plugin's work directory.
    pub plugin_work_directory: PathId,
    /// Directories searched for helper tools.
    pub tool_search_directories: Vec<PathId>,
    /// Directories searched for pkg-config files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pkg_config_search_directories: Vec<PathId>,
    /// SDK root, when one is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_root: Option<PathId>,
    /// Tools the plugin may invoke, keyed by name.
    pub accessible_tools: BTreeMap<String, WireTool>,
}

/// Severity attached to a plugin diagnostic on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireSeverity {
    /// A failure the user must address.
    Error,
    /// A non-fatal problem.
    Warning,
    /// An informational remark.
    Remark,
}

/// Command configuration shared by build and prebuild command definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCommandConfiguration {
    /// Configuration schema version; must equal [`PLUGIN_API_VERSION`].
    pub version: u32,
    /// User-facing description of the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Absolute path of the executable to run.
    pub executable: String,
    /// Arguments passed to the executable.
    pub arguments: Vec<String>,
    /// Environment for the command.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Working directory for the command, when one is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

/// Which part of the package a requested build covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subset", rename_all = "snake_case")]
pub enum BuildSubset {
    /// Everything in the package.
    All {
        /// Whether test modules are included.
        include_tests: bool,
    },
    /// A single product.
    Product {
        /// Product name.
        name: String,
    },
    /// A single module.
    Target {
        /// Module name.
        name: String,
    },
}

/// Parameters for a plugin-requested build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Configuration to build with.
    pub configuration: crate::graph::BuildConfiguration,
    /// Whether build log output is echoed while the build runs.
    #[serde(default)]
    pub echo_logs: bool,
}

/// Kind of artifact produced by a plugin-requested build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltArtifactKind {
    /// An executable.
    Executable,
    /// A dynamic library.
    DynamicLibrary,
    /// A static library.
    StaticLibrary,
}

/// One artifact produced by a plugin-requested build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltArtifact {
    /// Absolute path of the artifact.
    pub path: String,
    /// Artifact kind.
    pub kind: BuiltArtifactKind,
}

/// Outcome of a plugin-requested build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOperationResult {
    /// Whether the build succeeded.
    pub succeeded: bool,
    /// Captured build log.
    pub log_text: String,
    /// Artifacts produced by the build.
    #[serde(default)]
    pub built_artifacts: Vec<BuiltArtifact>,
}

/// Which tests a requested test run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subset", rename_all = "snake_case")]
pub enum TestSubset {
    /// Every test in the package.
    All,
    /// Tests whose identifiers match one of the patterns.
    Filtered {
        /// Test-identifier patterns.
        patterns: Vec<String>,
    },
}

/// Parameters for a plugin-requested test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestParameters {
    /// Whether code coverage data is collected.
    #[serde(default)]
    pub enable_code_coverage: bool,
}

/// Outcome of a plugin-requested test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOperationResult {
    /// Whether every test passed.
    pub succeeded: bool,
    /// Coverage data file, when coverage was collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_coverage_data_file: Option<String>,
}

/// Minimum access level included in a symbol graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolAccessLevel {
    /// Private and above.
    Private,
    /// Internal and above.
    Internal,
    /// Public only.
    Public,
}

/// Options for a plugin-requested symbol graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolGraphOptions {
    /// Minimum access level of included symbols.
    pub minimum_access_level: SymbolAccessLevel,
    /// Whether synthesised members are included.
    #[serde(default)]
    pub include_synthesized: bool,
    /// Whether SPI symbols are included.
    #[serde(default)]
    pub include_spi: bool,
}

/// Outcome of a plugin-requested symbol graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolGraphResult {
    /// File URL of the directory containing the generated symbol graph.
    pub directory_path: String,
}

/// Messages sent from the host to the plugin.
///
/// The four action variants open a session; the response variants terminate
/// outstanding plugin-initiated requests. Responses carry no correlation
/// id: each request kind has singleton-in-flight semantics on the plugin
/// side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostToPlugin {
    /// Ask a build-tool plugin for the commands to run for a target.
    CreateBuildToolCommands {
        /// Flattened context snapshot.
        context: WireInput,
        /// The package the target belongs to.
        package: PackageId,
        /// The target commands are generated for.
        target: TargetId,
        /// Sources generated by previously run plugins.
        generated_sources: Vec<PathId>,
        /// Resources generated by previously run plugins.
        generated_resources: Vec<PathId>,
    },
    /// Ask a build-tool plugin for the commands to run for a project target.
    CreateProjectBuildToolCommands {
        /// Flattened context snapshot.
        context: WireInput,
        /// The project the target belongs to.
        project: ProjectId,
        /// The target commands are generated for.
        target: ProjectTargetId,
        /// Sources generated by previously run plugins.
        generated_sources: Vec<PathId>,
        /// Resources generated by previously run plugins.
        generated_resources: Vec<PathId>,
    },
    /// Run a command plugin against a package.
    PerformCommand {
        /// Flattened context snapshot.
        context: WireInput,
        /// The package the command runs against.
        package: PackageId,
        /// User-supplied arguments.
        arguments: Vec<String>,
    },
    /// Run a command plugin against a project.
    PerformProjectCommand {
        /// Flattened context snapshot.
        context: WireInput,
        /// The project the command runs against.
        project: ProjectId,
        /// User-supplied arguments.
        arguments: Vec<String>,
    },
    /// Terminates an outstanding build request.
    BuildOperationResponse {
        /// Build outcome.
        result: BuildOperationResult,
    },
    /// Terminates an outstanding test request.
    TestOperationResponse {
        /// Test outcome.
        result: TestOperationResult,
    },
    /// Terminates an outstanding symbol-graph request.
    SymbolGraphResponse {
        /// Symbol-graph outcome.
        result: SymbolGraphResult,
    },
    /// Terminates an outstanding request with a failure.
    ErrorResponse {
        /// Display string of the failure.
        error: String,
    },
}

/// Messages sent from the plugin to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginToHost {
    /// Report a diagnostic to the user.
    EmitDiagnostic {
        /// Diagnostic severity.
        severity: WireSeverity,
        /// Diagnostic text.
        message: String,
        /// File the diagnostic refers to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        /// Line within `file`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
    },
    /// Report free-form progress.
    EmitProgress {
        /// Progress text.
        message: String,
    },
    /// Define a command for the build graph to run when its outputs are
    /// needed.
    DefineBuildCommand {
        /// Command configuration.
        configuration: WireCommandConfiguration,
        /// Input files the command depends on.
        input_files: Vec<String>,
        /// Output files the command produces.
        output_files: Vec<String>,
    },
    /// Define a command to run before every build.
    DefinePrebuildCommand {
        /// Command configuration.
        configuration: WireCommandConfiguration,
        /// Directory scanned for outputs after the command runs.
        output_files_directory: String,
    },
    /// Ask the host to run a build.
    BuildOperationRequest {
        /// What to build.
        subset: BuildSubset,
        /// How to build it.
        parameters: BuildParameters,
    },
    /// Ask the host to run tests.
    TestOperationRequest {
        /// Which tests to run.
        subset: TestSubset,
        /// How to run them.
        parameters: TestParameters,
    },
    /// Ask the host to generate a symbol graph.
    SymbolGraphRequest {
        /// Module the symbol graph covers.
        target: String,
        /// Generation options.
        options: SymbolGraphOptions,
    },
}

/// Encodes a host-to-plugin message into a frame payload.
///
/// # Errors
///
/// Returns the underlying JSON error when the message cannot be serialised.
pub fn encode(message: &HostToPlugin) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(message)
}

/// Decodes a frame payload into a plugin-to-host message.
///
/// # Errors
///
/// Returns the underlying JSON error when the payload does not conform to
/// the schema.
pub fn decode(payload: &[u8]) -> Result<PluginToHost, serde_json::Error> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests;
