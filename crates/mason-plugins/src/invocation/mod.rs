//! Facade turning a plugin action into a finished invocation.
//!
//! The [`PluginInvoker`] wires the other components together: it collects
//! the plugin's accessible tools, flattens the context snapshot, builds the
//! sandbox policy, and hands everything to a [`ScriptRunner`] driving an
//! [`InvocationSession`]. The blocking [`PluginInvoker::invoke`] form is
//! native; [`PluginInvoker::invoke_detached`] is a thin adapter that runs
//! it on a worker thread and fires the completion exactly once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use mason_sandbox::{NetworkPolicy, SandboxPolicy};

use crate::command::{BuildCommand, PrebuildCommand};
use crate::delegate::{AccumulatingDelegate, InvocationDelegate};
use crate::diagnostic::Diagnostic;
use crate::error::InvocationError;
use crate::fs::FileSystem;
use crate::graph::{BuildEnvironment, Package, PackageGraph};
use crate::protocol::{self, HostToPlugin, WireInput};
use crate::runner::{ScriptRunRequest, ScriptRunner};
use crate::serializer::{ContextSerializer, SerialiseError};
use crate::session::{InvocationSession, SessionConfiguration, SessionOutcome};
use crate::tools::{self, BuiltToolResolver, ResolvedTool, ToolOrigin};

const INVOCATION_TARGET: &str = "mason_plugins::invocation";

/// The entry point a plugin is asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAction {
    /// Ask a build-tool plugin for the commands covering one target.
    CreateBuildToolCommands {
        /// Package owning the target.
        package: String,
        /// Target the commands are generated for.
        target: String,
        /// Sources generated by previously run plugins.
        generated_sources: Vec<PathBuf>,
        /// Resources generated by previously run plugins.
        generated_resources: Vec<PathBuf>,
    },
    /// Ask a build-tool plugin for the commands covering one project
    /// target.
    CreateProjectBuildToolCommands {
        /// Project owning the target.
        project: String,
        /// Target the commands are generated for.
        target: String,
        /// Sources generated by previously run plugins.
        generated_sources: Vec<PathBuf>,
        /// Resources generated by previously run plugins.
        generated_resources: Vec<PathBuf>,
    },
    /// Run a command plugin against a package.
    PerformCommand {
        /// Package the command runs against.
        package: String,
        /// User-supplied arguments.
        arguments: Vec<String>,
    },
    /// Run a command plugin against a project.
    PerformProjectCommand {
        /// Project the command runs against.
        project: String,
        /// User-supplied arguments.
        arguments: Vec<String>,
    },
}

/// Session-wide inputs fixed by the caller.
#[derive(Debug, Clone)]
pub struct InvocationParameters {
    environment: BuildEnvironment,
    host_triple: String,
    tools_version: String,
    work_directory: PathBuf,
    output_directory: PathBuf,
    tool_search_directories: Vec<PathBuf>,
    writable_directories: Vec<PathBuf>,
    read_only_directories: Vec<PathBuf>,
    network: NetworkPolicy,
    pkg_config_search_directories: Vec<PathBuf>,
    sdk_root: Option<PathBuf>,
    cancellation: Option<Arc<AtomicBool>>,
}

impl InvocationParameters {
    /// Creates parameters with a restrictive default sandbox: only the work
    /// and output directories are writable, reads are limited to the
    /// system library roots, and networking is denied.
    #[must_use]
    pub fn new(
        environment: BuildEnvironment,
        host_triple: impl Into<String>,
        tools_version: impl Into<String>,
        work_directory: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            environment,
            host_triple: host_triple.into(),
            tools_version: tools_version.into(),
            work_directory: work_directory.into(),
            output_directory: output_directory.into(),
            tool_search_directories: Vec::new(),
            writable_directories: Vec::new(),
            read_only_directories: Vec::new(),
            network: NetworkPolicy::deny(),
            pkg_config_search_directories: Vec::new(),
            sdk_root: None,
            cancellation: None,
        }
    }

    /// Sets the directories searched for helper tools.
    #[must_use]
    pub fn with_tool_search_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.tool_search_directories = directories;
        self
    }

    /// Grants the plugin write access to additional directories.
    #[must_use]
    pub fn with_writable_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.writable_directories = directories;
        self
    }

    /// Grants the plugin read access to additional directories.
    #[must_use]
    pub fn with_read_only_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.read_only_directories = directories;
        self
    }

    /// Grants the plugin the given network destinations.
    #[must_use]
    pub fn with_network_policy(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }

    /// Sets the pkg-config search directories serialised to the plugin.
    #[must_use]
    pub fn with_pkg_config_search_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.pkg_config_search_directories = directories;
        self
    }

    /// Sets the SDK root serialised to the plugin.
    #[must_use]
    pub fn with_sdk_root(mut self, sdk_root: impl Into<PathBuf>) -> Self {
        self.sdk_root = Some(sdk_root.into());
        self
    }

    /// Attaches a cooperative cancellation flag.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}

/// Everything a build-tool plugin invocation produced, packaged for the
/// build planner.
#[derive(Debug)]
pub struct BuildToolPluginInvocationResult {
    succeeded: bool,
    duration: Duration,
    text_output: String,
    diagnostics: Vec<Diagnostic>,
    build_commands: Vec<BuildCommand>,
    prebuild_commands: Vec<PrebuildCommand>,
}

impl BuildToolPluginInvocationResult {
    /// Returns whether the plugin exited cleanly.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Returns how long the invocation took.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the plugin's free-form output, decoded lossily as UTF-8.
    #[must_use]
    pub fn text_output(&self) -> &str {
        &self.text_output
    }

    /// Returns the captured diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns the captured build commands.
    #[must_use]
    pub fn build_commands(&self) -> &[BuildCommand] {
        &self.build_commands
    }

    /// Returns the captured prebuild commands.
    #[must_use]
    pub fn prebuild_commands(&self) -> &[PrebuildCommand] {
        &self.prebuild_commands
    }
}

/// Output paths discovered by running one prebuild command, supplied by
/// the build graph after it scans the command's output directory.
#[derive(Debug, Clone, Default)]
pub struct PrebuildCommandResult {
    output_files: Vec<PathBuf>,
}

impl PrebuildCommandResult {
    /// Creates a result over the scanned output files.
    #[must_use]
    pub fn new(output_files: Vec<PathBuf>) -> Self {
        Self { output_files }
    }

    /// Returns the discovered output files.
    #[must_use]
    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }
}

/// Classification of a generated file by the host's file rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRule {
    /// Compiled as a source file.
    Source,
    /// Bundled as a resource.
    Resource,
    /// Not part of the build.
    Ignored,
}

/// Completion callback for the detached invocation form.
pub type InvocationCompletion = Box<dyn FnOnce(Result<bool, InvocationError>) + Send + 'static>;

/// Single entry point combining broker, serializer, compiler cache,
/// sandbox and session.
#[derive(Debug)]
pub struct PluginInvoker<R, F> {
    graph: Arc<PackageGraph>,
    runner: Arc<R>,
    fs: Arc<F>,
}

impl<R, F> Clone for PluginInvoker<R, F> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            runner: Arc::clone(&self.runner),
            fs: Arc::clone(&self.fs),
        }
    }
}

impl<R, F> PluginInvoker<R, F>
where
    R: ScriptRunner + 'static,
    F: FileSystem + 'static,
{
    /// Creates an invoker over the given graph, runner and filesystem.
    #[must_use]
    pub fn new(graph: Arc<PackageGraph>, runner: R, fs: Arc<F>) -> Self {
        Self {
            graph,
            runner: Arc::new(runner),
            fs,
        }
    }

    /// Runs one plugin action to completion, reporting through the
    /// delegate.
    ///
    /// Returns whether the plugin exited cleanly. Diagnostics and commands
    /// captured before a failure point have already reached the delegate,
    /// so callers can render partial output alongside the error.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] per the taxonomy in [`crate::error`].
    pub fn invoke(
        &self,
        plugin_name: &str,
        action: &PluginAction,
        parameters: &InvocationParameters,
        resolver: &dyn BuiltToolResolver,
        delegate: &mut dyn InvocationDelegate,
    ) -> Result<bool, InvocationError> {
        self.run_session(plugin_name, action, parameters, resolver, delegate)
            .map(|outcome| outcome.exited_cleanly())
    }

    /// Adapter over [`PluginInvoker::invoke`]: runs the invocation on a
    /// worker thread and fires the completion exactly once when it ends.
    pub fn invoke_detached(
        &self,
        plugin_name: String,
        action: PluginAction,
        parameters: InvocationParameters,
        resolver: Arc<dyn BuiltToolResolver + Send + Sync>,
        mut delegate: Box<dyn InvocationDelegate>,
        completion: InvocationCompletion,
    ) -> thread::JoinHandle<()> {
        let invoker = self.clone();
        thread::spawn(move || {
            let result = invoker.invoke(
                &plugin_name,
                &action,
                &parameters,
                resolver.as_ref(),
                delegate.as_mut(),
            );
            completion(result);
        })
    }

    /// Runs a build-tool action with the default accumulating delegate and
    /// packages everything the session produced.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] when the session fails outright; see
    /// [`PluginInvoker::invoke`] for partial-output behaviour.
    pub fn invoke_build_tool(
        &self,
        plugin_name: &str,
        action: &PluginAction,
        parameters: &InvocationParameters,
        resolver: &dyn BuiltToolResolver,
    ) -> Result<BuildToolPluginInvocationResult, InvocationError> {
        let started = Instant::now();
        let mut delegate = AccumulatingDelegate::new();
        let outcome = self.run_session(plugin_name, action, parameters, resolver, &mut delegate)?;
        Ok(BuildToolPluginInvocationResult {
            succeeded: outcome.exited_cleanly(),
            duration: started.elapsed(),
            text_output: String::from_utf8_lossy(outcome.output()).into_owned(),
            diagnostics: outcome.diagnostics,
            build_commands: outcome.build_commands,
            prebuild_commands: outcome.prebuild_commands,
        })
    }

    fn run_session(
        &self,
        plugin_name: &str,
        action: &PluginAction,
        parameters: &InvocationParameters,
        resolver: &dyn BuiltToolResolver,
        delegate: &mut dyn InvocationDelegate,
    ) -> Result<SessionOutcome, InvocationError> {
        let owning_package = self.graph.package_for_module(plugin_name).ok_or_else(|| {
            InvocationError::PackageNotFound {
                plugin: plugin_name.to_owned(),
            }
        })?;
        let plugin = owning_package
            .module(plugin_name)
            .filter(|module| module.plugin_capability().is_some())
            .ok_or_else(|| InvocationError::PackageNotFound {
                plugin: plugin_name.to_owned(),
            })?;

        self.fs
            .create_directory(&parameters.output_directory, true)
            .map_err(|source| InvocationError::OutputDirectoryCreation {
                path: parameters.output_directory.clone(),
                source: Arc::new(source),
            })?;

        let tool_map = tools::accessible_tool_map(
            &self.graph,
            plugin,
            &parameters.environment,
            &parameters.host_triple,
        )
        .map_err(|error| InvocationError::ContextSerialisation {
            message: error.to_string(),
        })?;
        let resolved = tools::resolve_tools(tool_map, resolver);

        let tool_paths: Vec<PathBuf> = resolved
            .values()
            .map(|tool| tool.path().to_path_buf())
            .collect();
        let built_tool_paths: Vec<PathBuf> = resolved
            .values()
            .filter(|tool| tool.origin() == ToolOrigin::Built)
            .map(|tool| tool.path().to_path_buf())
            .collect();

        let initial = self.initial_message(action, parameters, &resolved)?;
        let payload =
            protocol::encode(&initial).map_err(|error| InvocationError::ContextSerialisation {
                message: error.to_string(),
            })?;

        debug!(
            target: INVOCATION_TARGET,
            plugin = plugin_name,
            payload_bytes = payload.len(),
            tools = resolved.len(),
            "starting plugin session"
        );

        let mut request = ScriptRunRequest::new(
            plugin.name(),
            plugin.directory(),
            plugin.source_files().to_vec(),
            &parameters.tools_version,
            payload,
            &parameters.work_directory,
            build_policy(parameters),
        );
        if let Some(cancellation) = &parameters.cancellation {
            request = request.with_cancellation(Arc::clone(cancellation));
        }

        let mut session =
            InvocationSession::new(SessionConfiguration::new(tool_paths, built_tool_paths), delegate);
        let exit_code = self.runner.run(request, &mut session)?;
        Ok(session.finish(exit_code))
    }

    fn initial_message(
        &self,
        action: &PluginAction,
        parameters: &InvocationParameters,
        tools: &BTreeMap<String, ResolvedTool>,
    ) -> Result<HostToPlugin, InvocationError> {
        let mut serializer = ContextSerializer::new();
        let message = match action {
            PluginAction::CreateBuildToolCommands {
                package,
                target,
                generated_sources,
                generated_resources,
            } => {
                let package = self.package_named(package)?;
                let package_id = serializer.serialise_package(package).map_err(serialise)?;
                let module = package.module(target).ok_or_else(|| {
                    InvocationError::ContextSerialisation {
                        message: format!(
                            "package '{}' has no target named '{target}'",
                            package.identity()
                        ),
                    }
                })?;
                let target_id = serializer
                    .serialise_module(module)
                    .map_err(serialise)?
                    .ok_or_else(|| InvocationError::ContextSerialisation {
                        message: format!("target '{target}' cannot be sent to a plugin"),
                    })?;
                let generated_sources =
                    serialise_paths(&mut serializer, generated_sources).map_err(serialise)?;
                let generated_resources =
                    serialise_paths(&mut serializer, generated_resources).map_err(serialise)?;
                let context = self.finish_input(serializer, parameters, tools)?;
                HostToPlugin::CreateBuildToolCommands {
                    context,
                    package: package_id,
                    target: target_id,
                    generated_sources,
                    generated_resources,
                }
            }
            PluginAction::CreateProjectBuildToolCommands {
                project,
                target,
                generated_sources,
                generated_resources,
            } => {
                let project = self.project_named(project)?;
                let project_id = serializer.serialise_project(project).map_err(serialise)?;
                let target_id = serializer
                    .serialise_project_target(project, target)
                    .map_err(serialise)?
                    .ok_or_else(|| InvocationError::ContextSerialisation {
                        message: format!(
                            "project '{}' has no target named '{target}'",
                            project.name()
                        ),
                    })?;
                let generated_sources =
                    serialise_paths(&mut serializer, generated_sources).map_err(serialise)?;
                let generated_resources =
                    serialise_paths(&mut serializer, generated_resources).map_err(serialise)?;
                let context = self.finish_input(serializer, parameters, tools)?;
                HostToPlugin::CreateProjectBuildToolCommands {
                    context,
                    project: project_id,
                    target: target_id,
                    generated_sources,
                    generated_resources,
                }
            }
            PluginAction::PerformCommand { package, arguments } => {
                let package = self.package_named(package)?;
                let package_id = serializer.serialise_package(package).map_err(serialise)?;
                let context = self.finish_input(serializer, parameters, tools)?;
                HostToPlugin::PerformCommand {
                    context,
                    package: package_id,
                    arguments: arguments.clone(),
                }
            }
            PluginAction::PerformProjectCommand { project, arguments } => {
                let project = self.project_named(project)?;
                let project_id = serializer.serialise_project(project).map_err(serialise)?;
                let context = self.finish_input(serializer, parameters, tools)?;
                HostToPlugin::PerformProjectCommand {
                    context,
                    project: project_id,
                    arguments: arguments.clone(),
                }
            }
        };
        Ok(message)
    }

    fn finish_input(
        &self,
        serializer: ContextSerializer,
        parameters: &InvocationParameters,
        tools: &BTreeMap<String, ResolvedTool>,
    ) -> Result<WireInput, InvocationError> {
        serializer
            .into_wire_input(
                &parameters.work_directory,
                &parameters.tool_search_directories,
                &parameters.pkg_config_search_directories,
                parameters.sdk_root.as_deref(),
                tools,
            )
            .map_err(serialise)
    }

    fn package_named(&self, name: &str) -> Result<&Package, InvocationError> {
        self.graph
            .package(name)
            .ok_or_else(|| InvocationError::ContextSerialisation {
                message: format!("no package named '{name}' in the graph"),
            })
    }

    fn project_named(&self, name: &str) -> Result<&crate::graph::Project, InvocationError> {
        self.graph
            .project(name)
            .ok_or_else(|| InvocationError::ContextSerialisation {
                message: format!("no project named '{name}' in the graph"),
            })
    }
}

fn serialise(error: SerialiseError) -> InvocationError {
    InvocationError::ContextSerialisation {
        message: error.to_string(),
    }
}

fn serialise_paths(
    serializer: &mut ContextSerializer,
    paths: &[PathBuf],
) -> Result<Vec<crate::protocol::PathId>, SerialiseError> {
    paths
        .iter()
        .map(|path| serializer.serialise_path(path))
        .collect()
}

fn build_policy(parameters: &InvocationParameters) -> SandboxPolicy {
    let mut policy = SandboxPolicy::new()
        .allow_system_libraries()
        .allow_writable_directory(&parameters.output_directory)
        .allow_writable_directory(&parameters.work_directory);
    for directory in &parameters.writable_directories {
        policy = policy.allow_writable_directory(directory);
    }
    for directory in &parameters.read_only_directories {
        policy = policy.allow_read_only_directory(directory);
    }
    for directory in &parameters.tool_search_directories {
        policy = policy.allow_tool_search_directory(directory);
    }
    policy.with_network_policy(parameters.network.clone())
}

/// Aggregates the output paths of completed invocations and classifies
/// them with the host's file rules.
///
/// Returns `(derived sources, derived resources)` in discovery order;
/// ignored files are dropped.
#[must_use]
pub fn compute_plugin_generated_files(
    results: &[BuildToolPluginInvocationResult],
    prebuild_results: &[PrebuildCommandResult],
    classify: &dyn Fn(&Path) -> FileRule,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut sources = Vec::new();
    let mut resources = Vec::new();

    let build_outputs = results
        .iter()
        .flat_map(|result| result.build_commands())
        .flat_map(|command| command.output_files());
    let prebuild_outputs = prebuild_results
        .iter()
        .flat_map(|result| result.output_files());

    for path in build_outputs.chain(prebuild_outputs) {
        match classify(path) {
            FileRule::Source => sources.push(path.clone()),
            FileRule::Resource => resources.push(path.clone()),
            FileRule::Ignored => {}
        }
    }

    (sources, resources)
}
