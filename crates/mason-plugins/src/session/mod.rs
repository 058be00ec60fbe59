//! One plugin run from first frame to exit synthesis.
//!
//! An [`InvocationSession`] is the runner delegate for a single live
//! plugin: it decodes every inbound frame, validates it, folds the result
//! into the session state, and mirrors each observation to the host's
//! [`InvocationDelegate`]. Because the runner drains all events on one
//! thread, everything here runs serialised; the captured lists reflect
//! wire arrival order.
//!
//! Plugin-initiated requests are dispatched to the host delegate with a
//! completion that encodes the reply and writes it back through the
//! session's [`Responder`]. Completions may fire from any thread and after
//! any delay; a reply that misses the plugin (because it already exited)
//! is logged and dropped, matching the protocol's stateless-host contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::command::{BuildCommand, CommandConfiguration, PrebuildCommand};
use crate::compiler::PluginCompilationResult;
use crate::delegate::InvocationDelegate;
use crate::diagnostic::{Diagnostic, Severity};
use crate::error::InvocationError;
use crate::protocol::{
    self, HostToPlugin, PLUGIN_API_VERSION, PluginToHost, SymbolGraphResult,
    WireCommandConfiguration, WireSeverity,
};
use crate::runner::{Responder, ScriptRunnerDelegate};

const SESSION_TARGET: &str = "mason_plugins::session";

/// Per-session inputs fixed before the plugin starts.
#[derive(Debug, Clone, Default)]
pub struct SessionConfiguration {
    tool_paths: Vec<PathBuf>,
    built_tool_paths: Vec<PathBuf>,
}

impl SessionConfiguration {
    /// Creates a configuration from the plugin's declared tool paths and
    /// the subset of them produced by the enclosing build.
    ///
    /// Tool paths are sorted here once; every build command prepends them
    /// in this order.
    #[must_use]
    pub fn new(mut tool_paths: Vec<PathBuf>, built_tool_paths: Vec<PathBuf>) -> Self {
        tool_paths.sort();
        Self {
            tool_paths,
            built_tool_paths,
        }
    }

    /// Returns the declared tool paths, sorted.
    #[must_use]
    pub fn tool_paths(&self) -> &[PathBuf] {
        &self.tool_paths
    }
}

/// Everything a finished session produced.
#[derive(Debug)]
pub struct SessionOutcome {
    pub(crate) exited_cleanly: bool,
    pub(crate) exit_code: i32,
    pub(crate) output: Vec<u8>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) build_commands: Vec<BuildCommand>,
    pub(crate) prebuild_commands: Vec<PrebuildCommand>,
}

impl SessionOutcome {
    /// Returns whether the plugin exited zero without tripping an early
    /// exit.
    #[must_use]
    pub const fn exited_cleanly(&self) -> bool {
        self.exited_cleanly
    }

    /// Returns the child's exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns the accumulated free-form output bytes.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Returns the captured diagnostics, in arrival order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns the captured build commands, in arrival order.
    #[must_use]
    pub fn build_commands(&self) -> &[BuildCommand] {
        &self.build_commands
    }

    /// Returns the captured prebuild commands, in arrival order.
    #[must_use]
    pub fn prebuild_commands(&self) -> &[PrebuildCommand] {
        &self.prebuild_commands
    }
}

/// State machine for one live plugin run.
pub struct InvocationSession<'d> {
    configuration: SessionConfiguration,
    delegate: &'d mut dyn InvocationDelegate,
    output: Vec<u8>,
    diagnostics: Vec<Diagnostic>,
    build_commands: Vec<BuildCommand>,
    prebuild_commands: Vec<PrebuildCommand>,
    has_reported_error: bool,
    exit_early: bool,
}

impl<'d> InvocationSession<'d> {
    /// Creates a session reporting to the given delegate.
    #[must_use]
    pub fn new(
        configuration: SessionConfiguration,
        delegate: &'d mut dyn InvocationDelegate,
    ) -> Self {
        Self {
            configuration,
            delegate,
            output: Vec::new(),
            diagnostics: Vec::new(),
            build_commands: Vec::new(),
            prebuild_commands: Vec::new(),
            has_reported_error: false,
            exit_early: false,
        }
    }

    /// Finalises the session once the child has exited and every stream is
    /// drained.
    ///
    /// A child that did not exit cleanly and never reported an error gets
    /// one synthesised error diagnostic naming the exit code.
    #[must_use]
    pub fn finish(mut self, exit_code: i32) -> SessionOutcome {
        let exited_cleanly = exit_code == 0 && !self.exit_early;
        if !exited_cleanly && !self.has_reported_error {
            let diagnostic = Diagnostic::error(format!("Plugin ended with exit code {exit_code}"));
            self.delegate.plugin_emitted_diagnostic(&diagnostic);
            self.diagnostics.push(diagnostic);
        }
        SessionOutcome {
            exited_cleanly,
            exit_code,
            output: self.output,
            diagnostics: self.diagnostics,
            build_commands: self.build_commands,
            prebuild_commands: self.prebuild_commands,
        }
    }

    fn record_diagnostic(
        &mut self,
        severity: WireSeverity,
        message: String,
        file: Option<String>,
        line: Option<u32>,
    ) {
        let severity = match severity {
            WireSeverity::Error => Severity::Error,
            WireSeverity::Warning => Severity::Warning,
            WireSeverity::Remark => Severity::Remark,
        };
        if severity == Severity::Error {
            self.has_reported_error = true;
        }

        let mut diagnostic = Diagnostic::new(severity, message);
        if let Some(file) = file {
            let path = PathBuf::from(&file);
            if path.is_absolute() {
                diagnostic = diagnostic.with_location(path, line);
            } else {
                // Invalid location metadata is a soft protocol error: the
                // diagnostic is kept, the location dropped.
                warn!(
                    target: SESSION_TARGET,
                    file = %file,
                    "dropping non-absolute diagnostic location"
                );
            }
        }

        self.delegate.plugin_emitted_diagnostic(&diagnostic);
        self.diagnostics.push(diagnostic);
    }

    fn define_build_command(
        &mut self,
        configuration: WireCommandConfiguration,
        input_files: Vec<String>,
        output_files: Vec<String>,
    ) -> Result<(), InvocationError> {
        check_version(&configuration)?;
        let configuration = convert_configuration(configuration);

        let mut inputs = self.configuration.tool_paths.clone();
        inputs.extend(input_files.into_iter().map(PathBuf::from));
        let outputs = output_files.into_iter().map(PathBuf::from).collect();

        let command = BuildCommand::new(configuration, inputs, outputs);
        self.delegate.plugin_defined_build_command(&command);
        self.build_commands.push(command);
        Ok(())
    }

    fn define_prebuild_command(
        &mut self,
        configuration: WireCommandConfiguration,
        output_files_directory: String,
    ) -> Result<(), InvocationError> {
        check_version(&configuration)?;
        let configuration = convert_configuration(configuration);

        if self
            .configuration
            .built_tool_paths
            .iter()
            .any(|path| path == configuration.executable())
        {
            let basename = configuration
                .executable()
                .file_name()
                .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
            let diagnostic = Diagnostic::error(format!(
                "prebuild commands cannot use the build-produced tool '{basename}': it does not \
                 exist yet when prebuild commands run"
            ));
            self.delegate.plugin_emitted_diagnostic(&diagnostic);
            self.diagnostics.push(diagnostic);
            self.has_reported_error = true;
            self.exit_early = true;
            return Ok(());
        }

        let command = PrebuildCommand::new(configuration, PathBuf::from(output_files_directory));
        if self.delegate.plugin_defined_prebuild_command(&command) {
            self.prebuild_commands.push(command);
        } else {
            self.exit_early = true;
        }
        Ok(())
    }
}

impl ScriptRunnerDelegate for InvocationSession<'_> {
    fn compilation_started(&mut self, plugin: &str) {
        self.delegate.compilation_started(plugin);
    }

    fn compilation_ended(&mut self, plugin: &str, result: &PluginCompilationResult) {
        self.delegate.compilation_ended(plugin, result);
    }

    fn compilation_skipped(&mut self, plugin: &str, result: &PluginCompilationResult) {
        self.delegate.compilation_skipped(plugin, result);
    }

    fn handle_output(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
        self.delegate.plugin_emitted_output(data);
    }

    fn handle_message(
        &mut self,
        payload: &[u8],
        responder: &Responder,
    ) -> Result<(), InvocationError> {
        let message =
            protocol::decode(payload).map_err(|source| InvocationError::MessageDecoding {
                frame: payload.to_vec(),
                source: Arc::new(source),
            })?;

        match message {
            PluginToHost::EmitDiagnostic {
                severity,
                message,
                file,
                line,
            } => {
                self.record_diagnostic(severity, message, file, line);
            }
            PluginToHost::EmitProgress { message } => {
                self.delegate.plugin_emitted_progress(&message);
            }
            PluginToHost::DefineBuildCommand {
                configuration,
                input_files,
                output_files,
            } => {
                self.define_build_command(configuration, input_files, output_files)?;
            }
            PluginToHost::DefinePrebuildCommand {
                configuration,
                output_files_directory,
            } => {
                self.define_prebuild_command(configuration, output_files_directory)?;
            }
            PluginToHost::BuildOperationRequest { subset, parameters } => {
                let responder = responder.clone();
                self.delegate.plugin_requested_build_operation(
                    subset,
                    parameters,
                    Box::new(move |result| {
                        let reply = match result {
                            Ok(result) => HostToPlugin::BuildOperationResponse { result },
                            Err(failure) => HostToPlugin::ErrorResponse {
                                error: failure.to_string(),
                            },
                        };
                        send_reply(&responder, &reply);
                    }),
                );
            }
            PluginToHost::TestOperationRequest { subset, parameters } => {
                let responder = responder.clone();
                self.delegate.plugin_requested_test_operation(
                    subset,
                    parameters,
                    Box::new(move |result| {
                        let reply = match result {
                            Ok(result) => HostToPlugin::TestOperationResponse { result },
                            Err(failure) => HostToPlugin::ErrorResponse {
                                error: failure.to_string(),
                            },
                        };
                        send_reply(&responder, &reply);
                    }),
                );
            }
            PluginToHost::SymbolGraphRequest { target, options } => {
                let responder = responder.clone();
                self.delegate.plugin_requested_symbol_graph(
                    &target,
                    options,
                    Box::new(move |result| {
                        let reply = match result {
                            Ok(directory) => HostToPlugin::SymbolGraphResponse {
                                result: SymbolGraphResult {
                                    directory_path: file_url(&directory),
                                },
                            },
                            Err(failure) => HostToPlugin::ErrorResponse {
                                error: failure.to_string(),
                            },
                        };
                        send_reply(&responder, &reply);
                    }),
                );
            }
        }
        Ok(())
    }
}

fn check_version(configuration: &WireCommandConfiguration) -> Result<(), InvocationError> {
    if configuration.version == PLUGIN_API_VERSION {
        Ok(())
    } else {
        Err(InvocationError::IncompatibleApiVersion {
            expected: PLUGIN_API_VERSION,
            actual: configuration.version,
        })
    }
}

fn convert_configuration(wire: WireCommandConfiguration) -> CommandConfiguration {
    CommandConfiguration::new(
        wire.display_name,
        PathBuf::from(wire.executable),
        wire.arguments,
        wire.environment,
        wire.working_directory.map(PathBuf::from),
    )
}

fn send_reply(responder: &Responder, reply: &HostToPlugin) {
    let payload = match protocol::encode(reply) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                target: SESSION_TARGET,
                error = %error,
                "failed to encode a reply to the plugin"
            );
            return;
        }
    };
    if let Err(error) = responder.send(&payload) {
        warn!(
            target: SESSION_TARGET,
            error = %error,
            "failed to deliver a reply to the plugin"
        );
    }
}

/// Renders an absolute path as a file URL for the wire.
fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}
