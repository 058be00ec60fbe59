//! Delegate surface through which a session reports to its host.
//!
//! The delegate is a capability set: observers for compile events and for
//! plugin output, diagnostics, progress and command definitions, plus
//! responders for the three operations a plugin can request from the host.
//! Every method has a default so hosts implement only what they care
//! about; the request responders default to completing with an
//! "unimplemented" failure.
//!
//! All callbacks for a single session arrive serialised on that session's
//! queue, in the order the generating messages were read from the wire.

use std::path::PathBuf;

use thiserror::Error;

use crate::command::{BuildCommand, PrebuildCommand};
use crate::compiler::PluginCompilationResult;
use crate::diagnostic::Diagnostic;
use crate::protocol::{
    BuildOperationResult, BuildParameters, BuildSubset, SymbolGraphOptions, TestOperationResult,
    TestParameters, TestSubset,
};

/// Failure completing a plugin-requested operation.
///
/// The display string is what travels back to the plugin in an error
/// response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OperationFailure {
    message: String,
}

impl OperationFailure {
    /// Creates a failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn unimplemented(operation: &str) -> Self {
        Self::new(format!(
            "the host does not implement plugin-requested {operation} operations"
        ))
    }
}

/// Completion handed to a request responder.
///
/// Must be invoked exactly once; it may be called from any thread, and the
/// resulting response re-enters the session's writer.
pub type OperationCompletion<T> = Box<dyn FnOnce(Result<T, OperationFailure>) + Send + 'static>;

/// Observer and responder capabilities supplied by the host of a session.
#[allow(unused_variables)]
pub trait InvocationDelegate: Send {
    /// The plugin's sources started compiling.
    fn compilation_started(&mut self, plugin: &str) {}

    /// Compilation finished, successfully or not.
    fn compilation_ended(&mut self, plugin: &str, result: &PluginCompilationResult) {}

    /// Compilation was skipped because a cached executable was fresh.
    fn compilation_skipped(&mut self, plugin: &str, result: &PluginCompilationResult) {}

    /// The plugin wrote bytes to its free-form output stream.
    fn plugin_emitted_output(&mut self, data: &[u8]) {}

    /// The plugin emitted a diagnostic.
    fn plugin_emitted_diagnostic(&mut self, diagnostic: &Diagnostic) {}

    /// The plugin reported progress.
    fn plugin_emitted_progress(&mut self, message: &str) {}

    /// The plugin defined a build command.
    fn plugin_defined_build_command(&mut self, command: &BuildCommand) {}

    /// The plugin defined a prebuild command.
    ///
    /// Returning `false` rejects the command: it is not captured and the
    /// session will not report a clean exit.
    fn plugin_defined_prebuild_command(&mut self, command: &PrebuildCommand) -> bool {
        true
    }

    /// The plugin asked the host to run a build.
    fn plugin_requested_build_operation(
        &mut self,
        subset: BuildSubset,
        parameters: BuildParameters,
        completion: OperationCompletion<BuildOperationResult>,
    ) {
        completion(Err(OperationFailure::unimplemented("build")));
    }

    /// The plugin asked the host to run tests.
    fn plugin_requested_test_operation(
        &mut self,
        subset: TestSubset,
        parameters: TestParameters,
        completion: OperationCompletion<TestOperationResult>,
    ) {
        completion(Err(OperationFailure::unimplemented("test")));
    }

    /// The plugin asked the host for a symbol graph of a module.
    ///
    /// On success the completion receives the directory the graph was
    /// generated into.
    fn plugin_requested_symbol_graph(
        &mut self,
        target: &str,
        options: SymbolGraphOptions,
        completion: OperationCompletion<PathBuf>,
    ) {
        completion(Err(OperationFailure::unimplemented("symbol graph")));
    }
}

/// Default delegate that accumulates everything a session reports.
#[derive(Debug, Default)]
pub struct AccumulatingDelegate {
    output: Vec<u8>,
    diagnostics: Vec<Diagnostic>,
    build_commands: Vec<BuildCommand>,
    prebuild_commands: Vec<PrebuildCommand>,
}

impl AccumulatingDelegate {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulated free-form output.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Returns the accumulated diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns the accumulated build commands.
    #[must_use]
    pub fn build_commands(&self) -> &[BuildCommand] {
        &self.build_commands
    }

    /// Returns the accumulated prebuild commands.
    #[must_use]
    pub fn prebuild_commands(&self) -> &[PrebuildCommand] {
        &self.prebuild_commands
    }
}

impl InvocationDelegate for AccumulatingDelegate {
    fn plugin_emitted_output(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }

    fn plugin_emitted_diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }

    fn plugin_defined_build_command(&mut self, command: &BuildCommand) {
        self.build_commands.push(command.clone());
    }

    fn plugin_defined_prebuild_command(&mut self, command: &PrebuildCommand) -> bool {
        self.prebuild_commands.push(command.clone());
        true
    }
}
