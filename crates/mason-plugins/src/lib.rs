//! Plugin invocation core for the mason build system.
//!
//! A mason plugin is a user-provided program that extends the build: asked
//! to run one of its entry points, it describes build commands, prebuild
//! commands, diagnostics and progress back to the host over a framed
//! message protocol. This crate owns that exchange end to end: it compiles
//! the plugin's sources through a content-addressed cache, launches the
//! executable inside a [`mason_sandbox::Sandbox`], sends the flattened
//! context snapshot, pumps the wire until the plugin exits, and packages
//! everything the plugin produced for the enclosing build graph.
//!
//! Package resolution, dependency graph construction and the downstream
//! build scheduler are external collaborators; they appear here only as
//! the [`graph`] model, the [`fs::FileSystem`] seam, the
//! [`tools::BuiltToolResolver`] callback and the
//! [`delegate::InvocationDelegate`] capability set.
//!
//! # Architecture
//!
//! [`invocation::PluginInvoker`] is the entry point. For one action it
//! collects the plugin's accessible tools ([`tools`]), flattens the
//! package graph into id-keyed tables ([`serializer`]), ensures a compiled
//! executable ([`compiler`]), and drives a [`session::InvocationSession`]
//! over a [`runner::ScriptRunner`]. The wire schema lives in [`protocol`].
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use mason_plugins::compiler::{PluginCompiler, ToolchainDescription};
//! use mason_plugins::delegate::AccumulatingDelegate;
//! use mason_plugins::fs::LocalFileSystem;
//! use mason_plugins::graph::{BuildConfiguration, BuildEnvironment, PackageGraph, Platform};
//! use mason_plugins::invocation::{InvocationParameters, PluginAction, PluginInvoker};
//! use mason_plugins::runner::SandboxScriptRunner;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = Arc::new(LocalFileSystem);
//! let compiler = PluginCompiler::new(
//!     "/build/plugin-cache",
//!     ToolchainDescription::new("/usr/bin/masonc", "masonc 1.4.0"),
//!     Arc::clone(&fs),
//! );
//! let invoker = PluginInvoker::new(
//!     Arc::new(PackageGraph::default()),
//!     SandboxScriptRunner::new(compiler),
//!     fs,
//! );
//!
//! let action = PluginAction::CreateBuildToolCommands {
//!     package: "demo".into(),
//!     target: "app".into(),
//!     generated_sources: vec![],
//!     generated_resources: vec![],
//! };
//! let parameters = InvocationParameters::new(
//!     BuildEnvironment::new(Platform::Linux, BuildConfiguration::Debug),
//!     "x86_64-unknown-linux-gnu",
//!     "6.0",
//!     "/build/plugin-work",
//!     "/build/plugin-out",
//! );
//! let resolver = |_name: &str, relative: &std::path::Path| {
//!     Some(PathBuf::from("/build/debug").join(relative))
//! };
//!
//! let mut delegate = AccumulatingDelegate::new();
//! let clean = invoker.invoke("generator", &action, &parameters, &resolver, &mut delegate)?;
//! println!("plugin exited cleanly: {clean}");
//! # Ok(()) }
//! ```

pub mod command;
pub mod compiler;
pub mod delegate;
pub mod diagnostic;
pub mod error;
pub mod fs;
pub mod graph;
pub mod invocation;
pub mod protocol;
pub mod runner;
pub mod serializer;
pub mod session;
pub mod tools;

pub use self::command::{BuildCommand, CommandConfiguration, PrebuildCommand};
pub use self::compiler::{PluginCompilationResult, PluginCompiler, ToolchainDescription};
pub use self::delegate::{AccumulatingDelegate, InvocationDelegate, OperationFailure};
pub use self::diagnostic::{Diagnostic, Severity};
pub use self::error::InvocationError;
pub use self::fs::{FileSystem, LocalFileSystem};
pub use self::graph::{BuildEnvironment, PackageGraph};
pub use self::invocation::{
    BuildToolPluginInvocationResult, InvocationParameters, PluginAction, PluginInvoker,
    compute_plugin_generated_files,
};
pub use self::runner::{SandboxScriptRunner, ScriptRunner};
pub use self::session::{InvocationSession, SessionConfiguration, SessionOutcome};
pub use self::tools::{AccessibleTool, BuiltToolResolver};
