//! Compilation and sandboxed execution of plugin scripts.
//!
//! The [`ScriptRunner`] trait is the seam between a session and the
//! operating system: the production [`SandboxScriptRunner`] compiles the
//! plugin through the [`PluginCompiler`] cache, spawns the executable
//! inside a [`mason_sandbox::Sandbox`], writes the framed initial message,
//! and pumps the child's streams until it exits. Test code implements the
//! trait to feed a session canned frames without spawning processes.
//!
//! Stream plumbing: host-to-plugin frames travel on the child's stdin,
//! plugin-to-host frames on stdout, and free-form output on stderr. A
//! reader thread per stream funnels everything into one channel drained on
//! the invoking thread, which is the session's serialising queue: delegate
//! callbacks happen there and nowhere else. Replies from request
//! completions go through a [`Responder`], which locks the writer for a
//! whole frame so concurrent completions cannot interleave payloads.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use mason_sandbox::process::Stdio;
use mason_sandbox::{Sandbox, SandboxError, SandboxPolicy};

use crate::compiler::{CompileError, CompileRequest, PluginCompilationResult, PluginCompiler};
use crate::error::InvocationError;
use crate::fs::FileSystem;
use crate::protocol::frame;

const RUNNER_TARGET: &str = "mason_plugins::runner";

/// How often the pump wakes to poll the cancellation flag.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Read size for the free-form output stream.
const OUTPUT_CHUNK_LEN: usize = 4096;

/// Failure modes of running a compiled plugin.
#[derive(Debug, Error)]
pub enum RunFailure {
    /// The compiler could not be run at all.
    #[error(transparent)]
    Compiler(#[from] CompileError),

    /// The compiler ran and rejected the plugin sources.
    #[error("plugin compilation failed:\n{output}")]
    Compilation {
        /// Captured compiler output.
        output: String,
    },

    /// The sandbox refused to launch the executable.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The child process was missing a standard stream.
    #[error("failed to capture plugin process streams: {message}")]
    Spawn {
        /// Description of the missing plumbing.
        message: String,
    },

    /// An I/O error occurred while talking to the plugin process.
    #[error("I/O error communicating with the plugin: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The caller cancelled the invocation and the child was killed.
    #[error("plugin invocation was cancelled")]
    Cancelled,
}

/// Everything needed to run one plugin session.
#[derive(Debug)]
pub struct ScriptRunRequest {
    plugin_name: String,
    plugin_root: PathBuf,
    sources: Vec<PathBuf>,
    tools_version: String,
    initial_message: Vec<u8>,
    work_directory: PathBuf,
    policy: SandboxPolicy,
    compile_flags: Vec<String>,
    cancellation: Option<Arc<AtomicBool>>,
}

impl ScriptRunRequest {
    /// Creates a run request.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plugin_name: impl Into<String>,
        plugin_root: impl Into<PathBuf>,
        sources: Vec<PathBuf>,
        tools_version: impl Into<String>,
        initial_message: Vec<u8>,
        work_directory: impl Into<PathBuf>,
        policy: SandboxPolicy,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            plugin_root: plugin_root.into(),
            sources,
            tools_version: tools_version.into(),
            initial_message,
            work_directory: work_directory.into(),
            policy,
            compile_flags: Vec::new(),
            cancellation: None,
        }
    }

    /// Attaches extra compile flags, e.g. linker flags implied by the
    /// sandbox policy.
    #[must_use]
    pub fn with_compile_flags(mut self, compile_flags: Vec<String>) -> Self {
        self.compile_flags = compile_flags;
        self
    }

    /// Attaches a cooperative cancellation flag; when it becomes true the
    /// runner kills the child and fails the run.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Returns the plugin name.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Returns the framed initial message payload.
    #[must_use]
    pub fn initial_message(&self) -> &[u8] {
        &self.initial_message
    }

    /// Returns the plugin's source files.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Returns the sandbox policy the plugin will run under.
    #[must_use]
    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }
}

/// Writes reply frames to the plugin's stdin.
///
/// Cloneable so request completions can respond from any thread; the
/// writer lock covers a whole frame.
#[derive(Clone)]
pub struct Responder {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Responder {
    pub(crate) fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Sends one framed payload to the plugin.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; a vanished plugin is the usual
    /// cause and callers on completion paths log it rather than fail.
    pub fn send(&self, payload: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        frame::write_frame(&mut *writer, payload)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("Responder")
    }
}

/// Callbacks through which a runner reports to the session it is serving.
#[allow(unused_variables)]
pub trait ScriptRunnerDelegate {
    /// The plugin's sources started compiling.
    fn compilation_started(&mut self, plugin: &str) {}

    /// Compilation finished, successfully or not.
    fn compilation_ended(&mut self, plugin: &str, result: &PluginCompilationResult) {}

    /// Compilation was skipped because a cached executable was fresh.
    fn compilation_skipped(&mut self, plugin: &str, result: &PluginCompilationResult) {}

    /// The plugin wrote bytes to its free-form output stream.
    fn handle_output(&mut self, data: &[u8]);

    /// A complete frame arrived from the plugin.
    ///
    /// # Errors
    ///
    /// An error aborts the session: the runner kills the child and
    /// propagates the error to the caller.
    fn handle_message(&mut self, payload: &[u8], responder: &Responder)
    -> Result<(), InvocationError>;
}

/// Runs a plugin script to completion, reporting through a delegate.
pub trait ScriptRunner: Send + Sync {
    /// Runs the plugin and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] when compilation, spawning, or the
    /// message pump fails. A plugin that runs and exits nonzero is not an
    /// error at this level; the exit code is returned for the session to
    /// judge.
    fn run(
        &self,
        request: ScriptRunRequest,
        delegate: &mut dyn ScriptRunnerDelegate,
    ) -> Result<i32, InvocationError>;
}

/// Production runner: compile through the cache, spawn in the sandbox,
/// pump the wire.
#[derive(Debug)]
pub struct SandboxScriptRunner<F> {
    compiler: PluginCompiler<F>,
}

impl<F: FileSystem> SandboxScriptRunner<F> {
    /// Creates a runner around the given compiler cache.
    #[must_use]
    pub fn new(compiler: PluginCompiler<F>) -> Self {
        Self { compiler }
    }
}

impl<F: FileSystem> ScriptRunner for SandboxScriptRunner<F> {
    fn run(
        &self,
        request: ScriptRunRequest,
        delegate: &mut dyn ScriptRunnerDelegate,
    ) -> Result<i32, InvocationError> {
        let plugin = request.plugin_name.clone();
        let fail = |source: RunFailure| InvocationError::RunFailed {
            plugin: plugin.clone(),
            source,
        };

        let compile_request = CompileRequest::new(
            &request.plugin_name,
            &request.plugin_root,
            request.sources.clone(),
            &request.tools_version,
        )
        .with_extra_flags(request.compile_flags.clone());

        let compilation = {
            let mut on_start = || delegate.compilation_started(&plugin);
            self.compiler
                .compile(&compile_request, &mut on_start)
                .map_err(|error| fail(RunFailure::Compiler(error)))?
        };
        if compilation.cache_hit() {
            delegate.compilation_skipped(&plugin, &compilation);
        } else {
            delegate.compilation_ended(&plugin, &compilation);
        }
        if !compilation.succeeded() {
            return Err(fail(RunFailure::Compilation {
                output: compilation.output().to_owned(),
            }));
        }

        let sandbox = Sandbox::new(request.policy.clone());
        let mut command = mason_sandbox::SandboxCommand::new(compilation.executable());
        command.current_dir(&request.work_directory);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        debug!(
            target: RUNNER_TARGET,
            plugin = %plugin,
            executable = %compilation.executable().display(),
            "spawning plugin process"
        );

        let mut child = sandbox
            .spawn(command)
            .map_err(|error| fail(RunFailure::Sandbox(error)))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            fail(RunFailure::Spawn {
                message: String::from("failed to capture stdin"),
            })
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            fail(RunFailure::Spawn {
                message: String::from("failed to capture stdout"),
            })
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            fail(RunFailure::Spawn {
                message: String::from("failed to capture stderr"),
            })
        })?;

        let responder = Responder::new(Box::new(stdin));

        // The initial message goes out before any inbound message is read.
        responder.send(&request.initial_message).map_err(|error| {
            fail(RunFailure::Io {
                source: Arc::new(error),
            })
        })?;

        let (sender, receiver) = mpsc::channel();
        spawn_message_reader(stdout, sender.clone());
        spawn_output_reader(stderr, sender);

        let outcome = pump(
            &plugin,
            receiver,
            delegate,
            &responder,
            request.cancellation.as_deref(),
        );

        if outcome.cancelled || outcome.failure.is_some() {
            if let Err(error) = child.kill() {
                warn!(
                    target: RUNNER_TARGET,
                    plugin = %plugin,
                    error = %error,
                    "failed to kill plugin process"
                );
            }
            let _ = child.wait();
            return match outcome.failure {
                Some(failure) => Err(failure),
                None => Err(fail(RunFailure::Cancelled)),
            };
        }

        let status = child.wait().map_err(|error| {
            fail(RunFailure::Io {
                source: Arc::new(error),
            })
        })?;
        let exit_code = status.code().unwrap_or(-1);
        debug!(
            target: RUNNER_TARGET,
            plugin = %plugin,
            exit_code,
            "plugin process exited"
        );
        Ok(exit_code)
    }
}

/// One item funnelled onto the session queue.
pub(crate) enum Event {
    /// A complete frame from the plugin.
    Message(Vec<u8>),
    /// The frame stream reached end of stream.
    MessagesClosed,
    /// Bytes from the free-form output stream.
    Output(Vec<u8>),
    /// The output stream reached end of stream.
    OutputClosed,
    /// Reading the frame stream failed.
    ReadFailed(io::Error),
}

pub(crate) struct PumpOutcome {
    pub(crate) failure: Option<InvocationError>,
    pub(crate) cancelled: bool,
}

/// Drains events until both child streams close, a delegate call fails, or
/// the caller cancels. This loop is the session's serialising queue.
pub(crate) fn pump(
    plugin: &str,
    receiver: Receiver<Event>,
    delegate: &mut dyn ScriptRunnerDelegate,
    responder: &Responder,
    cancellation: Option<&AtomicBool>,
) -> PumpOutcome {
    let mut messages_closed = false;
    let mut output_closed = false;

    while !(messages_closed && output_closed) {
        if let Some(flag) = cancellation
            && flag.load(Ordering::SeqCst)
        {
            return PumpOutcome {
                failure: None,
                cancelled: true,
            };
        }

        match receiver.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(Event::Message(payload)) => {
                if let Err(failure) = delegate.handle_message(&payload, responder) {
                    return PumpOutcome {
                        failure: Some(failure),
                        cancelled: false,
                    };
                }
            }
            Ok(Event::Output(data)) => delegate.handle_output(&data),
            Ok(Event::MessagesClosed) => messages_closed = true,
            Ok(Event::OutputClosed) => output_closed = true,
            Ok(Event::ReadFailed(error)) => {
                return PumpOutcome {
                    failure: Some(InvocationError::RunFailed {
                        plugin: plugin.to_owned(),
                        source: RunFailure::Io {
                            source: Arc::new(error),
                        },
                    }),
                    cancelled: false,
                };
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    PumpOutcome {
        failure: None,
        cancelled: false,
    }
}

fn spawn_message_reader(mut stream: impl Read + Send + 'static, sender: mpsc::Sender<Event>) {
    let _ = thread::spawn(move || {
        loop {
            match frame::read_frame(&mut stream) {
                Ok(Some(payload)) => {
                    if sender.send(Event::Message(payload)).is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    let _ = sender.send(Event::MessagesClosed);
                    return;
                }
                Err(error) => {
                    let _ = sender.send(Event::ReadFailed(error));
                    return;
                }
            }
        }
    });
}

fn spawn_output_reader(mut stream: impl Read + Send + 'static, sender: mpsc::Sender<Event>) {
    let _ = thread::spawn(move || {
        let mut buffer = [0_u8; OUTPUT_CHUNK_LEN];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) => {
                    let _ = sender.send(Event::OutputClosed);
                    return;
                }
                Ok(read) => {
                    if sender.send(Event::Output(buffer[..read].to_vec())).is_err() {
                        return;
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => {
                    let _ = sender.send(Event::OutputClosed);
                    return;
                }
            }
        }
    });
}
