//! Compilation of plugin scripts with content-addressed caching.
//!
//! Plugin sources are compiled to a host executable at most once per
//! fingerprint. The fingerprint digests everything that can change the
//! produced binary: source contents and their paths relative to the plugin
//! root, the declared tools version, the toolchain identity, and the
//! compile flags. A cache hit returns the previously produced executable
//! without running the compiler; concurrent requests for the same
//! fingerprint coalesce onto a single compile.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::fs::FileSystem;

const COMPILER_TARGET: &str = "mason_plugins::compiler";

/// Length of the fingerprint prefix used in artifact directory names.
const FINGERPRINT_PREFIX_LEN: usize = 16;

/// Errors raised while preparing a plugin executable.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A plugin source file could not be read for fingerprinting.
    #[error("could not read plugin source {path}: {source}")]
    SourceRead {
        /// Source file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The cache directory for the artifact could not be created.
    #[error("could not create plugin cache directory {path}: {source}")]
    CacheDirectory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The compiler process could not be launched.
    #[error("could not launch plugin compiler {compiler}: {source}")]
    CompilerLaunch {
        /// Compiler executable.
        compiler: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Identity and invocation shape of the toolchain compiling plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainDescription {
    compiler: PathBuf,
    version: String,
    default_flags: Vec<String>,
}

impl ToolchainDescription {
    /// Creates a toolchain description.
    #[must_use]
    pub fn new(compiler: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            version: version.into(),
            default_flags: Vec::new(),
        }
    }

    /// Attaches flags passed on every compile, e.g. linker flags implied by
    /// the target sandbox policy.
    #[must_use]
    pub fn with_default_flags(mut self, default_flags: Vec<String>) -> Self {
        self.default_flags = default_flags;
        self
    }

    /// Returns the compiler executable.
    #[must_use]
    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    /// Returns the toolchain version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// One compile request.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    plugin_name: String,
    plugin_root: PathBuf,
    sources: Vec<PathBuf>,
    tools_version: String,
    extra_flags: Vec<String>,
}

impl CompileRequest {
    /// Creates a compile request for the named plugin.
    #[must_use]
    pub fn new(
        plugin_name: impl Into<String>,
        plugin_root: impl Into<PathBuf>,
        sources: Vec<PathBuf>,
        tools_version: impl Into<String>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            plugin_root: plugin_root.into(),
            sources,
            tools_version: tools_version.into(),
            extra_flags: Vec::new(),
        }
    }

    /// Attaches request-specific compile flags.
    #[must_use]
    pub fn with_extra_flags(mut self, extra_flags: Vec<String>) -> Self {
        self.extra_flags = extra_flags;
        self
    }

    /// Returns the plugin name.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }
}

/// Outcome of preparing a plugin executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCompilationResult {
    succeeded: bool,
    command_line: Vec<String>,
    executable: PathBuf,
    output: String,
    cache_hit: bool,
}

impl PluginCompilationResult {
    /// Returns whether an executable is ready to run.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Returns the compiler command line, for rendering failures.
    #[must_use]
    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    /// Returns the executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the captured compiler output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns whether compilation was skipped because of a cache hit.
    #[must_use]
    pub const fn cache_hit(&self) -> bool {
        self.cache_hit
    }
}

/// Compiles plugin scripts, hitting a content-addressed cache when inputs
/// are unchanged.
///
/// The cache is process-wide; a per-fingerprint mutex enforces at most one
/// concurrent compile per key.
#[derive(Debug)]
pub struct PluginCompiler<F> {
    cache_directory: PathBuf,
    toolchain: ToolchainDescription,
    fs: Arc<F>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<F: FileSystem> PluginCompiler<F> {
    /// Creates a compiler writing artifacts under the given cache directory.
    #[must_use]
    pub fn new(cache_directory: impl Into<PathBuf>, toolchain: ToolchainDescription, fs: Arc<F>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            toolchain,
            fs,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns an executable for the request, compiling when the cache has
    /// no artifact for the request's fingerprint.
    ///
    /// `on_compile_start` runs once when an actual compile begins, after
    /// the cache has been consulted; it never runs on a cache hit.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] when sources cannot be read, the cache
    /// directory cannot be created, or the compiler cannot be launched. A
    /// compiler that runs but fails is reported through the result's
    /// `succeeded` flag, not as an error.
    pub fn compile(
        &self,
        request: &CompileRequest,
        on_compile_start: &mut dyn FnMut(),
    ) -> Result<PluginCompilationResult, CompileError> {
        let fingerprint = self.fingerprint(request)?;
        let artifact_directory = self.cache_directory.join(format!(
            "{}-{}",
            request.plugin_name,
            &fingerprint[..FINGERPRINT_PREFIX_LEN]
        ));
        let executable = artifact_directory.join(&request.plugin_name);
        let command_line = self.command_line(request, &executable);

        if self.fs.exists(&executable) {
            debug!(
                target: COMPILER_TARGET,
                plugin = request.plugin_name(),
                executable = %executable.display(),
                "plugin executable cache hit"
            );
            return Ok(cache_hit_result(command_line, executable));
        }

        let slot = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                in_flight
                    .entry(fingerprint.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        // A concurrent compile may have produced the artifact while this
        // request waited on the fingerprint lock.
        if self.fs.exists(&executable) {
            return Ok(cache_hit_result(command_line, executable));
        }

        on_compile_start();
        debug!(
            target: COMPILER_TARGET,
            plugin = request.plugin_name(),
            fingerprint = %fingerprint,
            "compiling plugin"
        );

        self.fs
            .create_directory(&artifact_directory, true)
            .map_err(|source| CompileError::CacheDirectory {
                path: artifact_directory.clone(),
                source: Arc::new(source),
            })?;

        let output = Command::new(self.toolchain.compiler())
            .args(&self.toolchain.default_flags)
            .args(&request.extra_flags)
            .args(&request.sources)
            .arg("-o")
            .arg(&executable)
            .output()
            .map_err(|source| CompileError::CompilerLaunch {
                compiler: self.toolchain.compiler().to_path_buf(),
                source: Arc::new(source),
            })?;

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        let succeeded = output.status.success() && self.fs.exists(&executable);

        Ok(PluginCompilationResult {
            succeeded,
            command_line,
            executable,
            output: captured,
            cache_hit: false,
        })
    }

    /// Digests everything that determines the produced binary.
    fn fingerprint(&self, request: &CompileRequest) -> Result<String, CompileError> {
        let mut hasher = Sha256::new();
        hasher.update(self.toolchain.compiler().to_string_lossy().as_bytes());
        hasher.update([0_u8]);
        hasher.update(self.toolchain.version().as_bytes());
        hasher.update([0_u8]);
        for flag in self
            .toolchain
            .default_flags
            .iter()
            .chain(&request.extra_flags)
        {
            hasher.update(flag.as_bytes());
            hasher.update([0_u8]);
        }
        hasher.update(request.tools_version.as_bytes());
        hasher.update([0_u8]);

        let mut sources: Vec<&PathBuf> = request.sources.iter().collect();
        sources.sort();
        for source in sources {
            let relative = source.strip_prefix(&request.plugin_root).unwrap_or(source);
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0_u8]);
            let contents = self.fs.read(source).map_err(|error| CompileError::SourceRead {
                path: source.clone(),
                source: Arc::new(error),
            })?;
            hasher.update(&contents);
            hasher.update([0_u8]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    fn command_line(&self, request: &CompileRequest, executable: &Path) -> Vec<String> {
        let mut command_line = vec![self.toolchain.compiler().to_string_lossy().into_owned()];
        command_line.extend(self.toolchain.default_flags.iter().cloned());
        command_line.extend(request.extra_flags.iter().cloned());
        command_line.extend(
            request
                .sources
                .iter()
                .map(|source| source.to_string_lossy().into_owned()),
        );
        command_line.push("-o".to_owned());
        command_line.push(executable.to_string_lossy().into_owned());
        command_line
    }
}

fn cache_hit_result(command_line: Vec<String>, executable: PathBuf) -> PluginCompilationResult {
    PluginCompilationResult {
        succeeded: true,
        command_line,
        executable,
        output: String::new(),
        cache_hit: true,
    }
}

#[cfg(test)]
mod tests;
