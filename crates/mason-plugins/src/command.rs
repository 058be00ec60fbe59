//! Host-side command descriptions captured from a plugin.
//!
//! These are the durable results of a session: the build graph consumes
//! [`BuildCommand`]s as nodes whose outputs gate downstream work, and runs
//! every [`PrebuildCommand`] before each build, scanning its output
//! directory afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration shared by build and prebuild commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfiguration {
    display_name: Option<String>,
    executable: PathBuf,
    arguments: Vec<String>,
    environment: BTreeMap<String, String>,
    working_directory: Option<PathBuf>,
}

impl CommandConfiguration {
    /// Creates a command configuration.
    #[must_use]
    pub fn new(
        display_name: Option<String>,
        executable: PathBuf,
        arguments: Vec<String>,
        environment: BTreeMap<String, String>,
        working_directory: Option<PathBuf>,
    ) -> Self {
        Self {
            display_name,
            executable,
            arguments,
            environment,
            working_directory,
        }
    }

    /// Returns the user-facing description.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the argument vector.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Returns the environment map.
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Returns the working directory, when one is set.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }
}

/// A command the build graph runs when its outputs are needed.
///
/// The input list always starts with every declared tool path for the
/// plugin, in sorted order, so the graph re-runs the command whenever a
/// tool changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    configuration: CommandConfiguration,
    input_files: Vec<PathBuf>,
    output_files: Vec<PathBuf>,
}

impl BuildCommand {
    /// Creates a build command.
    #[must_use]
    pub fn new(
        configuration: CommandConfiguration,
        input_files: Vec<PathBuf>,
        output_files: Vec<PathBuf>,
    ) -> Self {
        Self {
            configuration,
            input_files,
            output_files,
        }
    }

    /// Returns the command configuration.
    #[must_use]
    pub fn configuration(&self) -> &CommandConfiguration {
        &self.configuration
    }

    /// Returns the input files, tool paths first.
    #[must_use]
    pub fn input_files(&self) -> &[PathBuf] {
        &self.input_files
    }

    /// Returns the output files.
    #[must_use]
    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }
}

/// A command run before every build, with outputs discovered by scanning a
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuildCommand {
    configuration: CommandConfiguration,
    output_files_directory: PathBuf,
}

impl PrebuildCommand {
    /// Creates a prebuild command.
    #[must_use]
    pub fn new(configuration: CommandConfiguration, output_files_directory: PathBuf) -> Self {
        Self {
            configuration,
            output_files_directory,
        }
    }

    /// Returns the command configuration.
    #[must_use]
    pub fn configuration(&self) -> &CommandConfiguration {
        &self.configuration
    }

    /// Returns the directory scanned for outputs after the command runs.
    #[must_use]
    pub fn output_files_directory(&self) -> &Path {
        &self.output_files_directory
    }
}
