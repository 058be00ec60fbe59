//! Domain errors raised by the sandbox launcher.

use std::fmt;
use std::io;
use std::path::PathBuf;

use birdcage::error::Error as BirdcageError;
use thiserror::Error;

/// Which policy grant a path was being prepared for.
///
/// Carried in [`SandboxError::GrantUnavailable`] so callers can tell a
/// missing output directory from a missing plugin executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyGrant {
    /// A writable directory grant.
    Writable,
    /// A tool search directory grant.
    ToolSearch,
    /// The plugin executable itself.
    Program,
}

impl PolicyGrant {
    /// Returns the grant name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Writable => "writable directory",
            Self::ToolSearch => "tool search directory",
            Self::Program => "plugin executable",
        }
    }
}

impl fmt::Display for PolicyGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while preparing or launching a sandboxed plugin process.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The plugin executable was named by a relative path.
    #[error("plugin executables must be launched by absolute path, got {program}")]
    RelativeProgramPath {
        /// The offending program path.
        program: PathBuf,
    },

    /// A load-bearing policy grant names a path that cannot be resolved on
    /// this host.
    #[error("cannot grant {grant} access to {path}: {source}")]
    GrantUnavailable {
        /// The grant being prepared.
        grant: PolicyGrant,
        /// The path that failed to resolve.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The platform facility refused the assembled configuration.
    #[error("the platform sandbox rejected the configuration: {0}")]
    Rejected(#[from] BirdcageError),
}
