//! Launches plugin processes under a [`SandboxPolicy`] via `birdcage`.
//!
//! This is the only place the declarative policy meets the platform
//! facility. Grants fall into two classes: load-bearing ones (writable
//! directories, tool search directories, the plugin executable itself)
//! whose paths must resolve or the launch fails, and advisory ones
//! (read-only roots, the Docker socket) that are skipped with a warning
//! when absent on this host, since policies routinely name SDK roots and
//! loader directories that only some machines have.
//!
//! Network destinations map individually: socket-backed destinations
//! become filesystem grants, TCP destinations open the host network
//! namespace. Port lists and host patterns stay on the policy for
//! enforcement layers that can honour them.

use std::collections::BTreeSet;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use birdcage::process::{Child, Command, Output};
use birdcage::{Birdcage, Exception, Sandbox as BirdcageTrait};
use tracing::warn;

use crate::error::{PolicyGrant, SandboxError};
use crate::policy::{EnvironmentPolicy, NetworkDestination, SandboxPolicy};

const SANDBOX_TARGET: &str = "mason_sandbox";

/// Control socket of the Docker daemon.
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Builder for sandboxed commands.
pub type SandboxCommand = Command;
/// Handle to a running sandboxed process.
pub type SandboxChild = Child;
/// Captured output from a sandboxed process.
pub type SandboxOutput = Output;

/// Launches plugin processes inside a restrictive sandbox.
#[derive(Debug)]
pub struct Sandbox {
    policy: SandboxPolicy,
}

impl Sandbox {
    /// Creates a sandbox with the supplied policy.
    #[must_use]
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }

    /// Spawns the provided command inside the configured sandbox.
    ///
    /// The command's program path must be absolute. Policy violations
    /// inside the child are terminated by the OS facility and surface to
    /// the caller as a nonzero exit status.
    ///
    /// # Errors
    ///
    /// Returns a [`SandboxError`] when a load-bearing grant cannot be
    /// resolved or the platform facility rejects the configuration.
    pub fn spawn(&self, command: SandboxCommand) -> Result<SandboxChild, SandboxError> {
        let program = Path::new(command.get_program());
        if !program.is_absolute() {
            return Err(SandboxError::RelativeProgramPath {
                program: program.to_path_buf(),
            });
        }
        let program = required_path(program, PolicyGrant::Program)?;
        let exceptions = self.grants(&program)?;

        // Applying exceptions strips the parent's own environment before
        // the fork; reinstate it once the child is on its way.
        let parent_environment = ParentEnvironment::snapshot();
        let spawned = activate_and_spawn(exceptions, command);
        parent_environment.reinstate();
        spawned
    }

    /// Maps every policy grant onto a platform exception.
    fn grants(&self, program: &Path) -> Result<Vec<Exception>, SandboxError> {
        let mut exceptions = Vec::new();

        for path in advisory_paths(self.policy.read_only_directories()) {
            exceptions.push(Exception::Read(path));
        }
        for path in required_paths(self.policy.writable_directories(), PolicyGrant::Writable)? {
            exceptions.push(Exception::WriteAndRead(path));
        }
        for path in required_paths(
            self.policy.tool_search_directories(),
            PolicyGrant::ToolSearch,
        )? {
            exceptions.push(Exception::ExecuteAndRead(path));
        }
        exceptions.push(Exception::ExecuteAndRead(program.to_path_buf()));

        match self.policy.environment_policy() {
            EnvironmentPolicy::Isolated => {}
            EnvironmentPolicy::AllowList(keys) => {
                exceptions.extend(keys.iter().cloned().map(Exception::Environment));
            }
            EnvironmentPolicy::InheritAll => exceptions.push(Exception::FullEnvironment),
        }

        self.network_grants(&mut exceptions);
        Ok(exceptions)
    }

    /// Translates each network destination into the mechanism that
    /// enforces it.
    fn network_grants(&self, exceptions: &mut Vec<Exception>) {
        for destination in self.policy.network_policy().destinations() {
            match destination {
                // Plain Unix sockets live on paths the policy already
                // grants; nothing extra to open here.
                NetworkDestination::UnixSockets => {}
                NetworkDestination::Docker => match fs::canonicalize(DOCKER_SOCKET) {
                    Ok(socket) => exceptions.push(Exception::WriteAndRead(socket)),
                    Err(error) => warn!(
                        target: SANDBOX_TARGET,
                        error = %error,
                        "docker destination granted but its socket is absent, skipping"
                    ),
                },
                NetworkDestination::LocalTcp { .. } | NetworkDestination::Hosts { .. } => {}
            }
        }
        if self.policy.network_policy().needs_host_network() {
            exceptions.push(Exception::Networking);
        }
    }
}

fn activate_and_spawn(
    exceptions: Vec<Exception>,
    command: SandboxCommand,
) -> Result<SandboxChild, SandboxError> {
    let mut cage = Birdcage::new();
    for exception in exceptions {
        cage.add_exception(exception)?;
    }
    Ok(cage.spawn(command)?)
}

/// Resolves load-bearing grant paths, failing on the first one this host
/// cannot provide.
fn required_paths(
    paths: &[PathBuf],
    grant: PolicyGrant,
) -> Result<BTreeSet<PathBuf>, SandboxError> {
    paths.iter().map(|path| required_path(path, grant)).collect()
}

fn required_path(path: &Path, grant: PolicyGrant) -> Result<PathBuf, SandboxError> {
    fs::canonicalize(path).map_err(|source| SandboxError::GrantUnavailable {
        grant,
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves advisory grant paths, dropping the ones absent on this host.
fn advisory_paths(paths: &[PathBuf]) -> BTreeSet<PathBuf> {
    paths
        .iter()
        .filter_map(|path| match fs::canonicalize(path) {
            Ok(resolved) => Some(resolved),
            Err(error) => {
                warn!(
                    target: SANDBOX_TARGET,
                    path = %path.display(),
                    error = %error,
                    "read-only grant skipped"
                );
                None
            }
        })
        .collect()
}

/// Snapshot of the parent process environment.
///
/// `birdcage` clears non-whitelisted variables from the current process
/// while setting up the child. The snapshot puts the parent back exactly
/// as it was: everything present afterwards is removed, then the recorded
/// pairs are reinstated.
struct ParentEnvironment {
    variables: Vec<(OsString, OsString)>,
}

impl ParentEnvironment {
    fn snapshot() -> Self {
        Self {
            variables: env::vars_os().collect(),
        }
    }

    fn reinstate(self) {
        let current: Vec<OsString> = env::vars_os().map(|(key, _)| key).collect();
        for key in current {
            // Safety: sole mutation site, iterating a materialised list.
            unsafe { env::remove_var(&key) };
        }
        for (key, value) in self.variables {
            // Safety: as above.
            unsafe { env::set_var(key, value) };
        }
    }
}

#[cfg(test)]
mod tests;
