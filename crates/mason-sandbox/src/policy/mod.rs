//! Sandbox policy definition and builder helpers.
//!
//! A [`SandboxPolicy`] starts out granting nothing: no filesystem access
//! beyond the plugin executable itself, no environment, no network. Every
//! capability a plugin process gets is declared explicitly by the caller.
//! Dynamically linked plugins additionally need the host's shared-library
//! roots readable; [`SandboxPolicy::allow_system_libraries`] derives that
//! set from the dynamic loader's own configuration rather than assuming a
//! fixed layout.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// How many levels of `include` directives loader configuration files may
/// nest before parsing stops.
const INCLUDE_DEPTH_LIMIT: usize = 3;

/// Environment inheritance strategy applied to sandboxed processes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvironmentPolicy {
    /// Remove all environment variables before launching the child.
    #[default]
    Isolated,
    /// Allow only the named environment variables to be inherited.
    AllowList(BTreeSet<String>),
    /// Inherit the full environment unchanged.
    InheritAll,
}

/// A network destination a sandboxed plugin process may reach.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkDestination {
    /// Local Unix domain sockets.
    ///
    /// These live on the filesystem and are reachable through the policy's
    /// path grants; no host networking is involved.
    UnixSockets,
    /// TCP connections to localhost, optionally restricted to given ports.
    ///
    /// An empty port list permits every localhost port.
    LocalTcp {
        /// Permitted ports; empty means all.
        ports: Vec<u16>,
    },
    /// The Docker daemon's control socket.
    Docker,
    /// Any host whose name matches the pattern, optionally restricted to
    /// given ports.
    Hosts {
        /// Host-name pattern, e.g. `*.example.org`.
        pattern: String,
        /// Permitted ports; empty means all.
        ports: Vec<u16>,
    },
}

impl NetworkDestination {
    /// Returns whether reaching this destination needs the host's network
    /// namespace, as opposed to a filesystem-level socket grant.
    #[must_use]
    pub fn needs_host_network(&self) -> bool {
        matches!(self, Self::LocalTcp { .. } | Self::Hosts { .. })
    }
}

/// Set of network destinations granted to a sandboxed process.
///
/// The default policy denies all networking. Destinations are additive and
/// each is enforced by the mechanism that fits it: socket-backed
/// destinations become filesystem grants, TCP destinations open the host
/// network. Port lists and host patterns ride along for enforcement layers
/// that can filter at that granularity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkPolicy {
    destinations: BTreeSet<NetworkDestination>,
}

impl NetworkPolicy {
    /// Creates a policy that denies all networking.
    #[must_use]
    pub fn deny() -> Self {
        Self::default()
    }

    /// Grants an additional network destination.
    #[must_use]
    pub fn allow(mut self, destination: NetworkDestination) -> Self {
        let _ = self.destinations.insert(destination);
        self
    }

    /// Returns true when no destination is permitted.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Returns the permitted destinations.
    #[must_use]
    pub fn destinations(&self) -> &BTreeSet<NetworkDestination> {
        &self.destinations
    }

    /// Returns whether any granted destination needs the host's network
    /// namespace.
    #[must_use]
    pub fn needs_host_network(&self) -> bool {
        self.destinations
            .iter()
            .any(NetworkDestination::needs_host_network)
    }
}

/// Declarative description of the resources a plugin process may access.
///
/// ```
/// use mason_sandbox::{NetworkDestination, SandboxPolicy};
///
/// let policy = SandboxPolicy::new()
///     .allow_system_libraries()
///     .allow_writable_directory("/tmp/plugin-output")
///     .allow_network(NetworkDestination::UnixSockets);
/// assert!(!policy.network_policy().is_denied());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SandboxPolicy {
    writable_directories: Vec<PathBuf>,
    read_only_directories: Vec<PathBuf>,
    tool_search_directories: Vec<PathBuf>,
    environment: EnvironmentPolicy,
    network: NetworkPolicy,
}

impl SandboxPolicy {
    /// Creates a policy granting nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants read access to the shared-library roots the dynamic loader
    /// searches, so dynamically linked plugin executables can start.
    ///
    /// The set is the loader's built-in defaults plus every directory
    /// configured in `/etc/ld.so.conf` (including its `include`
    /// directives). Roots absent on this host are skipped at launch time.
    #[must_use]
    pub fn allow_system_libraries(mut self) -> Self {
        self.read_only_directories.extend(loader_search_roots());
        self
    }

    /// Grants read-write access to the provided directory.
    #[must_use]
    pub fn allow_writable_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.writable_directories.push(path.into());
        self
    }

    /// Grants read-only access to the provided directory.
    #[must_use]
    pub fn allow_read_only_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.read_only_directories.push(path.into());
        self
    }

    /// Grants execute and read access to the tools under the provided
    /// directory.
    #[must_use]
    pub fn allow_tool_search_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_search_directories.push(path.into());
        self
    }

    /// Whitelists an environment variable for inheritance.
    ///
    /// When the policy is already [`EnvironmentPolicy::InheritAll`] this is a
    /// no-op because the full environment is already permitted.
    #[must_use]
    pub fn allow_environment_variable(mut self, key: impl Into<String>) -> Self {
        self.environment = self.environment.clone().with_allowed(key.into());
        self
    }

    /// Inherit all environment variables from the parent process.
    #[must_use]
    pub fn allow_full_environment(mut self) -> Self {
        self.environment = EnvironmentPolicy::InheritAll;
        self
    }

    /// Grants an additional network destination.
    #[must_use]
    pub fn allow_network(mut self, destination: NetworkDestination) -> Self {
        self.network = self.network.allow(destination);
        self
    }

    /// Replaces the network policy wholesale.
    #[must_use]
    pub fn with_network_policy(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }

    /// Returns the writable directories.
    #[must_use]
    pub fn writable_directories(&self) -> &[PathBuf] {
        &self.writable_directories
    }

    /// Returns the read-only directories.
    #[must_use]
    pub fn read_only_directories(&self) -> &[PathBuf] {
        &self.read_only_directories
    }

    /// Returns the tool search directories.
    #[must_use]
    pub fn tool_search_directories(&self) -> &[PathBuf] {
        &self.tool_search_directories
    }

    /// Returns the configured environment policy.
    #[must_use]
    pub fn environment_policy(&self) -> &EnvironmentPolicy {
        &self.environment
    }

    /// Returns the network policy.
    #[must_use]
    pub fn network_policy(&self) -> &NetworkPolicy {
        &self.network
    }
}

impl EnvironmentPolicy {
    pub(crate) fn with_allowed(self, key: String) -> Self {
        match self {
            Self::Isolated => {
                let mut allow = BTreeSet::new();
                let _ = allow.insert(key);
                Self::AllowList(allow)
            }
            Self::AllowList(mut keys) => {
                let _ = keys.insert(key);
                Self::AllowList(keys)
            }
            Self::InheritAll => Self::InheritAll,
        }
    }
}

/// Shared-library roots the dynamic loader searches.
///
/// The loader's implicit defaults are always included; whatever
/// `/etc/ld.so.conf` adds on this host comes on top. Nothing here checks
/// for existence, the launcher skips absent read-only roots when it
/// assembles the sandbox.
fn loader_search_roots() -> BTreeSet<PathBuf> {
    let mut roots: BTreeSet<PathBuf> = ["/lib", "/lib64", "/usr/lib", "/usr/lib64"]
        .iter()
        .map(PathBuf::from)
        .collect();
    roots.extend(ld_so_conf_entries(Path::new("/etc/ld.so.conf"), 0));
    roots
}

/// Parses one loader configuration file into its directory entries,
/// following `include` directives up to [`INCLUDE_DEPTH_LIMIT`] levels.
fn ld_so_conf_entries(conf: &Path, depth: usize) -> Vec<PathBuf> {
    if depth > INCLUDE_DEPTH_LIMIT {
        return Vec::new();
    }
    let Ok(contents) = fs::read_to_string(conf) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for line in contents.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(pattern) = line.strip_prefix("include ") {
            entries.extend(included_conf_entries(pattern.trim(), depth + 1));
        } else {
            entries.push(PathBuf::from(line));
        }
    }
    entries
}

/// Expands one `include` pattern. Patterns are either plain files or the
/// `dir/*.suffix` form the loader uses for its drop-in directory.
fn included_conf_entries(pattern: &str, depth: usize) -> Vec<PathBuf> {
    let path = Path::new(pattern);
    let glob = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix('*'));
    let (Some(directory), Some(suffix)) = (path.parent(), glob) else {
        return ld_so_conf_entries(path, depth);
    };

    let Ok(children) = fs::read_dir(directory) else {
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = children
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|child| {
            child
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    matches.sort();
    matches
        .iter()
        .flat_map(|conf| ld_so_conf_entries(conf, depth))
        .collect()
}

#[cfg(test)]
mod tests;
