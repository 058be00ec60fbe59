//! Sandboxing utilities for mason plugin processes.
//!
//! The `mason-sandbox` crate wraps the [`birdcage`] library behind a
//! declarative [`SandboxPolicy`]. Callers describe the directories a plugin
//! process may write, the directories it may read, the directories its
//! helper tools live in, and the network destinations it is permitted to
//! reach, then launch the process through a [`Sandbox`]. Linux namespaces
//! and `seccomp-bpf` filters are applied automatically via `birdcage`.
//!
//! The policy is a plain value: which platform facility enforces it is a
//! detail of this crate, and nothing about the enforcement mechanism leaks
//! into the host/plugin protocol. A new policy grants nothing; every
//! capability is declared:
//! - Writable, read-only and tool-search directories are separate grants.
//!   Load-bearing grants must resolve on the host, advisory ones (the
//!   read-only set) are skipped when absent.
//! - [`SandboxPolicy::allow_system_libraries`] derives the dynamic
//!   loader's search roots from its configuration so dynamically linked
//!   plugins can start without exposing the wider filesystem.
//! - Network destinations are enforced individually: socket-backed ones
//!   become filesystem grants, TCP ones open the host network.
//! - Environment variables are stripped unless whitelisted.
//!
//! ```rust,no_run
//! use mason_sandbox::{Sandbox, SandboxCommand, SandboxPolicy, process::Stdio};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = SandboxPolicy::new()
//!     .allow_system_libraries()
//!     .allow_writable_directory("/tmp/plugin-work")
//!     .allow_read_only_directory("/srv/package");
//!
//! let mut command = SandboxCommand::new("/tmp/plugin-work/plugin");
//! command.stdin(Stdio::piped()).stdout(Stdio::piped());
//!
//! let sandbox = Sandbox::new(policy);
//! let child = sandbox.spawn(command)?;
//! # drop(child);
//! # Ok(()) }
//! ```

mod error;
mod policy;
mod sandbox;

pub use birdcage::process;
pub use error::{PolicyGrant, SandboxError};
pub use policy::{EnvironmentPolicy, NetworkDestination, NetworkPolicy, SandboxPolicy};
pub use sandbox::{Sandbox, SandboxChild, SandboxCommand, SandboxOutput};
