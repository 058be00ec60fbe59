//! Domain errors raised by plugin invocation.
//!
//! All errors use `thiserror`-derived enums with structured context so
//! callers can inspect the failure programmatically. I/O errors are wrapped
//! in `Arc` to satisfy the `result_large_err` Clippy lint and to keep the
//! enum cloneable where callers fan a failure out to several observers.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::runner::RunFailure;

/// Errors surfaced by the plugin invocation core.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The plugin module has no owning package in the graph.
    #[error("could not find the package owning plugin '{plugin}'")]
    PackageNotFound {
        /// Name of the plugin module that was looked up.
        plugin: String,
    },

    /// The plugin output directory could not be created.
    #[error("could not create plugin output directory {path}: {source}")]
    OutputDirectoryCreation {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The context snapshot for the plugin could not be produced.
    #[error("could not serialise plugin input: {message}")]
    ContextSerialisation {
        /// Description of the failure (missing id, malformed path).
        message: String,
    },

    /// The plugin process could not be run to completion.
    #[error("running plugin '{plugin}' failed: {source}")]
    RunFailed {
        /// Name of the plugin module.
        plugin: String,
        /// Underlying failure.
        #[source]
        source: RunFailure,
    },

    /// An inbound frame from the plugin could not be decoded.
    #[error("could not decode a message from the plugin: {source}")]
    MessageDecoding {
        /// The rejected frame payload.
        frame: Vec<u8>,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The plugin used an incompatible command configuration version.
    #[error("plugin uses incompatible configuration version {actual}, expected {expected}")]
    IncompatibleApiVersion {
        /// Version the host supports.
        expected: u32,
        /// Version the plugin sent.
        actual: u32,
    },
}

#[cfg(test)]
mod tests;
