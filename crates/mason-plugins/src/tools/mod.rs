//! Resolution of the tools a plugin is permitted to invoke.
//!
//! A plugin's helper tools come from two places: executable modules and
//! products built by the enclosing build (resolved to concrete paths only
//! by the build scheduler, via a [`BuiltToolResolver`]), and prebuilt
//! binary artifacts vending executables for particular triples. The broker
//! walks the plugin's dependency edges for the current build environment
//! and produces the name-keyed tool map sent to the plugin.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::graph::{BuildEnvironment, Dependency, Module, ModuleKind, PackageGraph};

/// Errors raised while collecting a plugin's accessible tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A product dependency could not be resolved in the graph.
    #[error("no product named '{name}' in the graph")]
    ProductNotFound {
        /// Product name that was looked up.
        name: String,
    },

    /// A product dependency does not map to exactly one executable module.
    #[error("product '{name}' does not contain exactly one executable module")]
    ProductNotExecutable {
        /// Product name.
        name: String,
    },

    /// A module dependency could not be resolved in the graph.
    #[error("no module named '{name}' in the graph")]
    ModuleNotFound {
        /// Module name that was looked up.
        name: String,
    },
}

/// A named executable a plugin may invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessibleTool {
    /// Produced by the enclosing build; the path is relative to the build
    /// products directory and resolved later by the scheduler.
    Built {
        /// Tool name.
        name: String,
        /// Path relative to the build products directory.
        path: PathBuf,
    },
    /// Shipped prebuilt inside a binary artifact.
    Vended {
        /// Tool name.
        name: String,
        /// Absolute path inside the artifact.
        path: PathBuf,
        /// Triples the executable supports, version suffixes stripped.
        supported_triples: Vec<String>,
    },
}

impl AccessibleTool {
    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Built { name, .. } | Self::Vended { name, .. } => name,
        }
    }
}

/// Origin of a resolved tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOrigin {
    /// Produced by the enclosing build.
    Built,
    /// Shipped prebuilt inside a binary artifact.
    Vended,
}

/// A tool with its final absolute path, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    path: PathBuf,
    triples: Option<Vec<String>>,
    origin: ToolOrigin,
}

impl ResolvedTool {
    /// Creates a resolved tool.
    #[must_use]
    pub fn new(path: PathBuf, triples: Option<Vec<String>>, origin: ToolOrigin) -> Self {
        Self {
            path,
            triples,
            origin,
        }
    }

    /// Returns the absolute path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the supported triples; `None` for built tools.
    #[must_use]
    pub fn triples(&self) -> Option<&[String]> {
        self.triples.as_deref()
    }

    /// Returns where the tool came from.
    #[must_use]
    pub fn origin(&self) -> ToolOrigin {
        self.origin
    }
}

/// Maps a built tool to the location the build scheduler produced it at.
///
/// Returning `None` means the tool is not available; it is omitted from the
/// accessible map rather than failing the invocation.
pub trait BuiltToolResolver {
    /// Resolves a built tool name and products-relative path to an absolute
    /// path.
    fn resolve(&self, name: &str, relative_path: &Path) -> Option<PathBuf>;
}

impl<F> BuiltToolResolver for F
where
    F: Fn(&str, &Path) -> Option<PathBuf>,
{
    fn resolve(&self, name: &str, relative_path: &Path) -> Option<PathBuf> {
        self(name, relative_path)
    }
}

/// Collects the `{tool name → accessible tool}` map for a plugin module.
///
/// # Errors
///
/// Returns a [`ToolError`] when a dependency edge cannot be resolved or a
/// product dependency has no single executable module.
pub fn accessible_tool_map(
    graph: &PackageGraph,
    plugin: &Module,
    environment: &BuildEnvironment,
    host_triple: &str,
) -> Result<BTreeMap<String, AccessibleTool>, ToolError> {
    let host = strip_triple_version(host_triple);
    let mut tools = BTreeMap::new();

    for dependency in plugin.dependencies_satisfying(environment) {
        match dependency {
            Dependency::Module { name, .. } => {
                let module = graph
                    .module(name)
                    .ok_or_else(|| ToolError::ModuleNotFound { name: name.clone() })?;
                collect_module_tools(&mut tools, module, &host);
            }
            Dependency::Product { name, .. } => {
                let (package, product) = graph
                    .product(name)
                    .ok_or_else(|| ToolError::ProductNotFound { name: name.clone() })?;
                let executables: Vec<&Module> = product
                    .module_names()
                    .iter()
                    .filter_map(|module_name| package.module(module_name))
                    .filter(|module| matches!(module.kind(), ModuleKind::Executable))
                    .collect();
                let [executable] = executables[..] else {
                    return Err(ToolError::ProductNotExecutable { name: name.clone() });
                };
                insert_tool(
                    &mut tools,
                    AccessibleTool::Built {
                        name: product.name().to_owned(),
                        path: PathBuf::from(executable.name()),
                    },
                );
            }
        }
    }

    Ok(tools)
}

fn collect_module_tools(
    tools: &mut BTreeMap<String, AccessibleTool>,
    module: &Module,
    host_triple: &str,
) {
    match module.kind() {
        ModuleKind::Executable => insert_tool(
            tools,
            AccessibleTool::Built {
                name: module.name().to_owned(),
                path: PathBuf::from(module.name()),
            },
        ),
        ModuleKind::Binary { executables } => {
            for executable in executables {
                let supported_triples: Vec<String> = executable
                    .supported_triples()
                    .iter()
                    .map(|triple| strip_triple_version(triple))
                    .collect();
                if !supported_triples.is_empty()
                    && !supported_triples.iter().any(|triple| triple == host_triple)
                {
                    continue;
                }
                insert_tool(
                    tools,
                    AccessibleTool::Vended {
                        name: executable.name().to_owned(),
                        path: executable.path().to_path_buf(),
                        supported_triples,
                    },
                );
            }
        }
        ModuleKind::Library | ModuleKind::Plugin(_) => {}
    }
}

/// Inserts a tool under the merge rules: an incoming vended entry with no
/// triples never displaces an existing entry, a vended entry with triples
/// replaces a triple-less one, and two triple-carrying vended entries for
/// the same name accumulate their triple lists.
fn insert_tool(tools: &mut BTreeMap<String, AccessibleTool>, tool: AccessibleTool) {
    match tools.entry(tool.name().to_owned()) {
        Entry::Vacant(entry) => {
            let _ = entry.insert(tool);
        }
        Entry::Occupied(mut entry) => match (entry.get_mut(), tool) {
            (
                AccessibleTool::Vended {
                    supported_triples: existing,
                    ..
                },
                AccessibleTool::Vended {
                    supported_triples: incoming,
                    name,
                    path,
                },
            ) => {
                if incoming.is_empty() {
                    // Never let a triple-less entry shadow anything.
                } else if existing.is_empty() {
                    let _ = entry.insert(AccessibleTool::Vended {
                        name,
                        path,
                        supported_triples: incoming,
                    });
                } else {
                    existing.extend(incoming);
                }
            }
            (_, tool) => {
                let _ = entry.insert(tool);
            }
        },
    }
}

/// Resolves the tool map to final absolute paths.
///
/// Built tools the resolver cannot locate are omitted.
#[must_use]
pub fn resolve_tools(
    tools: BTreeMap<String, AccessibleTool>,
    resolver: &dyn BuiltToolResolver,
) -> BTreeMap<String, ResolvedTool> {
    let mut resolved = BTreeMap::new();
    for (name, tool) in tools {
        match tool {
            AccessibleTool::Built { name: tool_name, path } => {
                if let Some(absolute) = resolver.resolve(&tool_name, &path) {
                    let _ = resolved.insert(
                        name,
                        ResolvedTool::new(absolute, None, ToolOrigin::Built),
                    );
                }
            }
            AccessibleTool::Vended {
                path,
                supported_triples,
                ..
            } => {
                let _ = resolved.insert(
                    name,
                    ResolvedTool::new(path, Some(supported_triples), ToolOrigin::Vended),
                );
            }
        }
    }
    resolved
}

/// Strips a trailing version suffix from a triple's OS component, e.g.
/// `arm64-apple-macosx13.0` becomes `arm64-apple-macosx`.
#[must_use]
pub fn strip_triple_version(triple: &str) -> String {
    triple
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
        .to_owned()
}
