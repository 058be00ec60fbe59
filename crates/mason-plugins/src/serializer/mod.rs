//! Flattens the package graph into the wire's id-keyed tables.
//!
//! A [`ContextSerializer`] accumulates every path, module, product, package
//! and project referenced by an action into dense tables, deduplicating as
//! it goes, and finally assembles the [`WireInput`] snapshot. Ids are
//! indices into the serializer's backing vectors and are stable only within
//! a single serializer instance; a new session gets a new serializer.
//!
//! Paths serialise as `(parent id, component)` pairs so directory prefixes
//! are shared between entries instead of repeated.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::graph::{Module, ModuleKind, Package, Project};
use crate::protocol::{
    PackageId, PathId, ProductId, ProjectId, ProjectTargetId, TargetId, WireInput, WirePackage,
    WirePath, WireProduct, WireProject, WireProjectTarget, WireTarget, WireTool,
};
use crate::tools::ResolvedTool;

/// Failure while flattening the context snapshot.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SerialiseError {
    message: String,
}

impl SerialiseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Accumulates the id-keyed tables of one context snapshot.
#[derive(Debug, Default)]
pub struct ContextSerializer {
    paths: Vec<WirePath>,
    path_ids: HashMap<PathBuf, PathId>,
    targets: Vec<WireTarget>,
    target_ids: HashMap<String, Option<TargetId>>,
    products: Vec<WireProduct>,
    product_ids: HashMap<String, ProductId>,
    packages: Vec<WirePackage>,
    package_ids: HashMap<String, PackageId>,
    projects: Vec<WireProject>,
    project_ids: HashMap<String, ProjectId>,
    project_targets: Vec<WireProjectTarget>,
    project_target_ids: HashMap<(String, String), ProjectTargetId>,
}

impl ContextSerializer {
    /// Creates an empty serializer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialises an absolute path, sharing prefixes with prior entries.
    ///
    /// # Errors
    ///
    /// Returns a [`SerialiseError`] for relative or otherwise malformed
    /// paths.
    pub fn serialise_path(&mut self, path: &Path) -> Result<PathId, SerialiseError> {
        if !path.is_absolute() {
            return Err(SerialiseError::new(format!(
                "path '{}' is not absolute",
                path.display()
            )));
        }
        if let Some(&id) = self.path_ids.get(path) {
            return Ok(id);
        }

        let entry = match path.parent() {
            None => WirePath {
                base: None,
                subpath: path.to_string_lossy().into_owned(),
            },
            Some(parent) => {
                let base = self.serialise_path(parent)?;
                let component = path.file_name().ok_or_else(|| {
                    SerialiseError::new(format!(
                        "path '{}' has no final component",
                        path.display()
                    ))
                })?;
                WirePath {
                    base: Some(base),
                    subpath: component.to_string_lossy().into_owned(),
                }
            }
        };

        let id = PathId(self.paths.len());
        self.paths.push(entry);
        let _ = self.path_ids.insert(path.to_path_buf(), id);
        Ok(id)
    }

    /// Serialises a module, returning `None` for kinds the plugin context
    /// cannot represent (plugins and binary artifacts).
    ///
    /// # Errors
    ///
    /// Returns a [`SerialiseError`] when one of the module's paths is
    /// malformed.
    pub fn serialise_module(&mut self, module: &Module) -> Result<Option<TargetId>, SerialiseError> {
        if let Some(&id) = self.target_ids.get(module.name()) {
            return Ok(id);
        }

        let id = match module.kind() {
            ModuleKind::Library | ModuleKind::Executable => {
                let directory = self.serialise_path(module.directory())?;
                let source_files = module
                    .source_files()
                    .iter()
                    .map(|file| self.serialise_path(file))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = TargetId(self.targets.len());
                self.targets.push(WireTarget {
                    name: module.name().to_owned(),
                    directory,
                    source_files,
                });
                Some(id)
            }
            ModuleKind::Plugin(_) | ModuleKind::Binary { .. } => None,
        };

        let _ = self.target_ids.insert(module.name().to_owned(), id);
        Ok(id)
    }

    /// Serialises a package together with its modules and products.
    ///
    /// # Errors
    ///
    /// Returns a [`SerialiseError`] when any contained path is malformed.
    pub fn serialise_package(&mut self, package: &Package) -> Result<PackageId, SerialiseError> {
        if let Some(&id) = self.package_ids.get(package.identity()) {
            return Ok(id);
        }

        let directory = self.serialise_path(package.directory())?;

        let mut target_ids = Vec::new();
        for module in package.modules() {
            if let Some(id) = self.serialise_module(module)? {
                target_ids.push(id);
            }
        }

        let mut product_ids = Vec::new();
        for product in package.products() {
            let id = if let Some(&id) = self.product_ids.get(product.name()) {
                id
            } else {
                let members = product
                    .module_names()
                    .iter()
                    .filter_map(|name| {
                        package
                            .module(name)
                            .and_then(|module| self.serialise_module(module).transpose())
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let id = ProductId(self.products.len());
                self.products.push(WireProduct {
                    name: product.name().to_owned(),
                    targets: members,
                });
                let _ = self.product_ids.insert(product.name().to_owned(), id);
                id
            };
            product_ids.push(id);
        }

        let id = PackageId(self.packages.len());
        self.packages.push(WirePackage {
            identity: package.identity().to_owned(),
            display_name: package.display_name().to_owned(),
            directory,
            targets: target_ids,
            products: product_ids,
        });
        let _ = self.package_ids.insert(package.identity().to_owned(), id);
        Ok(id)
    }

    /// Serialises a project together with its targets.
    ///
    /// # Errors
    ///
    /// Returns a [`SerialiseError`] when the project directory is malformed.
    pub fn serialise_project(&mut self, project: &Project) -> Result<ProjectId, SerialiseError> {
        if let Some(&id) = self.project_ids.get(project.name()) {
            return Ok(id);
        }

        let directory = self.serialise_path(project.directory())?;
        let id = ProjectId(self.projects.len());
        self.projects.push(WireProject {
            name: project.name().to_owned(),
            directory,
            targets: Vec::new(),
        });
        let _ = self.project_ids.insert(project.name().to_owned(), id);

        let mut target_ids = Vec::new();
        for target in project.targets() {
            let target_id = ProjectTargetId(self.project_targets.len());
            self.project_targets.push(WireProjectTarget {
                name: target.name().to_owned(),
                project: id,
            });
            let _ = self
                .project_target_ids
                .insert((project.name().to_owned(), target.name().to_owned()), target_id);
            target_ids.push(target_id);
        }
        self.projects[id.0].targets = target_ids;
        Ok(id)
    }

    /// Serialises one project target, returning `None` when the project
    /// does not contain it.
    ///
    /// # Errors
    ///
    /// Returns a [`SerialiseError`] when the owning project cannot be
    /// serialised.
    pub fn serialise_project_target(
        &mut self,
        project: &Project,
        target_name: &str,
    ) -> Result<Option<ProjectTargetId>, SerialiseError> {
        let _ = self.serialise_project(project)?;
        Ok(self
            .project_target_ids
            .get(&(project.name().to_owned(), target_name.to_owned()))
            .copied())
    }

    /// Assembles the final snapshot, serialising the session-wide paths and
    /// the accessible-tool map.
    ///
    /// # Errors
    ///
    /// Returns a [`SerialiseError`] when any remaining path is malformed.
    pub fn into_wire_input(
        mut self,
        work_directory: &Path,
        tool_search_directories: &[PathBuf],
        pkg_config_search_directories: &[PathBuf],
        sdk_root: Option<&Path>,
        tools: &BTreeMap<String, ResolvedTool>,
    ) -> Result<WireInput, SerialiseError> {
        let plugin_work_directory = self.serialise_path(work_directory)?;
        let tool_search_directories = tool_search_directories
            .iter()
            .map(|dir| self.serialise_path(dir))
            .collect::<Result<Vec<_>, _>>()?;
        let pkg_config_search_directories = pkg_config_search_directories
            .iter()
            .map(|dir| self.serialise_path(dir))
            .collect::<Result<Vec<_>, _>>()?;
        let sdk_root = sdk_root.map(|root| self.serialise_path(root)).transpose()?;

        let mut accessible_tools = BTreeMap::new();
        for (name, tool) in tools {
            let path = self.serialise_path(tool.path())?;
            let _ = accessible_tools.insert(
                name.clone(),
                WireTool {
                    path,
                    triples: tool.triples().map(<[String]>::to_vec),
                },
            );
        }

        Ok(WireInput {
            paths: self.paths,
            targets: self.targets,
            products: self.products,
            packages: self.packages,
            projects: self.projects,
            project_targets: self.project_targets,
            plugin_work_directory,
            tool_search_directories,
            pkg_config_search_directories,
            sdk_root,
            accessible_tools,
        })
    }
}

#[cfg(test)]
mod tests;
