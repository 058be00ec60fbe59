//! Minimal package-graph model consumed by the invocation core.
//!
//! Package resolution and graph construction live elsewhere in the build
//! system; the invocation core only needs to walk an already-resolved graph.
//! These types model exactly that surface: packages owning modules and
//! products, dependency edges with platform conditions, and the lightweight
//! project/target pairs used by IDE-style build descriptions. Values are
//! validated on construction the same way plugin manifests are: obviously
//! malformed graphs are rejected early.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Platform a build targets or a dependency condition names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Linux hosts.
    Linux,
    /// macOS hosts.
    MacOs,
    /// Windows hosts.
    Windows,
}

impl Platform {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build configuration selected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildConfiguration {
    /// Unoptimised build with debug info.
    Debug,
    /// Optimised build.
    Release,
}

/// Platform and configuration a plugin invocation is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildEnvironment {
    platform: Platform,
    configuration: BuildConfiguration,
}

impl BuildEnvironment {
    /// Creates a build environment.
    #[must_use]
    pub const fn new(platform: Platform, configuration: BuildConfiguration) -> Self {
        Self {
            platform,
            configuration,
        }
    }

    /// Returns the target platform.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the build configuration.
    #[must_use]
    pub const fn configuration(&self) -> BuildConfiguration {
        self.configuration
    }
}

/// Entry points a plugin module can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCapability {
    /// Generates build commands for a target before each build.
    BuildTool,
    /// Runs on demand with user-supplied arguments.
    Command,
}

/// An executable shipped inside a binary artifact, pre-parsed from the
/// artifact's metadata by package resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendedExecutable {
    name: String,
    path: PathBuf,
    supported_triples: Vec<String>,
}

impl VendedExecutable {
    /// Creates a vended executable description.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        supported_triples: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            supported_triples,
        }
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the absolute path inside the artifact.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the triples this executable supports.
    #[must_use]
    pub fn supported_triples(&self) -> &[String] {
        &self.supported_triples
    }
}

/// Category of a module within a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// Ordinary library code.
    Library,
    /// An executable built from source.
    Executable,
    /// A build plugin with a declared capability.
    Plugin(PluginCapability),
    /// A prebuilt binary artifact vending executables.
    Binary {
        /// Executables contained in the artifact.
        executables: Vec<VendedExecutable>,
    },
}

/// Platform condition attached to a dependency edge.
///
/// An empty platform list matches every environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyCondition {
    platforms: Vec<Platform>,
}

impl DependencyCondition {
    /// Creates a condition restricted to the given platforms.
    #[must_use]
    pub fn when(platforms: Vec<Platform>) -> Self {
        Self { platforms }
    }

    /// Returns whether the condition holds in the given environment.
    #[must_use]
    pub fn satisfied_by(&self, environment: &BuildEnvironment) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&environment.platform())
    }
}

/// A dependency edge from a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Dependency on another module in the same package.
    Module {
        /// Module name.
        name: String,
        /// Platform condition; `None` means unconditional.
        condition: Option<DependencyCondition>,
    },
    /// Dependency on a product of another package.
    Product {
        /// Product name.
        name: String,
        /// Platform condition; `None` means unconditional.
        condition: Option<DependencyCondition>,
    },
}

impl Dependency {
    /// Returns whether the edge applies in the given environment.
    #[must_use]
    pub fn satisfied_by(&self, environment: &BuildEnvironment) -> bool {
        let condition = match self {
            Self::Module { condition, .. } | Self::Product { condition, .. } => condition,
        };
        condition
            .as_ref()
            .is_none_or(|condition| condition.satisfied_by(environment))
    }
}

/// A module (target) inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    kind: ModuleKind,
    directory: PathBuf,
    source_files: Vec<PathBuf>,
    dependencies: Vec<Dependency>,
}

impl Module {
    /// Creates a module rooted at the given directory.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ModuleKind, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            directory: directory.into(),
            source_files: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Attaches the module's source files.
    #[must_use]
    pub fn with_source_files(mut self, source_files: Vec<PathBuf>) -> Self {
        self.source_files = source_files;
        self
    }

    /// Attaches the module's dependency edges.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module kind.
    #[must_use]
    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    /// Returns the module's root directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the module's source files.
    #[must_use]
    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    /// Returns all dependency edges.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Returns the dependency edges that apply in the given environment.
    pub fn dependencies_satisfying<'a>(
        &'a self,
        environment: &'a BuildEnvironment,
    ) -> impl Iterator<Item = &'a Dependency> {
        self.dependencies
            .iter()
            .filter(move |dependency| dependency.satisfied_by(environment))
    }

    /// Returns the plugin capability when this module is a plugin.
    #[must_use]
    pub fn plugin_capability(&self) -> Option<PluginCapability> {
        match self.kind {
            ModuleKind::Plugin(capability) => Some(capability),
            _ => None,
        }
    }
}

/// A product exported by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    name: String,
    module_names: Vec<String>,
}

impl Product {
    /// Creates a product composed of the named modules.
    #[must_use]
    pub fn new(name: impl Into<String>, module_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            module_names,
        }
    }

    /// Returns the product name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the names of the modules composing the product.
    #[must_use]
    pub fn module_names(&self) -> &[String] {
        &self.module_names
    }
}

/// A resolved package in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    identity: String,
    display_name: String,
    directory: PathBuf,
    modules: Vec<Module>,
    products: Vec<Product>,
}

impl Package {
    /// Creates a package.
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        directory: impl Into<PathBuf>,
        modules: Vec<Module>,
        products: Vec<Product>,
    ) -> Self {
        let identity = identity.into();
        Self {
            display_name: identity.clone(),
            identity,
            directory: directory.into(),
            modules,
            products,
        }
    }

    /// Overrides the display name shown to users.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Returns the package identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the package root directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the package's modules.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Returns the package's products.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Looks up a module by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|module| module.name == name)
    }
}

/// A target inside an IDE-style project description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTarget {
    name: String,
}

impl ProjectTarget {
    /// Creates a project target.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the target name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An IDE-style project participating in the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
    directory: PathBuf,
    targets: Vec<ProjectTarget>,
}

impl Project {
    /// Creates a project.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        targets: Vec<ProjectTarget>,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            targets,
        }
    }

    /// Returns the project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the project root directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the project's targets.
    #[must_use]
    pub fn targets(&self) -> &[ProjectTarget] {
        &self.targets
    }

    /// Looks up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&ProjectTarget> {
        self.targets.iter().find(|target| target.name == name)
    }
}

/// The resolved graph the invocation core walks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageGraph {
    packages: Vec<Package>,
    projects: Vec<Project>,
}

impl PackageGraph {
    /// Creates a graph over the given packages.
    #[must_use]
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            packages,
            projects: Vec::new(),
        }
    }

    /// Attaches IDE-style projects to the graph.
    #[must_use]
    pub fn with_projects(mut self, projects: Vec<Project>) -> Self {
        self.projects = projects;
        self
    }

    /// Returns all packages.
    #[must_use]
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Returns all projects.
    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Looks up a package by identity.
    #[must_use]
    pub fn package(&self, identity: &str) -> Option<&Package> {
        self.packages
            .iter()
            .find(|package| package.identity == identity)
    }

    /// Looks up a project by name.
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.name == name)
    }

    /// Looks up a module by name anywhere in the graph.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.packages
            .iter()
            .find_map(|package| package.module(name))
    }

    /// Returns the package owning the named module.
    #[must_use]
    pub fn package_for_module(&self, module_name: &str) -> Option<&Package> {
        self.packages
            .iter()
            .find(|package| package.module(module_name).is_some())
    }

    /// Looks up a product by name anywhere in the graph.
    #[must_use]
    pub fn product(&self, name: &str) -> Option<(&Package, &Product)> {
        self.packages.iter().find_map(|package| {
            package
                .products
                .iter()
                .find(|product| product.name == name)
                .map(|product| (package, product))
        })
    }

    /// Returns, for every module, the plugin modules it uses in the given
    /// environment.
    ///
    /// Plugin edges can be direct module dependencies or product
    /// dependencies whose product is composed of plugin modules. Modules
    /// with no applicable plugins are omitted.
    #[must_use]
    pub fn plugins_per_module(
        &self,
        environment: &BuildEnvironment,
    ) -> BTreeMap<String, Vec<&Module>> {
        let mut result = BTreeMap::new();
        for package in &self.packages {
            for module in &package.modules {
                let plugins: Vec<&Module> = module
                    .dependencies_satisfying(environment)
                    .flat_map(|dependency| self.plugin_modules_for(dependency))
                    .collect();
                if !plugins.is_empty() {
                    let _ = result.insert(module.name.clone(), plugins);
                }
            }
        }
        result
    }

    fn plugin_modules_for<'a>(&'a self, dependency: &Dependency) -> Vec<&'a Module> {
        match dependency {
            Dependency::Module { name, .. } => self
                .module(name)
                .filter(|module| module.plugin_capability().is_some())
                .into_iter()
                .collect(),
            Dependency::Product { name, .. } => self
                .product(name)
                .map(|(package, product)| {
                    product
                        .module_names
                        .iter()
                        .filter_map(|module_name| package.module(module_name))
                        .filter(|module| module.plugin_capability().is_some())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}
