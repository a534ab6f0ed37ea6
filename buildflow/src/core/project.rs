//! Project definitions and the catalog they are registered in.

use super::BuildType;
use crate::errors::BuildflowError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

// The pattern is a literal that always compiles.
#[allow(clippy::expect_used)]
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").expect("valid project name pattern"))
}

/// A buildable project and the projects it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name.
    pub name: String,
    /// The build technology required.
    pub build_type: BuildType,
    /// Names of the projects that must build first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Where the sources live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm_url: Option<String>,
    /// The build command handed to the driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_script: Option<String>,
    /// Environment image requested for the build, if not the driver default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_image: Option<String>,
}

impl Project {
    /// Creates a project with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, build_type: BuildType) -> Self {
        Self {
            name: name.into(),
            build_type,
            dependencies: Vec::new(),
            scm_url: None,
            build_script: None,
            environment_image: None,
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Sets the dependencies, dropping duplicates while keeping order.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.clear();
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Sets the SCM URL.
    #[must_use]
    pub fn with_scm_url(mut self, url: impl Into<String>) -> Self {
        self.scm_url = Some(url.into());
        self
    }

    /// Sets the build script.
    #[must_use]
    pub fn with_build_script(mut self, script: impl Into<String>) -> Self {
        self.build_script = Some(script.into());
        self
    }

    /// Sets the environment image.
    #[must_use]
    pub fn with_environment_image(mut self, image: impl Into<String>) -> Self {
        self.environment_image = Some(image.into());
        self
    }

    /// Validates the project definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is malformed or the project depends on itself.
    pub fn validate(&self) -> Result<(), BuildflowError> {
        if !name_pattern().is_match(&self.name) {
            return Err(BuildflowError::InvalidProject {
                name: self.name.clone(),
                reason: "name must start with an alphanumeric character and contain only [A-Za-z0-9._-]".to_string(),
            });
        }
        if self.dependencies.contains(&self.name) {
            return Err(BuildflowError::InvalidProject {
                name: self.name.clone(),
                reason: "project cannot depend on itself".to_string(),
            });
        }
        Ok(())
    }
}

/// The set of projects known to the orchestrator, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ProjectCatalog {
    projects: Vec<Project>,
    index: HashMap<String, usize>,
}

impl ProjectCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a list of projects.
    ///
    /// # Errors
    ///
    /// Returns an error if a project is invalid or registered twice.
    pub fn from_projects(projects: impl IntoIterator<Item = Project>) -> Result<Self, BuildflowError> {
        let mut catalog = Self::new();
        for project in projects {
            catalog.register(project)?;
        }
        Ok(catalog)
    }

    /// Registers a project.
    ///
    /// Dependencies are not checked here; the scheduler resolves them when it
    /// computes the closure of a build set.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is invalid or its name is taken.
    pub fn register(&mut self, project: Project) -> Result<(), BuildflowError> {
        project.validate()?;
        if self.index.contains_key(&project.name) {
            return Err(BuildflowError::InvalidProject {
                name: project.name,
                reason: "a project with this name is already registered".to_string(),
            });
        }
        self.index.insert(project.name.clone(), self.projects.len());
        self.projects.push(project);
        Ok(())
    }

    /// Looks up a project by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Project> {
        self.index.get(name).map(|&i| &self.projects[i])
    }

    /// Returns true if the project is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the number of projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Returns true if no projects are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Iterates projects in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }
}
