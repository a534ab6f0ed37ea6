//! A fully wired engine over mock collaborators.

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::coordinator::BuildCoordinator;
use crate::core::{BuildType, Project, ProjectCatalog, StatusEvent, TaskState};
use crate::datastore::{Datastore, InMemoryDatastore, ResultSink};
use crate::drivers::DriverRegistry;
use crate::environment::EnvironmentProvisioner;
use crate::errors::BuildflowError;
use crate::events::{CollectingSubscriber, StatusNotifier};
use crate::executor::BuildTaskExecutor;
use crate::repository::RepositoryProvisioner;
use crate::scheduler::DependencyScheduler;

use super::{RecordingEnvironmentDriver, RecordingRepositoryManager, ScriptedDriver};

/// The six-project sample graph used across the scheduler tests.
///
/// `p2 -> p1`, `p4 -> {p2, p3}`, `p5 -> p4`, `p6` standalone; `p1` is
/// native, `p5` docker, the rest java.
#[must_use]
pub fn sample_projects() -> Vec<Project> {
    vec![
        Project::new("p1", BuildType::Native),
        Project::new("p2", BuildType::Java).with_dependency("p1"),
        Project::new("p3", BuildType::Java),
        Project::new("p4", BuildType::Java)
            .with_dependency("p2")
            .with_dependency("p3"),
        Project::new("p5", BuildType::Docker).with_dependency("p4"),
        Project::new("p6", BuildType::Java),
    ]
}

/// A driver that builds every build type.
#[must_use]
pub fn universal_driver(id: &str) -> ScriptedDriver {
    BuildType::ALL
        .into_iter()
        .fold(ScriptedDriver::new(id, BuildType::Native), ScriptedDriver::also_building)
}

/// An engine wired to recording mocks.
#[derive(Debug)]
pub struct TestEngine {
    /// The build drivers, in registration order.
    pub drivers: Vec<Arc<ScriptedDriver>>,
    /// The environment backend.
    pub environments: Arc<RecordingEnvironmentDriver>,
    /// The repository manager.
    pub repositories: Arc<RecordingRepositoryManager>,
    /// The datastore (unused when a custom one was supplied).
    pub datastore: Arc<InMemoryDatastore>,
    /// Every published event.
    pub events: Arc<CollectingSubscriber>,
    /// The scheduler.
    pub scheduler: DependencyScheduler,
}

impl TestEngine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder::default()
    }

    /// The first registered driver.
    ///
    /// # Panics
    ///
    /// Panics if the engine was built without drivers.
    #[must_use]
    pub fn driver(&self) -> &Arc<ScriptedDriver> {
        &self.drivers[0]
    }

    /// A coordinator over the engine's scheduler.
    #[must_use]
    pub fn coordinator(&self) -> BuildCoordinator {
        BuildCoordinator::new(self.scheduler.clone())
    }

    /// The sequence of states a project's task moved into.
    #[must_use]
    pub fn transitions_of(&self, project: &str) -> Vec<TaskState> {
        self.events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                StatusEvent::Build(e) if e.build_configuration_id == project => Some(e.new_status),
                _ => None,
            })
            .collect()
    }

    /// Projects in the order their tasks entered `Running`.
    #[must_use]
    pub fn running_order(&self) -> Vec<String> {
        self.events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                StatusEvent::Build(e) if e.new_status == TaskState::Running => Some(e.build_configuration_id),
                _ => None,
            })
            .collect()
    }
}

/// Builder for [`TestEngine`].
#[derive(Default)]
pub struct TestEngineBuilder {
    projects: Vec<Project>,
    drivers: Vec<ScriptedDriver>,
    environments: Option<RecordingEnvironmentDriver>,
    repositories: Option<RecordingRepositoryManager>,
    datastore: Option<Arc<dyn Datastore>>,
    config: Option<OrchestratorConfig>,
}

impl std::fmt::Debug for TestEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEngineBuilder")
            .field("projects", &self.projects)
            .field("drivers", &self.drivers)
            .field("custom_datastore", &self.datastore.is_some())
            .finish_non_exhaustive()
    }
}

impl TestEngineBuilder {
    /// Adds a project to the catalog.
    #[must_use]
    pub fn project(mut self, project: Project) -> Self {
        self.projects.push(project);
        self
    }

    /// Adds several projects to the catalog.
    #[must_use]
    pub fn projects(mut self, projects: impl IntoIterator<Item = Project>) -> Self {
        self.projects.extend(projects);
        self
    }

    /// Registers a build driver. Without one, a driver for every type is used.
    #[must_use]
    pub fn driver(mut self, driver: ScriptedDriver) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Uses a specific environment backend.
    #[must_use]
    pub fn environments(mut self, environments: RecordingEnvironmentDriver) -> Self {
        self.environments = Some(environments);
        self
    }

    /// Uses a specific repository manager.
    #[must_use]
    pub fn repositories(mut self, repositories: RecordingRepositoryManager) -> Self {
        self.repositories = Some(repositories);
        self
    }

    /// Stores results in a custom datastore.
    #[must_use]
    pub fn datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Uses a specific configuration.
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Wires the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if a project is invalid or registered twice.
    pub fn build(self) -> Result<TestEngine, BuildflowError> {
        let catalog = Arc::new(ProjectCatalog::from_projects(self.projects)?);

        let drivers: Vec<Arc<ScriptedDriver>> = if self.drivers.is_empty() {
            vec![Arc::new(universal_driver("scripted"))]
        } else {
            self.drivers.into_iter().map(Arc::new).collect()
        };
        let registry = drivers
            .iter()
            .fold(DriverRegistry::builder(), |builder, driver| builder.register(driver.clone()))
            .build();

        let environments = Arc::new(
            self.environments
                .unwrap_or_else(|| RecordingEnvironmentDriver::new("recording-env")),
        );
        let repositories = Arc::new(self.repositories.unwrap_or_default());
        let config = self.config.unwrap_or_else(|| {
            OrchestratorConfig::new().with_task_timeout(std::time::Duration::from_millis(200))
        });

        let executor = Arc::new(BuildTaskExecutor::new(
            Arc::new(registry),
            Arc::new(EnvironmentProvisioner::single(environments.clone())),
            Arc::new(RepositoryProvisioner::new(repositories.clone())),
            config,
        ));

        let datastore = Arc::new(InMemoryDatastore::new());
        let default_store: Arc<dyn Datastore> = datastore.clone();
        let sink = ResultSink::new(self.datastore.unwrap_or(default_store));

        let notifier = Arc::new(StatusNotifier::new());
        let events = Arc::new(CollectingSubscriber::new());
        notifier.subscribe(events.clone());

        Ok(TestEngine {
            drivers,
            environments,
            repositories,
            datastore,
            events,
            scheduler: DependencyScheduler::new(catalog, executor, notifier, sink),
        })
    }
}
