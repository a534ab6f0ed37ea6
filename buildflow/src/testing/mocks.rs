//! Mock drivers, environments, repositories and datastores for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Artifact, BuildResult, BuildType, Project};
use crate::datastore::Datastore;
use crate::drivers::{BuildDriver, BuildJob, CompletionHandle, DriverOutcome};
use crate::environment::{EnvironmentDriver, EnvironmentHandle, EnvironmentRecipe};
use crate::errors::{DriverError, EnvironmentError, PersistenceError, RepositoryError};
use crate::executor::TaskId;
use crate::repository::{RepositoryHandle, RepositoryHandles, RepositoryKind, RepositoryManager};

/// How a [`ScriptedDriver`] handles a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverBehavior {
    /// Completes successfully after a delay, producing one artifact.
    Succeed {
        /// Simulated build time.
        delay: Duration,
    },
    /// Completes with a failure after a delay.
    Fail {
        /// Failure message.
        message: String,
        /// Simulated build time.
        delay: Duration,
    },
    /// Accepts the build and never completes it.
    Hang,
    /// Refuses to start the build.
    RejectStart {
        /// Rejection message.
        message: String,
    },
    /// Panics inside `start_build`, after resources were provisioned.
    Panic {
        /// Panic message.
        message: String,
    },
}

impl DriverBehavior {
    /// Succeeds after `delay`.
    #[must_use]
    pub fn succeed_after(delay: Duration) -> Self {
        Self::Succeed { delay }
    }

    /// Fails immediately with `message`.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            message: message.into(),
            delay: Duration::ZERO,
        }
    }
}

impl Default for DriverBehavior {
    fn default() -> Self {
        Self::Succeed {
            delay: Duration::from_millis(5),
        }
    }
}

/// A build driver whose behaviour is scripted per project.
///
/// Records every job it receives and the peak number of builds in flight.
#[derive(Debug)]
pub struct ScriptedDriver {
    id: String,
    build_type: BuildType,
    extra_types: Vec<BuildType>,
    default_behavior: DriverBehavior,
    behaviors: HashMap<String, DriverBehavior>,
    jobs: Mutex<Vec<BuildJob>>,
    held: Mutex<Vec<CompletionHandle>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ScriptedDriver {
    /// Creates a driver for one build type that succeeds quickly.
    #[must_use]
    pub fn new(id: impl Into<String>, build_type: BuildType) -> Self {
        Self {
            id: id.into(),
            build_type,
            extra_types: Vec::new(),
            default_behavior: DriverBehavior::default(),
            behaviors: HashMap::new(),
            jobs: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Adds a build type the driver can also handle.
    #[must_use]
    pub fn also_building(mut self, build_type: BuildType) -> Self {
        self.extra_types.push(build_type);
        self
    }

    /// Sets the behaviour for projects without a specific script.
    #[must_use]
    pub fn with_default(mut self, behavior: DriverBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Scripts the behaviour for one project.
    #[must_use]
    pub fn with_behavior(mut self, project: impl Into<String>, behavior: DriverBehavior) -> Self {
        self.behaviors.insert(project.into(), behavior);
        self
    }

    /// Names of projects whose builds were started, in start order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|j| j.project.name.clone()).collect()
    }

    /// Number of times a project was started.
    #[must_use]
    pub fn start_count(&self, project: &str) -> usize {
        self.jobs.lock().iter().filter(|j| j.project.name == project).count()
    }

    /// All jobs received.
    #[must_use]
    pub fn jobs(&self) -> Vec<BuildJob> {
        self.jobs.lock().clone()
    }

    /// The largest number of builds that were running at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Completes every hung build with `outcome`, returning how many
    /// completions were still awaited.
    pub fn release_held(&self, outcome: DriverOutcome) -> usize {
        let held: Vec<_> = self.held.lock().drain(..).collect();
        held.into_iter()
            .map(|handle| handle.complete(outcome.clone()))
            .filter(|delivered| *delivered)
            .count()
    }

    fn behavior_for(&self, project: &str) -> DriverBehavior {
        self.behaviors
            .get(project)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

#[async_trait]
impl BuildDriver for ScriptedDriver {
    fn driver_id(&self) -> &str {
        &self.id
    }

    fn build_type(&self) -> BuildType {
        self.build_type
    }

    fn can_build(&self, build_type: BuildType) -> bool {
        build_type == self.build_type || self.extra_types.contains(&build_type)
    }

    async fn start_build(&self, job: BuildJob, completion: CompletionHandle) -> Result<(), DriverError> {
        let behavior = self.behavior_for(&job.project.name);
        self.jobs.lock().push(job.clone());

        let (delay, outcome) = match behavior {
            DriverBehavior::RejectStart { message } => return Err(DriverError::new(&self.id, message)),
            DriverBehavior::Panic { message } => panic!("{message}"),
            DriverBehavior::Hang => {
                self.held.lock().push(completion);
                return Ok(());
            }
            DriverBehavior::Succeed { delay } => {
                let artifact = Artifact::from_bytes(
                    format!("{}:1.0", job.project.name),
                    format!("{}-1.0.bin", job.project.name),
                    job.project.name.as_bytes(),
                );
                (delay, DriverOutcome::Success { artifacts: vec![artifact] })
            }
            DriverBehavior::Fail { message, delay } => (delay, DriverOutcome::Failure { message }),
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            completion.complete(outcome);
        });
        Ok(())
    }
}

/// An environment driver that records what it provisions and destroys.
#[derive(Debug, Default)]
pub struct RecordingEnvironmentDriver {
    id: String,
    supported: Option<Vec<BuildType>>,
    failing: HashSet<String>,
    failing_teardown: bool,
    provisioned: Mutex<Vec<String>>,
    torn_down: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl RecordingEnvironmentDriver {
    /// Creates a driver that supports every build type.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Restricts the supported build types.
    #[must_use]
    pub fn supporting(mut self, build_types: &[BuildType]) -> Self {
        self.supported = Some(build_types.to_vec());
        self
    }

    /// Fails provisioning for a project.
    #[must_use]
    pub fn failing_for(mut self, project: impl Into<String>) -> Self {
        self.failing.insert(project.into());
        self
    }

    /// Fails every teardown.
    #[must_use]
    pub fn failing_teardown(mut self) -> Self {
        self.failing_teardown = true;
        self
    }

    /// Environments provisioned for a project.
    #[must_use]
    pub fn provisioned_count(&self, project: &str) -> usize {
        self.provisioned.lock().iter().filter(|p| *p == project).count()
    }

    /// Environments destroyed for a project.
    #[must_use]
    pub fn teardown_count(&self, project: &str) -> usize {
        self.torn_down.lock().iter().filter(|p| *p == project).count()
    }

    /// Environments provisioned in total.
    #[must_use]
    pub fn total_provisioned(&self) -> usize {
        self.provisioned.lock().len()
    }

    /// Environments destroyed in total.
    #[must_use]
    pub fn total_teardowns(&self) -> usize {
        self.torn_down.lock().len()
    }
}

#[async_trait]
impl EnvironmentDriver for RecordingEnvironmentDriver {
    fn driver_id(&self) -> &str {
        &self.id
    }

    fn can_build(&self, build_type: BuildType) -> bool {
        self.supported.as_ref().map_or(true, |types| types.contains(&build_type))
    }

    async fn build_environment(&self, recipe: &EnvironmentRecipe) -> Result<EnvironmentHandle, EnvironmentError> {
        if self.failing.contains(&recipe.project) {
            return Err(EnvironmentError::new(format!(
                "no capacity for environment of {}",
                recipe.project
            )));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.provisioned.lock().push(recipe.project.clone());
        Ok(EnvironmentHandle::new(format!("env-{}-{n}", recipe.project), &self.id).with_detail("project", &recipe.project))
    }

    async fn cleanup_environment(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        if self.failing_teardown {
            return Err(EnvironmentError::new(format!("could not destroy {}", handle.id)));
        }
        let project = handle.details.get("project").cloned().unwrap_or_default();
        self.torn_down.lock().push(project);
        Ok(())
    }
}

/// A repository manager that records configuration, persistence and cleanup.
#[derive(Debug, Default)]
pub struct RecordingRepositoryManager {
    failing: HashSet<String>,
    configured: Mutex<Vec<(TaskId, String)>>,
    persisted: Mutex<Vec<String>>,
    cleanups: Mutex<HashMap<TaskId, usize>>,
}

impl RecordingRepositoryManager {
    /// Creates a manager that configures every project.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails configuration for a project.
    #[must_use]
    pub fn failing_for(mut self, project: impl Into<String>) -> Self {
        self.failing.insert(project.into());
        self
    }

    /// Cleanups received for a task.
    #[must_use]
    pub fn cleanup_count(&self, task_id: TaskId) -> usize {
        self.cleanups.lock().get(&task_id).copied().unwrap_or(0)
    }

    /// Cleanups received for every task of a project.
    #[must_use]
    pub fn cleanup_count_for(&self, project: &str) -> usize {
        let tasks: Vec<TaskId> = self
            .configured
            .lock()
            .iter()
            .filter(|(_, p)| p == project)
            .map(|(t, _)| *t)
            .collect();
        tasks.into_iter().map(|t| self.cleanup_count(t)).sum()
    }

    /// Cleanups received in total.
    #[must_use]
    pub fn total_cleanups(&self) -> usize {
        self.cleanups.lock().values().sum()
    }

    /// Ids of persisted repositories, in order.
    #[must_use]
    pub fn persisted(&self) -> Vec<String> {
        self.persisted.lock().clone()
    }
}

#[async_trait]
impl RepositoryManager for RecordingRepositoryManager {
    async fn configure_repositories(
        &self,
        project: &Project,
        task_id: TaskId,
    ) -> Result<RepositoryHandles, RepositoryError> {
        self.configured.lock().push((task_id, project.name.clone()));
        if self.failing.contains(&project.name) {
            return Err(RepositoryError::new(format!(
                "repository manager refused {}",
                project.name
            )));
        }
        let handle = |kind: RepositoryKind| RepositoryHandle {
            id: format!("{kind}-{}", task_id.get()),
            kind,
            url: format!("mem://repositories/{}/{}/{kind}", project.name, task_id.get()),
            task_id,
        };
        Ok(RepositoryHandles {
            source: handle(RepositoryKind::Source),
            deploy: handle(RepositoryKind::Deploy),
        })
    }

    async fn persist(&self, handle: &RepositoryHandle) -> Result<(), RepositoryError> {
        self.persisted.lock().push(handle.id.clone());
        Ok(())
    }

    async fn cleanup_repository_configuration(&self, task_id: TaskId) -> Result<(), RepositoryError> {
        *self.cleanups.lock().entry(task_id).or_insert(0) += 1;
        Ok(())
    }
}

/// A datastore that rejects every write.
#[derive(Debug, Default)]
pub struct FailingDatastore {
    attempts: AtomicUsize,
}

impl FailingDatastore {
    /// Creates the datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes attempted so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Datastore for FailingDatastore {
    async fn store_completed_build(&self, result: &BuildResult) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::new(
            result.task_id.get(),
            "unavailable",
            "datastore is read-only",
        ))
    }
}
