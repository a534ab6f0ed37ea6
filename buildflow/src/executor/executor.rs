//! Executes one build task through its driver.

use super::{TaskAssignment, TaskId, TeardownStack};
use crate::cancellation::CancellationToken;
use crate::config::OrchestratorConfig;
use crate::core::{Artifact, BuildResult, Project, TaskFailure};
use crate::drivers::{BuildJob, CompletionRegistry, DriverOutcome, DriverRegistry};
use crate::environment::{EnvironmentProvisioner, EnvironmentRecipe};
use crate::repository::RepositoryProvisioner;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The outcome of executing a task, with what was assigned along the way.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    /// The terminal result.
    pub result: BuildResult,
    /// Driver and resources the task used.
    pub assignment: TaskAssignment,
    /// Teardown steps that failed, as `(step, error)`.
    pub teardown_failures: Vec<(String, String)>,
}

/// Runs builds through drivers inside scoped environments and repositories.
///
/// For every task the executor resolves a driver, configures repositories,
/// provisions an environment, starts the driver and waits for its completion
/// callback. The wait is bounded by the configured task timeout and raced
/// against run cancellation. Whatever was provisioned is torn down on every
/// exit path before the result is returned.
#[derive(Debug)]
pub struct BuildTaskExecutor {
    drivers: Arc<DriverRegistry>,
    environments: Arc<EnvironmentProvisioner>,
    repositories: Arc<RepositoryProvisioner>,
    completions: Arc<CompletionRegistry>,
    config: OrchestratorConfig,
}

impl BuildTaskExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        drivers: Arc<DriverRegistry>,
        environments: Arc<EnvironmentProvisioner>,
        repositories: Arc<RepositoryProvisioner>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            drivers,
            environments,
            repositories,
            completions: CompletionRegistry::new(),
            config,
        }
    }

    /// The driver registry.
    #[must_use]
    pub fn drivers(&self) -> &Arc<DriverRegistry> {
        &self.drivers
    }

    /// The completion registry drivers report to.
    #[must_use]
    pub fn completions(&self) -> &Arc<CompletionRegistry> {
        &self.completions
    }

    /// The executor configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Executes a task to a terminal result.
    pub async fn execute(
        &self,
        task_id: TaskId,
        project: Arc<Project>,
        cancel: Arc<CancellationToken>,
    ) -> TaskExecution {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut assignment = TaskAssignment::default();
        let mut teardown = TeardownStack::new();

        info!(task_id = %task_id, project = %project.name, build_type = %project.build_type, "Build task started");

        let outcome = AssertUnwindSafe(self.run(task_id, &project, &cancel, &mut assignment, &mut teardown))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                self.completions.abandon(task_id);
                let message = panic_message(panic.as_ref());
                error!(task_id = %task_id, project = %project.name, panic = %message, "Build task panicked");
                Err(TaskFailure::BuildFailed {
                    message: format!("driver panicked: {message}"),
                })
            });

        let teardown_failures = teardown.run_all(self.config.teardown_timeout()).await;

        let result = match outcome {
            Ok(artifacts) => {
                let driver_id = assignment.driver_id.clone().unwrap_or_default();
                info!(
                    task_id = %task_id,
                    project = %project.name,
                    artifacts = artifacts.len(),
                    duration_ms = clock.elapsed().as_millis(),
                    "Build task succeeded"
                );
                BuildResult::success(task_id, project.name.clone(), driver_id, artifacts, started_at)
            }
            Err(cause) => {
                warn!(
                    task_id = %task_id,
                    project = %project.name,
                    cause = %cause,
                    duration_ms = clock.elapsed().as_millis(),
                    "Build task did not succeed"
                );
                BuildResult::unsuccessful(task_id, project.name.clone(), cause)
                    .ran_on(assignment.driver_id.as_deref(), started_at)
            }
        };

        TaskExecution {
            result,
            assignment,
            teardown_failures,
        }
    }

    async fn run(
        &self,
        task_id: TaskId,
        project: &Arc<Project>,
        cancel: &CancellationToken,
        assignment: &mut TaskAssignment,
        teardown: &mut TeardownStack,
    ) -> Result<Vec<Artifact>, TaskFailure> {
        let driver = self
            .drivers
            .resolve(project.build_type)
            .map_err(|_| TaskFailure::NoDriverAvailable {
                build_type: project.build_type,
            })?;
        assignment.driver_id = Some(driver.driver_id().to_string());
        check_cancelled(cancel)?;

        let repositories = self.repositories.clone();
        teardown.push("repository-cleanup", move || async move {
            repositories.cleanup(task_id).await.map_err(|e| e.to_string())
        });
        let handles = self
            .repositories
            .configure(project, task_id)
            .await
            .map_err(|e| TaskFailure::Repository { message: e.message })?;
        assignment.repositories = Some(handles.clone());
        check_cancelled(cancel)?;

        let environment = self
            .environments
            .provision(&EnvironmentRecipe::for_project(project))
            .await
            .map_err(|e| TaskFailure::Environment { message: e.message })?;
        {
            let environments = self.environments.clone();
            let handle = environment.clone();
            teardown.push("environment-teardown", move || async move {
                environments.teardown(&handle).await.map_err(|e| e.to_string())
            });
        }
        assignment.environment = Some(environment.clone());
        check_cancelled(cancel)?;

        let (completion, outcome_rx) = self.completions.register(task_id);
        let job = BuildJob {
            task_id,
            project: project.clone(),
            environment,
            source_repository: handles.source.clone(),
            deploy_repository: handles.deploy.clone(),
        };

        debug!(task_id = %task_id, driver = %driver.driver_id(), "Starting driver build");
        if let Err(e) = driver.start_build(job, completion).await {
            self.completions.abandon(task_id);
            return Err(TaskFailure::BuildFailed { message: e.to_string() });
        }

        let timeout = self.config.task_timeout();
        let outcome = tokio::select! {
            received = outcome_rx => received.unwrap_or_else(|_| DriverOutcome::failure("completion channel closed")),
            () = tokio::time::sleep(timeout) => {
                self.completions.abandon(task_id);
                warn!(task_id = %task_id, timeout_ms = timeout.as_millis(), "Driver never signalled completion");
                return Err(TaskFailure::driver_hung(timeout));
            }
            () = cancel.cancelled() => {
                self.completions.abandon(task_id);
                return Err(cancelled_failure(cancel));
            }
        };

        let artifacts = match outcome {
            DriverOutcome::Success { artifacts } => artifacts,
            DriverOutcome::Failure { message } => return Err(TaskFailure::BuildFailed { message }),
        };

        if self.config.persist_on_success {
            for repository in [&handles.source, &handles.deploy] {
                self.repositories
                    .persist(repository)
                    .await
                    .map_err(|e| TaskFailure::Repository { message: e.message })?;
            }
        }

        Ok(artifacts)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn cancelled_failure(cancel: &CancellationToken) -> TaskFailure {
    TaskFailure::Cancelled {
        reason: cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), TaskFailure> {
    if cancel.is_cancelled() {
        Err(cancelled_failure(cancel))
    } else {
        Ok(())
    }
}
