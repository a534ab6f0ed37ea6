//! Trigger entry point for build sets.
//!
//! The coordinator is what an outer REST or CLI layer calls: it validates a
//! requested build, starts it in the background, and keeps enough state to
//! answer status queries, wait for completion, or cancel.
//!
//! Each accepted build set gets a watcher task that records the final report
//! into the run table, so status queries see completion whether or not anyone
//! waits on it. Cancellation and progress never go through the watcher.

use crate::cancellation::CancellationToken;
use crate::core::{BuildResult, BuildSetStatus, RequestContext, User};
use crate::errors::{BuildflowError, Result};
use crate::scheduler::{DependencyScheduler, RunOptions, RunProgress, RunReport, TaskProgress};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What the coordinator reports about a build set.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    /// The build set id.
    pub build_set_id: Uuid,
    /// The requested (root) project.
    pub configuration_id: String,
    /// The requesting user.
    pub user: User,
    /// Current status.
    pub status: BuildSetStatus,
    /// When the build set started.
    pub start_time: DateTime<Utc>,
    /// When it finished, once final.
    pub end_time: Option<DateTime<Utc>>,
    /// Per-task state while running.
    pub progress: Vec<TaskProgress>,
    /// Per-task results once finished.
    pub results: Vec<BuildResult>,
}

#[derive(Debug)]
struct RunEntry {
    info: Mutex<BuildInfo>,
    cancel: Arc<CancellationToken>,
    progress: RunProgress,
    failure: Mutex<Option<String>>,
    finished: watch::Sender<bool>,
}

impl RunEntry {
    fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    fn snapshot(&self) -> BuildInfo {
        let mut info = self.info.lock().clone();
        if !info.status.is_final() {
            info.progress = self.progress.snapshot();
        }
        info
    }

    fn record(&self, outcome: Result<RunReport>) {
        let mut info = self.info.lock();
        match outcome {
            Ok(report) => {
                if !report.persistence_errors.is_empty() {
                    warn!(
                        build_set_id = %report.build_set_id,
                        persistence_errors = report.persistence_errors.len(),
                        "Build set finished with unstored results"
                    );
                }
                info.status = report.status;
                info.start_time = report.started_at;
                info.end_time = Some(report.ended_at);
                info.results = report.results;
            }
            Err(e) => {
                error!(build_set_id = %info.build_set_id, error = %e, "Build set run died");
                info.status = BuildSetStatus::Failed;
                info.end_time = Some(Utc::now());
                *self.failure.lock() = Some(e.to_string());
            }
        }
        info.progress.clear();
        drop(info);

        self.finished.send_replace(true);
    }
}

/// Starts, tracks, and cancels build sets.
#[derive(Debug)]
pub struct BuildCoordinator {
    scheduler: DependencyScheduler,
    runs: DashMap<Uuid, Arc<RunEntry>>,
}

impl BuildCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(scheduler: DependencyScheduler) -> Self {
        Self {
            scheduler,
            runs: DashMap::new(),
        }
    }

    /// Validates and starts a build of `configuration_id` and its dependencies.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProject` or `CyclicDependency` if the build set is
    /// rejected; nothing is started in that case.
    pub fn start_build(&self, configuration_id: &str, ctx: &RequestContext) -> Result<BuildInfo> {
        let options = RunOptions::new()
            .with_user(ctx.user.id)
            .with_description(format!("Build of {configuration_id} requested by {}", ctx.user.username));
        let build_set_id = options.build_set_id;

        let handle = self.scheduler.start(&[configuration_id], options)?;

        info!(
            build_set_id = %build_set_id,
            configuration = %configuration_id,
            user = %ctx.user.username,
            request_id = %ctx.request_id,
            "Build set accepted"
        );

        let info = BuildInfo {
            build_set_id,
            configuration_id: configuration_id.to_string(),
            user: ctx.user.clone(),
            status: BuildSetStatus::Building,
            start_time: Utc::now(),
            end_time: None,
            progress: handle.progress(),
            results: Vec::new(),
        };
        let (finished, _) = watch::channel(false);
        let entry = Arc::new(RunEntry {
            info: Mutex::new(info.clone()),
            cancel: handle.cancel_token(),
            progress: handle.progress_view(),
            failure: Mutex::new(None),
            finished,
        });
        self.runs.insert(build_set_id, entry.clone());

        tokio::spawn(async move {
            let outcome = handle.wait().await;
            entry.record(outcome);
        });

        Ok(info)
    }

    /// Waits for a build set to finish and returns its final info.
    ///
    /// Any number of callers may wait on the same build set.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBuildSet` for an unknown id, or `Internal` if the run
    /// task died.
    pub async fn finish_build(&self, build_set_id: Uuid, ctx: &RequestContext) -> Result<BuildInfo> {
        let entry = self.entry(build_set_id)?;

        let mut finished = entry.finished.subscribe();
        finished
            .wait_for(|done| *done)
            .await
            .map_err(|_| BuildflowError::Internal(format!("Build set {build_set_id} watcher stopped")))?;

        if let Some(failure) = entry.failure.lock().clone() {
            return Err(BuildflowError::Internal(failure));
        }

        let info = entry.snapshot();
        info!(
            build_set_id = %build_set_id,
            status = %info.status,
            request_id = %ctx.request_id,
            "Build set finished"
        );
        Ok(info)
    }

    /// Requests cancellation of a running build set.
    ///
    /// Returns false if the set already finished or was already cancelled.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBuildSet` for an unknown id.
    pub fn cancel_build(&self, build_set_id: Uuid, ctx: &RequestContext) -> Result<bool> {
        let entry = self.entry(build_set_id)?;
        if entry.is_finished() || entry.progress.all_terminal() {
            return Ok(false);
        }

        let cancelled = entry.cancel.cancel(format!("cancelled by {}", ctx.user.username));
        if cancelled {
            info!(build_set_id = %build_set_id, user = %ctx.user.username, "Build set cancellation requested");
        }
        Ok(cancelled)
    }

    /// The current info of a build set.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBuildSet` for an unknown id.
    pub fn build_info(&self, build_set_id: Uuid) -> Result<BuildInfo> {
        Ok(self.entry(build_set_id)?.snapshot())
    }

    /// Drops a finished build set from the run table, returning its final info.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBuildSet` for an unknown id and `BuildSetRunning` if it
    /// has not finished.
    pub fn forget(&self, build_set_id: Uuid) -> Result<BuildInfo> {
        let entry = self.entry(build_set_id)?;
        if !entry.is_finished() {
            return Err(BuildflowError::BuildSetRunning(build_set_id));
        }
        self.runs.remove(&build_set_id);
        Ok(entry.snapshot())
    }

    /// Drops every finished build set. Returns how many were removed.
    pub fn evict_finished(&self) -> usize {
        let before = self.runs.len();
        self.runs.retain(|_, entry| !entry.is_finished());
        before - self.runs.len()
    }

    /// Ids of all known build sets.
    #[must_use]
    pub fn build_set_ids(&self) -> Vec<Uuid> {
        self.runs.iter().map(|e| *e.key()).collect()
    }

    fn entry(&self, build_set_id: Uuid) -> Result<Arc<RunEntry>> {
        self.runs
            .get(&build_set_id)
            .map(|e| e.value().clone())
            .ok_or(BuildflowError::UnknownBuildSet(build_set_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::core::{BuildStatus, BuildType, Project, StatusEvent, TaskFailure, TaskState};
    use crate::testing::{sample_projects, universal_driver, DriverBehavior, TestEngine};
    use std::time::Duration;

    fn ctx() -> RequestContext {
        RequestContext::new(User::new("alice"))
    }

    fn hanging_engine(project: &str) -> TestEngine {
        TestEngine::builder()
            .projects(sample_projects())
            .driver(universal_driver("scripted").with_behavior(project, DriverBehavior::Hang))
            .config(OrchestratorConfig::new().with_task_timeout(Duration::from_secs(30)))
            .build()
            .unwrap()
    }

    async fn until_final(coordinator: &BuildCoordinator, id: Uuid) -> BuildInfo {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let info = coordinator.build_info(id).unwrap();
                if info.status.is_final() {
                    return info;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("build set finished")
    }

    #[tokio::test]
    async fn test_start_and_finish() {
        let engine = TestEngine::builder().projects(sample_projects()).build().unwrap();
        let coordinator = engine.coordinator();
        let ctx = ctx();

        let started = coordinator.start_build("p4", &ctx).unwrap();
        assert_eq!(started.status, BuildSetStatus::Building);
        assert_eq!(started.configuration_id, "p4");
        assert_eq!(started.progress.len(), 4);

        let finished = coordinator.finish_build(started.build_set_id, &ctx).await.unwrap();
        assert_eq!(finished.status, BuildSetStatus::Success);
        assert_eq!(finished.results.len(), 4);
        assert!(finished.end_time.is_some());
        assert_eq!(finished.user, ctx.user);

        let again = coordinator.finish_build(started.build_set_id, &ctx).await.unwrap();
        assert_eq!(again.status, BuildSetStatus::Success);
    }

    #[tokio::test]
    async fn test_rejected_build_is_not_tracked() {
        let engine = TestEngine::builder()
            .project(Project::new("x", BuildType::Java).with_dependency("y"))
            .project(Project::new("y", BuildType::Java).with_dependency("x"))
            .build()
            .unwrap();
        let coordinator = engine.coordinator();
        let ctx = ctx();

        let err = coordinator.start_build("x", &ctx).unwrap_err();

        assert!(matches!(err, BuildflowError::CyclicDependency(_)));
        assert!(coordinator.build_set_ids().is_empty());
        let rejected = engine.events.events_of_type("build_set.rejected");
        let Some(StatusEvent::BuildSet(event)) = rejected.first() else {
            panic!("expected a rejection event");
        };
        assert_eq!(event.user_id, Some(ctx.user.id));
        assert_eq!(event.old_status, BuildSetStatus::New);
    }

    #[tokio::test]
    async fn test_unknown_build_set() {
        let engine = TestEngine::builder().build().unwrap();
        let coordinator = engine.coordinator();
        let id = Uuid::new_v4();

        assert!(matches!(coordinator.build_info(id), Err(BuildflowError::UnknownBuildSet(i)) if i == id));
        assert!(coordinator.finish_build(id, &ctx()).await.is_err());
        assert!(coordinator.cancel_build(id, &ctx()).is_err());
        assert!(coordinator.forget(id).is_err());
    }

    #[tokio::test]
    async fn test_cancel_build() {
        let engine = hanging_engine("p1");
        let coordinator = engine.coordinator();
        let ctx = ctx();

        let started = coordinator.start_build("p2", &ctx).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(coordinator.cancel_build(started.build_set_id, &ctx).unwrap());
        assert!(!coordinator.cancel_build(started.build_set_id, &ctx).unwrap());

        let finished = coordinator.finish_build(started.build_set_id, &ctx).await.unwrap();
        assert_eq!(finished.status, BuildSetStatus::Cancelled);
        assert!(finished.results.iter().all(|r| r.status == BuildStatus::Skipped));
        assert!(finished
            .results
            .iter()
            .all(|r| matches!(&r.cause, Some(TaskFailure::Cancelled { reason }) if reason == "cancelled by alice")));

        assert!(!coordinator.cancel_build(started.build_set_id, &ctx).unwrap());
    }

    #[tokio::test]
    async fn test_cancel_while_another_caller_waits() {
        let engine = hanging_engine("p1");
        let coordinator = Arc::new(engine.coordinator());
        let ctx = ctx();

        let started = coordinator.start_build("p2", &ctx).unwrap();
        let id = started.build_set_id;
        let waiter = {
            let coordinator = coordinator.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { coordinator.finish_build(id, &ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let info = coordinator.build_info(id).unwrap();
        let p1 = info.progress.iter().find(|t| t.project == "p1").unwrap();
        assert_eq!(p1.state, TaskState::Running);

        let operator = RequestContext::new(User::new("bob"));
        assert!(coordinator.cancel_build(id, &operator).unwrap());

        let finished = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter released by cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(finished.status, BuildSetStatus::Cancelled);
        assert!(finished
            .results
            .iter()
            .all(|r| matches!(&r.cause, Some(TaskFailure::Cancelled { reason }) if reason == "cancelled by bob")));
    }

    #[tokio::test]
    async fn test_build_info_while_running() {
        let engine = TestEngine::builder()
            .projects(sample_projects())
            .driver(universal_driver("scripted").with_default(DriverBehavior::succeed_after(Duration::from_millis(30))))
            .build()
            .unwrap();
        let coordinator = engine.coordinator();
        let ctx = ctx();

        let started = coordinator.start_build("p6", &ctx).unwrap();
        let info = coordinator.build_info(started.build_set_id).unwrap();
        assert_eq!(info.status, BuildSetStatus::Building);
        assert_eq!(info.progress.len(), 1);

        coordinator.finish_build(started.build_set_id, &ctx).await.unwrap();
        let info = coordinator.build_info(started.build_set_id).unwrap();
        assert_eq!(info.status, BuildSetStatus::Success);
        assert!(info.progress.is_empty());
    }

    #[tokio::test]
    async fn test_build_info_sees_completion_without_waiter() {
        let engine = TestEngine::builder().projects(sample_projects()).build().unwrap();
        let coordinator = engine.coordinator();

        let started = coordinator.start_build("p6", &ctx()).unwrap();
        let info = until_final(&coordinator, started.build_set_id).await;

        assert_eq!(info.status, BuildSetStatus::Success);
        assert!(info.end_time.is_some());
        assert_eq!(info.results.len(), 1);
        assert!(!coordinator.cancel_build(started.build_set_id, &ctx()).unwrap());
    }

    #[tokio::test]
    async fn test_forget_finished_build_sets() {
        let engine = hanging_engine("p1");
        let coordinator = engine.coordinator();
        let ctx = ctx();

        let running = coordinator.start_build("p1", &ctx).unwrap();
        let done = coordinator.start_build("p6", &ctx).unwrap();
        until_final(&coordinator, done.build_set_id).await;

        assert!(matches!(
            coordinator.forget(running.build_set_id),
            Err(BuildflowError::BuildSetRunning(id)) if id == running.build_set_id
        ));
        let forgotten = coordinator.forget(done.build_set_id).unwrap();
        assert_eq!(forgotten.status, BuildSetStatus::Success);
        assert!(coordinator.build_info(done.build_set_id).is_err());

        coordinator.cancel_build(running.build_set_id, &ctx).unwrap();
        until_final(&coordinator, running.build_set_id).await;
        assert_eq!(coordinator.evict_finished(), 1);
        assert!(coordinator.build_set_ids().is_empty());
    }
}
