//! Dependency-ordered concurrent dispatch of build tasks.

use super::table::{TaskProgress, TaskTable};
use super::{ProjectGraph, RunReport};
use crate::cancellation::CancellationToken;
use crate::core::{BuildResult, BuildSetStatus, BuildSetStatusChangedEvent, ProjectCatalog, TaskFailure, TaskState};
use crate::datastore::ResultSink;
use crate::errors::{BuildflowError, PersistenceError};
use crate::events::StatusNotifier;
use crate::executor::{BuildTaskExecutor, TaskAssignment, TaskExecution};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Id of the build set this run executes.
    pub build_set_id: Uuid,
    /// The user that requested the run.
    pub user_id: Option<Uuid>,
    /// Cancels the run.
    pub cancel: Arc<CancellationToken>,
    /// Human readable description carried on build set events.
    pub description: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            build_set_id: Uuid::new_v4(),
            user_id: None,
            cancel: Arc::new(CancellationToken::new()),
            description: String::new(),
        }
    }
}

impl RunOptions {
    /// Options with a fresh build set id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the build set id.
    #[must_use]
    pub fn with_build_set_id(mut self, build_set_id: Uuid) -> Self {
        self.build_set_id = build_set_id;
        self
    }

    /// Sets the requesting user.
    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A run executing in the background.
#[derive(Debug)]
pub struct RunHandle {
    build_set_id: Uuid,
    cancel: Arc<CancellationToken>,
    table: Arc<TaskTable>,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    /// The build set id.
    #[must_use]
    pub fn build_set_id(&self) -> Uuid {
        self.build_set_id
    }

    /// Requests cancellation. Returns false if already cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cancel.cancel(reason)
    }

    /// The token that cancels this run.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Current state of every task.
    #[must_use]
    pub fn progress(&self) -> Vec<TaskProgress> {
        self.table.progress()
    }

    /// A live view of task states that outlives the handle.
    #[must_use]
    pub fn progress_view(&self) -> RunProgress {
        RunProgress {
            table: self.table.clone(),
        }
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the run task panicked or was aborted.
    pub async fn wait(self) -> Result<RunReport, BuildflowError> {
        self.join
            .await
            .map_err(|e| BuildflowError::Internal(format!("Build set run failed: {e}")))
    }
}

/// Live task states of a run, readable while someone else awaits it.
#[derive(Debug, Clone)]
pub struct RunProgress {
    table: Arc<TaskTable>,
}

impl RunProgress {
    /// Current state of every task.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TaskProgress> {
        self.table.progress()
    }

    /// Returns true once every task is terminal.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.table.all_terminal()
    }
}

type Completion = (usize, Result<TaskExecution, JoinError>);

/// Schedules the dependency closure of a build set onto the executor.
///
/// A task is dispatched as soon as all of its dependencies succeeded, so
/// independent subtrees build concurrently. When a task fails or is skipped,
/// every task that transitively depends on it is skipped; unrelated branches
/// keep going.
#[derive(Debug, Clone)]
pub struct DependencyScheduler {
    catalog: Arc<ProjectCatalog>,
    executor: Arc<BuildTaskExecutor>,
    notifier: Arc<StatusNotifier>,
    results: ResultSink,
}

impl DependencyScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        catalog: Arc<ProjectCatalog>,
        executor: Arc<BuildTaskExecutor>,
        notifier: Arc<StatusNotifier>,
        results: ResultSink,
    ) -> Self {
        Self {
            catalog,
            executor,
            notifier,
            results,
        }
    }

    /// The project catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<ProjectCatalog> {
        &self.catalog
    }

    /// The status notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<StatusNotifier> {
        &self.notifier
    }

    /// Computes and validates the dependency closure of `roots`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProject` or `CyclicDependency`.
    pub fn plan<S: AsRef<str>>(&self, roots: &[S]) -> Result<ProjectGraph, BuildflowError> {
        let graph = ProjectGraph::closure(&self.catalog, roots)?;
        graph.check_acyclic()?;
        debug!(projects = graph.len(), "Build set planned");
        Ok(graph)
    }

    /// Builds `roots` and their dependencies, returning when all tasks are terminal.
    ///
    /// # Errors
    ///
    /// Returns a run-scoped error if the build set was rejected before any
    /// task started. Task failures are reported in the [`RunReport`].
    pub async fn run<S: AsRef<str>>(&self, roots: &[S], options: RunOptions) -> Result<RunReport, BuildflowError> {
        let graph = self.plan_or_reject(roots, &options)?;
        let table = Arc::new(TaskTable::new(options.build_set_id, &graph));
        Ok(self.execute(graph, table, options).await)
    }

    /// Validates `roots` and starts the run in the background.
    ///
    /// # Errors
    ///
    /// Returns a run-scoped error if the build set was rejected.
    pub fn start<S: AsRef<str>>(&self, roots: &[S], options: RunOptions) -> Result<RunHandle, BuildflowError> {
        let graph = self.plan_or_reject(roots, &options)?;
        let table = Arc::new(TaskTable::new(options.build_set_id, &graph));
        let build_set_id = options.build_set_id;
        let cancel = options.cancel.clone();

        let scheduler = self.clone();
        let run_table = table.clone();
        let join = tokio::spawn(async move { scheduler.execute(graph, run_table, options).await });

        Ok(RunHandle {
            build_set_id,
            cancel,
            table,
            join,
        })
    }

    fn plan_or_reject<S: AsRef<str>>(&self, roots: &[S], options: &RunOptions) -> Result<ProjectGraph, BuildflowError> {
        self.plan(roots).map_err(|e| {
            warn!(build_set_id = %options.build_set_id, error = %e, "Build set rejected");
            let description = match &e {
                BuildflowError::CyclicDependency(cycle) => format!("{e}; {}", cycle.fix_hint()),
                _ => e.to_string(),
            };
            self.publish_build_set(
                options,
                BuildSetStatus::New,
                BuildSetStatus::Rejected,
                None,
                Utc::now(),
                Some(Utc::now()),
                description,
            );
            e
        })
    }

    async fn execute(&self, graph: ProjectGraph, table: Arc<TaskTable>, options: RunOptions) -> RunReport {
        let started_at = Utc::now();
        let cancel = options.cancel.clone();
        let description = if options.description.is_empty() {
            format!("Building {} project(s)", graph.len())
        } else {
            options.description.clone()
        };

        info!(build_set_id = %options.build_set_id, projects = graph.len(), "Build set started");
        self.publish_build_set(
            &options,
            BuildSetStatus::New,
            BuildSetStatus::Building,
            Some(TaskState::Pending),
            started_at,
            None,
            description.clone(),
        );

        let mut remaining: Vec<usize> = (0..graph.len()).map(|n| graph.dependencies(n).len()).collect();
        let mut ready: VecDeque<usize> = (0..graph.len()).filter(|&n| remaining[n] == 0).collect();
        let mut active: FuturesUnordered<_> = FuturesUnordered::new();
        let mut execution_order = Vec::with_capacity(graph.len());
        let mut persistence_errors = Vec::new();
        let mut cancelled = false;

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                ready.clear();
                self.skip_unstarted(&table, &cancel, &mut persistence_errors).await;
            }

            while let Some(node) = ready.pop_front() {
                if let Some(event) = table.transition(node, TaskState::Ready) {
                    self.notifier.publish(event);
                }
                if let Some(event) = table.transition(node, TaskState::Running) {
                    self.notifier.publish(event);
                    execution_order.push(graph.project(node).name.clone());
                    active.push(self.spawn_task(&graph, &table, node, cancel.clone()));
                }
            }

            if active.is_empty() {
                break;
            }

            let completion = tokio::select! {
                biased;
                () = cancel.cancelled(), if !cancelled => continue,
                next = active.next() => next,
            };
            let Some((node, joined)) = completion else {
                break;
            };

            let result = match joined {
                Ok(execution) => self.record_execution(&table, node, execution),
                Err(e) => {
                    error!(project = %graph.project(node).name, error = %e, "Build task aborted");
                    let execution = TaskExecution {
                        result: BuildResult::unsuccessful(
                            table.task_id(node),
                            graph.project(node).name.clone(),
                            TaskFailure::BuildFailed {
                                message: format!("build task aborted: {e}"),
                            },
                        ),
                        assignment: TaskAssignment::default(),
                        teardown_failures: Vec::new(),
                    };
                    self.record_execution(&table, node, execution)
                }
            };
            let Some(result) = result else {
                continue;
            };
            self.store(&result, &mut persistence_errors).await;

            if result.is_success() {
                for &dependent in graph.dependents(node) {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 && !cancelled && table.state(dependent) == TaskState::Pending {
                        ready.push_back(dependent);
                    }
                }
            } else {
                self.skip_descendants(&graph, &table, node, &mut persistence_errors).await;
            }
        }

        if !table.all_terminal() {
            error!(build_set_id = %options.build_set_id, "Run ended with unfinished tasks");
        }

        let results = table.results();
        let status = aggregate_status(cancelled, &results);
        let ended_at = Utc::now();

        info!(
            build_set_id = %options.build_set_id,
            status = %status,
            tasks = results.len(),
            duration_ms = (ended_at - started_at).num_milliseconds(),
            "Build set finished"
        );
        let final_task_state = match status {
            BuildSetStatus::Success => TaskState::Success,
            BuildSetStatus::Cancelled => TaskState::Skipped,
            _ => TaskState::Failed,
        };
        self.publish_build_set(
            &options,
            BuildSetStatus::Building,
            status,
            Some(final_task_state),
            started_at,
            Some(ended_at),
            description,
        );

        RunReport {
            build_set_id: options.build_set_id,
            status,
            results,
            execution_order,
            persistence_errors,
            started_at,
            ended_at,
        }
    }

    fn spawn_task(
        &self,
        graph: &ProjectGraph,
        table: &TaskTable,
        node: usize,
        cancel: Arc<CancellationToken>,
    ) -> impl Future<Output = Completion> {
        let executor = self.executor.clone();
        let project = graph.project(node).clone();
        let task_id = table.task_id(node);

        debug!(task_id = %task_id, project = %project.name, "Dispatching build task");
        let span = info_span!("build_task", task_id = %task_id, project = %project.name);
        tokio::spawn(async move { executor.execute(task_id, project, cancel).await }.instrument(span))
            .map(move |joined| (node, joined))
    }

    fn record_execution(&self, table: &TaskTable, node: usize, execution: TaskExecution) -> Option<BuildResult> {
        let (event, result) = table.finish(node, execution)?;
        self.notifier.publish(event);
        Some(result)
    }

    async fn skip_descendants(
        &self,
        graph: &ProjectGraph,
        table: &TaskTable,
        failed: usize,
        persistence_errors: &mut Vec<PersistenceError>,
    ) {
        let dependency = graph.project(failed).name.clone();
        for node in graph.descendants(failed) {
            let cause = TaskFailure::DependencyFailed {
                dependency: dependency.clone(),
            };
            if let Some((event, result)) = table.skip(node, cause) {
                debug!(project = %result.project, dependency = %dependency, "Skipping dependent build");
                self.notifier.publish(event);
                self.store(&result, persistence_errors).await;
            }
        }
    }

    async fn skip_unstarted(
        &self,
        table: &TaskTable,
        cancel: &CancellationToken,
        persistence_errors: &mut Vec<PersistenceError>,
    ) {
        let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
        info!(reason = %reason, "Cancelling build set");
        for node in table.not_started() {
            let cause = TaskFailure::Cancelled { reason: reason.clone() };
            if let Some((event, result)) = table.skip(node, cause) {
                self.notifier.publish(event);
                self.store(&result, persistence_errors).await;
            }
        }
    }

    async fn store(&self, result: &BuildResult, persistence_errors: &mut Vec<PersistenceError>) {
        if let Err(e) = self.results.store(result).await {
            persistence_errors.push(e);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_build_set(
        &self,
        options: &RunOptions,
        old_status: BuildSetStatus,
        new_status: BuildSetStatus,
        new_build_status: Option<TaskState>,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        description: String,
    ) {
        let old_build_status = match old_status {
            BuildSetStatus::Building => Some(TaskState::Running),
            _ => None,
        };
        self.notifier.publish(BuildSetStatusChangedEvent {
            old_status,
            new_status,
            old_build_status,
            new_build_status,
            build_set_task_id: options.build_set_id,
            user_id: options.user_id,
            start_time,
            end_time,
            description,
        });
    }
}

fn aggregate_status(cancelled: bool, results: &[BuildResult]) -> BuildSetStatus {
    if cancelled {
        BuildSetStatus::Cancelled
    } else if results.iter().all(BuildResult::is_success) {
        BuildSetStatus::Success
    } else {
        BuildSetStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildStatus;
    use crate::executor::TaskId;

    #[test]
    fn test_aggregate_status() {
        let ok = BuildResult::success(TaskId::new(1), "a", "d", Vec::new(), Utc::now());
        let skipped = BuildResult::unsuccessful(
            TaskId::new(2),
            "b",
            TaskFailure::DependencyFailed { dependency: "x".into() },
        );

        assert_eq!(aggregate_status(false, &[]), BuildSetStatus::Success);
        assert_eq!(aggregate_status(false, &[ok.clone()]), BuildSetStatus::Success);
        assert_eq!(aggregate_status(false, &[ok.clone(), skipped.clone()]), BuildSetStatus::Failed);
        assert_eq!(aggregate_status(true, &[ok]), BuildSetStatus::Cancelled);
        assert_eq!(skipped.status, BuildStatus::Skipped);
    }

    #[test]
    fn test_run_options_builder() {
        let user = Uuid::new_v4();
        let options = RunOptions::new().with_user(user).with_description("nightly");

        assert_eq!(options.user_id, Some(user));
        assert_eq!(options.description, "nightly");
        assert!(!options.cancel.is_cancelled());
    }
}
