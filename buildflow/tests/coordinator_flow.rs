//! End-to-end flow through the public API, wired by hand.

use buildflow::audit::BUILD_RECORD;
use buildflow::prelude::*;
use buildflow::testing::{
    DriverBehavior, RecordingEnvironmentDriver, RecordingRepositoryManager, ScriptedDriver,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

struct Wiring {
    coordinator: BuildCoordinator,
    datastore: Arc<InMemoryDatastore>,
    environments: Arc<RecordingEnvironmentDriver>,
    repositories: Arc<RecordingRepositoryManager>,
    events: tokio::sync::mpsc::UnboundedReceiver<StatusEvent>,
}

fn wire(maven: ScriptedDriver) -> anyhow::Result<Wiring> {
    let catalog = ProjectCatalog::from_projects([
        Project::new("core", BuildType::Java),
        Project::new("web", BuildType::Java).with_dependency("core"),
        Project::new("image", BuildType::Docker).with_dependencies(["core", "web"]),
    ])?;

    let docker = ScriptedDriver::new("docker", BuildType::Docker);
    let drivers = DriverRegistry::builder()
        .register(Arc::new(maven))
        .register(Arc::new(docker))
        .build();

    let environments = Arc::new(RecordingEnvironmentDriver::new("containers"));
    let repositories = Arc::new(RecordingRepositoryManager::new());
    let config = OrchestratorConfig::from_json_str(r#"{"task_timeout_ms": 500}"#)?;

    let executor = BuildTaskExecutor::new(
        Arc::new(drivers),
        Arc::new(EnvironmentProvisioner::single(environments.clone())),
        Arc::new(RepositoryProvisioner::new(repositories.clone())),
        config,
    );

    let notifier = Arc::new(StatusNotifier::new());
    let (subscriber, events) = ChannelSubscriber::new();
    notifier.subscribe(Arc::new(subscriber));
    notifier.subscribe(Arc::new(LoggingSubscriber::debug()));

    let datastore = Arc::new(InMemoryDatastore::new());
    let scheduler = DependencyScheduler::new(
        Arc::new(catalog),
        Arc::new(executor),
        notifier,
        ResultSink::new(datastore.clone()),
    );

    Ok(Wiring {
        coordinator: BuildCoordinator::new(scheduler),
        datastore,
        environments,
        repositories,
        events,
    })
}

fn drain(events: &mut tokio::sync::mpsc::UnboundedReceiver<StatusEvent>) -> Vec<String> {
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_type());
    }
    names
}

#[tokio::test]
async fn test_build_set_runs_to_success() -> anyhow::Result<()> {
    let mut wiring = wire(ScriptedDriver::new("maven", BuildType::Java))?;
    let ctx = RequestContext::new(User::new("carol"));

    let started = wiring.coordinator.start_build("image", &ctx)?;
    let finished = wiring.coordinator.finish_build(started.build_set_id, &ctx).await?;

    assert_eq!(finished.status, BuildSetStatus::Success);
    assert_eq!(finished.results.len(), 3);
    assert!(finished.results.iter().all(|r| r.artifacts.len() == 1));

    assert_eq!(wiring.datastore.len(), 3);
    let revisions = wiring.datastore.revisions(BUILD_RECORD).await?;
    assert_eq!(revisions.len(), 3);

    assert_eq!(wiring.environments.total_provisioned(), 3);
    assert_eq!(wiring.environments.total_teardowns(), 3);
    assert_eq!(wiring.repositories.total_cleanups(), 3);

    let names = drain(&mut wiring.events);
    assert_eq!(names.first().map(String::as_str), Some("build_set.building"));
    assert_eq!(names.last().map(String::as_str), Some("build_set.success"));
    assert_eq!(names.iter().filter(|n| *n == "build.success").count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_dependency_skips_dependents() -> anyhow::Result<()> {
    let maven = ScriptedDriver::new("maven", BuildType::Java)
        .with_behavior("core", DriverBehavior::fail("compilation error"));
    let mut wiring = wire(maven)?;
    let ctx = RequestContext::new(User::new("carol"));

    let started = wiring.coordinator.start_build("image", &ctx)?;
    let finished = wiring.coordinator.finish_build(started.build_set_id, &ctx).await?;

    assert_eq!(finished.status, BuildSetStatus::Failed);
    let status_of = |project: &str| {
        finished
            .results
            .iter()
            .find(|r| r.project == project)
            .map(|r| r.status)
    };
    assert_eq!(status_of("core"), Some(BuildStatus::Failed));
    assert_eq!(status_of("web"), Some(BuildStatus::Skipped));
    assert_eq!(status_of("image"), Some(BuildStatus::Skipped));

    assert_eq!(wiring.environments.total_provisioned(), 1);
    assert_eq!(wiring.environments.total_teardowns(), 1);
    assert_eq!(wiring.datastore.len(), 3);

    let names = drain(&mut wiring.events);
    assert_eq!(names.last().map(String::as_str), Some("build_set.failed"));
    Ok(())
}

#[tokio::test]
async fn test_hung_driver_is_bounded() -> anyhow::Result<()> {
    let maven = ScriptedDriver::new("maven", BuildType::Java).with_behavior("web", DriverBehavior::Hang);
    let wiring = wire(maven)?;
    let ctx = RequestContext::new(User::new("carol"));

    let started = wiring.coordinator.start_build("web", &ctx)?;
    let finished = tokio::time::timeout(
        Duration::from_secs(5),
        wiring.coordinator.finish_build(started.build_set_id, &ctx),
    )
    .await??;

    assert_eq!(finished.status, BuildSetStatus::Failed);
    let web = finished.results.iter().find(|r| r.project == "web");
    assert_eq!(
        web.and_then(|r| r.cause.clone()),
        Some(TaskFailure::DriverHung { timeout_ms: 500 })
    );
    assert_eq!(wiring.environments.total_provisioned(), wiring.environments.total_teardowns());
    Ok(())
}
