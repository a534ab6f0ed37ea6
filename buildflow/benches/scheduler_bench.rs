//! Benchmarks for dependency planning and scheduling.

use buildflow::core::{BuildType, Project, ProjectCatalog};
use buildflow::scheduler::{ProjectGraph, RunOptions};
use buildflow::testing::{universal_driver, DriverBehavior, TestEngine};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

/// `layers` layers of `width` projects; every project depends on all of the
/// previous layer.
fn layered_projects(layers: usize, width: usize) -> Vec<Project> {
    let mut projects = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for i in 0..width {
            let mut project = Project::new(format!("l{layer}-p{i}"), BuildType::Java);
            if layer > 0 {
                for dep in 0..width {
                    project = project.with_dependency(format!("l{}-p{dep}", layer - 1));
                }
            }
            projects.push(project);
        }
    }
    projects
}

fn top_layer(layers: usize, width: usize) -> Vec<String> {
    (0..width).map(|i| format!("l{}-p{i}", layers - 1)).collect()
}

fn planning_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for (layers, width) in [(10, 10), (50, 20)] {
        let catalog = ProjectCatalog::from_projects(layered_projects(layers, width)).unwrap();
        let roots = top_layer(layers, width);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{layers}x{width}")),
            &roots,
            |b, roots| {
                b.iter(|| {
                    let graph = ProjectGraph::closure(&catalog, black_box(roots.as_slice())).unwrap();
                    graph.check_acyclic().unwrap();
                    black_box(graph.topological_order())
                });
            },
        );
    }
    group.finish();
}

fn run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = TestEngine::builder()
        .projects(layered_projects(5, 8))
        .driver(universal_driver("bench").with_default(DriverBehavior::succeed_after(Duration::ZERO)))
        .build()
        .unwrap();
    let roots = top_layer(5, 8);

    c.bench_function("run_5x8", |b| {
        b.iter(|| {
            let report = runtime
                .block_on(engine.scheduler.run(roots.as_slice(), RunOptions::new()))
                .unwrap();
            black_box(report.status)
        });
    });
}

criterion_group!(benches, planning_benchmark, run_benchmark);
criterion_main!(benches);
