//! LIFO teardown of the scoped resources owned by one task.

use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

struct TeardownStep {
    name: String,
    run: TeardownFn,
}

/// Teardown steps for a task's resources, run in reverse registration order.
///
/// Every registered step runs exactly once when [`TeardownStack::run_all`] is
/// called. A failing or timed-out step is logged and does not stop the
/// remaining steps.
#[derive(Default)]
pub struct TeardownStack {
    steps: Vec<TeardownStep>,
}

impl TeardownStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a teardown step.
    pub fn push<F, Fut>(&mut self, name: impl Into<String>, step: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.steps.push(TeardownStep {
            name: name.into(),
            run: Box::new(move || Box::pin(step())),
        });
    }

    /// Returns the number of pending steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs all steps in LIFO order, each bounded by `step_timeout`.
    ///
    /// Returns `(step, error)` for every step that failed.
    pub async fn run_all(self, step_timeout: Duration) -> Vec<(String, String)> {
        let mut failures = Vec::new();

        for step in self.steps.into_iter().rev() {
            match tokio::time::timeout(step_timeout, (step.run)()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(step = %step.name, error = %e, "Teardown step failed");
                    failures.push((step.name, e));
                }
                Err(_) => {
                    let msg = format!("timed out after {}ms", step_timeout.as_millis());
                    warn!(step = %step.name, "Teardown step {}", msg);
                    failures.push((step.name, msg));
                }
            }
        }

        failures
    }
}

impl std::fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownStack")
            .field("steps", &self.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();

        for i in 1..=3 {
            let order = order.clone();
            stack.push(format!("step{i}"), move || async move {
                order.lock().push(i);
                Ok(())
            });
        }
        assert_eq!(stack.len(), 3);

        let failures = stack.run_all(Duration::from_secs(1)).await;

        assert!(failures.is_empty());
        assert_eq!(*order.lock(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_continues_after_failure() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let mut stack = TeardownStack::new();

        let first = ran.clone();
        stack.push("first", move || async move {
            first.lock().push("first");
            Ok(())
        });
        stack.push("broken", || async { Err("backend unreachable".to_string()) });

        let failures = stack.run_all(Duration::from_secs(1)).await;

        assert_eq!(failures, vec![("broken".to_string(), "backend unreachable".to_string())]);
        assert_eq!(*ran.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let mut stack = TeardownStack::new();
        stack.push("slow", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        let failures = stack.run_all(Duration::from_millis(20)).await;

        assert_eq!(failures.len(), 1);
        assert!(failures[0].1.contains("timed out"));
    }
}
