//! Routing of driver completion callbacks back to the waiting executor.

use crate::core::Artifact;
use crate::executor::TaskId;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a driver reports when a build finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    /// The build succeeded and produced these artifacts.
    Success {
        /// Produced artifacts.
        artifacts: Vec<Artifact>,
    },
    /// The build ran and failed.
    Failure {
        /// Failure detail.
        message: String,
    },
}

impl DriverOutcome {
    /// A successful outcome without artifacts.
    #[must_use]
    pub fn success() -> Self {
        Self::Success { artifacts: Vec::new() }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// Pending completion channels keyed by task id.
///
/// The executor registers a task before starting its driver and waits on the
/// returned receiver. Drivers only ever see a [`CompletionHandle`].
#[derive(Debug, Default)]
pub struct CompletionRegistry {
    pending: DashMap<TaskId, oneshot::Sender<DriverOutcome>>,
}

impl CompletionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a task and returns the receiver its outcome arrives on,
    /// plus the handle to give to the driver.
    pub fn register(self: &Arc<Self>, task_id: TaskId) -> (CompletionHandle, oneshot::Receiver<DriverOutcome>) {
        let (tx, rx) = oneshot::channel();
        if self.pending.insert(task_id, tx).is_some() {
            warn!(task_id = %task_id, "Replacing an existing completion registration");
        }
        let handle = CompletionHandle {
            task_id,
            registry: Arc::downgrade(self),
        };
        (handle, rx)
    }

    /// Drops a task's registration; later completions for it are ignored.
    pub fn abandon(&self, task_id: TaskId) -> bool {
        self.pending.remove(&task_id).is_some()
    }

    /// Number of tasks still awaiting completion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn deliver(&self, task_id: TaskId, outcome: DriverOutcome) -> bool {
        let Some((_, tx)) = self.pending.remove(&task_id) else {
            debug!(task_id = %task_id, "Ignoring completion for a task no longer awaited");
            return false;
        };
        tx.send(outcome).is_ok()
    }
}

/// Callback handed to a driver for one build.
///
/// Holds only the task id and a weak reference to the registry; completing
/// consumes the handle, so a driver can signal at most once.
#[derive(Debug)]
pub struct CompletionHandle {
    task_id: TaskId,
    registry: Weak<CompletionRegistry>,
}

impl CompletionHandle {
    /// The task this handle completes.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Signals the build outcome.
    ///
    /// Returns false if nobody is waiting any more (timed out, cancelled, or
    /// the engine shut down).
    pub fn complete(self, outcome: DriverOutcome) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.deliver(self.task_id, outcome),
            None => false,
        }
    }
}
