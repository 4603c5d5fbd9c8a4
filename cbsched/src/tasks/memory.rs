//! In-memory task queue for tests and local development.
//!
//! Records every submission instead of scheduling it. The queue can be told to answer with
//! "no task" or to fail, which lets tests drive every submission outcome of the fulfillment
//! handler without a real queue.
//!
//! Only the most recent submissions are kept (see [`DEFAULT_HISTORY_LIMIT`]), so the backend can
//! run for a long time without growing; older entries are dropped while the call count keeps
//! counting.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{HttpTask, Result, TaskHandle, TaskQueue, TaskQueueError};

/// Submissions kept by [`InMemoryTaskQueue::new`]
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// A submission recorded by [`InMemoryTaskQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTask {
    pub queue: String,
    pub task: HttpTask,
}

#[derive(Debug, Clone, Default)]
enum Behavior {
    #[default]
    Create,
    ReturnNone,
    Fail(String),
}

#[derive(Debug)]
struct QueueState {
    behavior: Behavior,
    history_limit: usize,
    calls: usize,
    submitted: VecDeque<SubmittedTask>,
}

/// Recording task queue. Every call is recorded, whatever the configured outcome.
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that keeps at most `limit` recent submissions
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                behavior: Behavior::Create,
                history_limit: limit,
                calls: 0,
                submitted: VecDeque::new(),
            }),
        }
    }

    /// A queue that completes every call without creating a task
    pub fn returning_none() -> Self {
        let queue = Self::new();
        queue.lock().behavior = Behavior::ReturnNone;
        queue
    }

    /// A queue whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        let queue = Self::new();
        queue.lock().behavior = Behavior::Fail(message.into());
        queue
    }

    /// Retained submissions, oldest first
    pub fn submitted(&self) -> Vec<SubmittedTask> {
        self.lock().submitted.iter().cloned().collect()
    }

    /// Calls made so far, including ones no longer retained
    pub fn submission_count(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Poisoning is ignored: every update leaves the state consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn create_task(&self, queue: &str, task: HttpTask) -> Result<Option<TaskHandle>> {
        let mut state = self.lock();
        state.calls += 1;
        let sequence = state.calls;

        if state.history_limit > 0 {
            if state.submitted.len() == state.history_limit {
                state.submitted.pop_front();
            }
            state.submitted.push_back(SubmittedTask {
                queue: queue.to_string(),
                task,
            });
        }

        match &state.behavior {
            Behavior::Create => {
                let name = format!("{}/tasks/{}", queue.trim_end_matches('/'), sequence);
                tracing::debug!(%name, "Recorded in-memory task");
                Ok(Some(TaskHandle { name }))
            }
            Behavior::ReturnNone => Ok(None),
            Behavior::Fail(message) => Err(TaskQueueError::QueueApi(message.clone())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
