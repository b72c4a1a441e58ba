//! Concurrent task registry.
//!
//! Each task lives behind its own lock so updates to one task never block
//! another. The outer map lock is held only for insert and lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use tracing::{debug, info};
use uuid::Uuid;

use crate::core::complexity;
use crate::core::types::{ConversationResult, Task, TaskError, TaskId, TaskState};

/// Error message recorded on cancelled tasks.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug)]
struct TaskEntry {
    task: Mutex<Task>,
    result: OnceLock<ConversationResult>,
    cancelled: AtomicBool,
}

impl TaskEntry {
    fn lock(&self) -> std::sync::MutexGuard<'_, Task> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a task for `text` in `PENDING` with an advisory turn estimate.
    pub fn create(&self, text: &str) -> TaskId {
        let task_id = Uuid::new_v4().to_string();
        let estimate = complexity::estimate(text);
        let entry = Arc::new(TaskEntry {
            task: Mutex::new(Task::new(task_id.clone(), estimate)),
            result: OnceLock::new(),
            cancelled: AtomicBool::new(false),
        });
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.clone(), entry);
        info!(%task_id, estimate, "task created");
        task_id
    }

    fn entry(&self, task_id: &str) -> Result<Arc<TaskEntry>, TaskError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    /// Snapshot of the task's current state.
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.entry(task_id).ok().map(|entry| entry.lock().clone())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entry(task_id).is_ok()
    }

    pub fn result(&self, task_id: &str) -> Option<ConversationResult> {
        self.entry(task_id).ok()?.result.get().cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to the task under its lock.
    pub(crate) fn update<R>(
        &self,
        task_id: &str,
        f: impl FnOnce(&mut Task) -> R,
    ) -> Result<R, TaskError> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();
        Ok(f(&mut task))
    }

    pub fn transition(&self, task_id: &str, next: TaskState) -> Result<(), TaskError> {
        self.update(task_id, |task| task.transition(next))?
    }

    /// Store the result. A second write for the same task is rejected.
    pub fn record_result(
        &self,
        task_id: &str,
        result: ConversationResult,
    ) -> Result<(), TaskError> {
        let entry = self.entry(task_id)?;
        entry
            .result
            .set(result)
            .map_err(|_| TaskError::ResultAlreadyRecorded(task_id.to_string()))
    }

    /// Mark the run `COMPLETED` and store its result in one step.
    ///
    /// Fails without storing anything when the task is no longer `RUNNING`
    /// (e.g. it was cancelled while the last turn was in flight).
    pub fn finish(
        &self,
        task_id: &str,
        result: ConversationResult,
        summary: String,
    ) -> Result<(), TaskError> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();
        task.transition(TaskState::Completed)?;
        task.current_turn = result.total_turns;
        task.current_action = "finished".to_string();
        task.summary = Some(summary);
        if entry.result.set(result).is_err() {
            return Err(TaskError::ResultAlreadyRecorded(task_id.to_string()));
        }
        debug!(%task_id, "task completed");
        Ok(())
    }

    /// Force the task to `FAILED` with `error`. A task already failed keeps
    /// its first error.
    pub fn fail(&self, task_id: &str, error: &str) -> Result<(), TaskError> {
        self.update(task_id, |task| {
            if task.status() == TaskState::Failed {
                return Ok(());
            }
            task.transition(TaskState::Failed)?;
            task.current_action = "failed".to_string();
            task.error_message = Some(error.to_string());
            Ok(())
        })?
    }

    /// Request cancellation. Returns `false` when the task already reached
    /// a terminal state.
    pub fn cancel(&self, task_id: &str) -> Result<bool, TaskError> {
        Ok(self.cancel_from(task_id)?.is_some())
    }

    /// Like [`cancel`](Self::cancel), but reports the status the task was
    /// cancelled from.
    pub(crate) fn cancel_from(&self, task_id: &str) -> Result<Option<TaskState>, TaskError> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock();
        let previous = task.status();
        if previous.is_terminal() {
            return Ok(None);
        }
        task.transition(TaskState::Failed)?;
        task.current_action = CANCELLED.to_string();
        task.error_message = Some(CANCELLED.to_string());
        entry.cancelled.store(true, Ordering::SeqCst);
        info!(%task_id, from = previous.as_str(), "task cancelled");
        Ok(Some(previous))
    }

    pub fn is_cancelled(&self, task_id: &str) -> bool {
        self.entry(task_id)
            .is_ok_and(|entry| entry.cancelled.load(Ordering::SeqCst))
    }
}
