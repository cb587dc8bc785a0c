use chrono::Utc;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use super::can_transition;
use super::types::{Task, TaskError, TaskEvent, TaskProgress, TaskStatus};
use crate::core::provider::{GenerationOutput, OperationKind};

const EVENT_CAPACITY: usize = 64;

pub type TaskEventStream = Pin<Box<dyn Stream<Item = TaskEvent> + Send>>;

struct TaskEntry {
    task: Task,
    result: Option<GenerationOutput>,
    /// Dropped together with the terminal event, which closes every stream.
    events: Option<broadcast::Sender<TaskEvent>>,
}

impl TaskEntry {
    fn emit(&self, event: TaskEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Client-visible ledger of logical operations, in creation order.
#[derive(Default)]
pub struct TaskQueue {
    entries: Mutex<Vec<TaskEntry>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, kind: OperationKind, prompt: &str, board_ref: Option<String>) -> Task {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: TaskStatus::Queued,
            prompt: prompt.to_string(),
            board_ref,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: None,
            error: None,
        };
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let entry = TaskEntry {
            task: task.clone(),
            result: None,
            events: Some(tx),
        };
        entry.emit(TaskEvent::Queued);
        debug!("Task {} queued ({})", task.id, kind.as_str());
        self.lock().push(entry);
        task
    }

    pub fn list(&self) -> Vec<Task> {
        self.lock().iter().map(|e| e.task.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().iter().find(|e| e.task.id == id).map(|e| e.task.clone())
    }

    pub fn result(&self, id: &str) -> Option<GenerationOutput> {
        self.lock()
            .iter()
            .find(|e| e.task.id == id)
            .and_then(|e| e.result.clone())
    }

    pub fn mark_running(&self, id: &str) -> Result<Task, TaskError> {
        self.transition(id, TaskStatus::Running, |entry| {
            entry.task.started_at = Some(Utc::now());
            TaskEvent::Running
        })
    }

    /// `output` is `None` when the caller already handed the result back
    /// and nothing should be kept for later retrieval.
    pub fn succeed(&self, id: &str, output: Option<GenerationOutput>) -> Result<Task, TaskError> {
        self.transition(id, TaskStatus::Succeeded, |entry| {
            entry.result = output;
            TaskEvent::Succeeded
        })
    }

    pub fn fail(&self, id: &str, message: &str) -> Result<Task, TaskError> {
        self.transition(id, TaskStatus::Failed, |entry| {
            entry.task.error = Some(message.to_string());
            TaskEvent::Failed {
                message: message.to_string(),
            }
        })
    }

    /// Only a queued task can be canceled; running work is never interrupted.
    pub fn cancel(&self, id: &str) -> Result<Task, TaskError> {
        self.transition(id, TaskStatus::Canceled, |_| TaskEvent::Canceled)
    }

    /// Progress updates are dropped for tasks that are not running.
    pub fn report_progress(&self, id: &str, completed: usize, desired: usize) -> Result<(), TaskError> {
        let mut entries = self.lock();
        let entry = find_mut(&mut entries, id)?;
        if entry.task.status != TaskStatus::Running {
            return Ok(());
        }
        entry.task.progress = Some(TaskProgress { completed, desired });
        entry.emit(TaskEvent::Progress { completed, desired });
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Task, TaskError> {
        let mut entries = self.lock();
        let pos = entries
            .iter()
            .position(|e| e.task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let status = entries[pos].task.status;
        if !status.is_terminal() {
            return Err(TaskError::NotFinished {
                id: id.to_string(),
                status,
            });
        }
        Ok(entries.remove(pos).task)
    }

    /// Drop every succeeded, failed and canceled task in one step.
    pub fn clear_finished(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| !e.task.status.is_terminal());
        before - entries.len()
    }

    /// Current state first, then live events until the terminal one. A task
    /// that already finished yields just its terminal event.
    pub fn subscribe(&self, id: &str) -> Result<TaskEventStream, TaskError> {
        let entries = self.lock();
        let entry = entries
            .iter()
            .find(|e| e.task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let current = TaskEvent::for_status(entry.task.status, entry.task.error.as_deref());
        match &entry.events {
            Some(tx) if !entry.task.status.is_terminal() => {
                let live = BroadcastStream::new(tx.subscribe()).filter_map(|event| event.ok());
                Ok(Box::pin(tokio_stream::once(current).chain(live)))
            }
            _ => Ok(Box::pin(tokio_stream::once(current))),
        }
    }

    fn transition<F>(&self, id: &str, to: TaskStatus, apply: F) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut TaskEntry) -> TaskEvent,
    {
        let mut entries = self.lock();
        let entry = find_mut(&mut entries, id)?;
        let from = entry.task.status;
        if !can_transition(from, to) {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        entry.task.status = to;
        if to.is_terminal() {
            entry.task.finished_at = Some(Utc::now());
        }
        let event = apply(entry);
        entry.emit(event);
        if to.is_terminal() {
            entry.events = None;
        }
        debug!("Task {}: {} -> {}", id, from.as_str(), to.as_str());
        Ok(entry.task.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TaskEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn find_mut<'a>(entries: &'a mut [TaskEntry], id: &str) -> Result<&'a mut TaskEntry, TaskError> {
    entries
        .iter_mut()
        .find(|e| e.task.id == id)
        .ok_or_else(|| TaskError::NotFound(id.to_string()))
}
