mod queue;
pub mod types;

pub use queue::TaskQueue;
pub use types::{Task, TaskError, TaskStatus};

/// `queued → running → {succeeded | failed}`, plus `queued → canceled`.
/// Terminal states have no way out, and a running task cannot be canceled.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    match from {
        TaskStatus::Queued => matches!(to, TaskStatus::Running | TaskStatus::Canceled),
        TaskStatus::Running => matches!(to, TaskStatus::Succeeded | TaskStatus::Failed),
        TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled => false,
    }
}

#[cfg(test)]
mod tests;
