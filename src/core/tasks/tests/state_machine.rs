use crate::core::tasks::{TaskStatus, can_transition};

const ALL: [TaskStatus; 5] = [
    TaskStatus::Queued,
    TaskStatus::Running,
    TaskStatus::Succeeded,
    TaskStatus::Failed,
    TaskStatus::Canceled,
];

#[test]
fn lifecycle_happy_path_transitions_are_allowed() {
    let path = [
        (TaskStatus::Queued, TaskStatus::Running),
        (TaskStatus::Running, TaskStatus::Succeeded),
        (TaskStatus::Running, TaskStatus::Failed),
    ];
    for (from, to) in path {
        assert!(
            can_transition(from, to),
            "expected transition {:?} -> {:?} to be allowed",
            from,
            to
        );
    }
}

#[test]
fn cancel_is_only_allowed_before_start() {
    assert!(can_transition(TaskStatus::Queued, TaskStatus::Canceled));
    assert!(!can_transition(TaskStatus::Running, TaskStatus::Canceled));
}

#[test]
fn terminal_states_have_no_outgoing_transitions() {
    for from in [TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Canceled] {
        for to in ALL {
            assert!(
                !can_transition(from, to),
                "expected transition {:?} -> {:?} to be rejected",
                from,
                to
            );
        }
    }
}

#[test]
fn queued_cannot_skip_running() {
    assert!(!can_transition(TaskStatus::Queued, TaskStatus::Succeeded));
    assert!(!can_transition(TaskStatus::Queued, TaskStatus::Failed));
    assert!(!can_transition(TaskStatus::Running, TaskStatus::Queued));
}

#[test]
fn no_status_transitions_to_itself() {
    for status in ALL {
        assert!(
            !can_transition(status, status),
            "expected transition {:?} -> {:?} to be rejected",
            status,
            status
        );
    }
}
