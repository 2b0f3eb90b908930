//! Status-change eligibility, evaluated against the flat task list.

use tracing::warn;

use crate::error::{EvtError, Result};
use crate::fields::Status;
use crate::task::TaskRecord;

/// Direct children of `id` according to each task's normalized parent.
pub fn children_of(tasks: &[TaskRecord], id: u64) -> impl Iterator<Item = &TaskRecord> {
    tasks
        .iter()
        .filter(move |t| t.id != id && t.parent_id() == Some(id))
}

/// Check whether task `id` may move to `new_status`.
///
/// Only entry into `completed` is gated: every direct child must already be
/// completed. A task without children always passes. Nothing is modified; a
/// rejected change must not be written.
pub fn check_status_change(tasks: &[TaskRecord], id: u64, new_status: Status) -> Result<()> {
    if !tasks.iter().any(|t| t.id == id) {
        return Err(EvtError::TaskNotFound { id });
    }
    if new_status != Status::Completed {
        return Ok(());
    }

    let mut blocking: Vec<u64> = children_of(tasks, id)
        .filter(|t| t.status != Status::Completed)
        .map(|t| t.id)
        .collect();
    if blocking.is_empty() {
        return Ok(());
    }
    blocking.sort_unstable();
    warn!(task = id, ?blocking, "completion refused, subtasks still open");
    Err(EvtError::IncompleteChildren { id, blocking })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> Vec<TaskRecord> {
        vec![
            TaskRecord::new(1, "P"),
            TaskRecord::new(2, "open child").with_parent(1),
            TaskRecord::new(3, "done child")
                .with_parent(1)
                .with_status(Status::Completed),
            TaskRecord::new(4, "leaf"),
        ]
    }

    #[test]
    fn completion_waits_for_children() {
        let mut tasks = tasks();
        let err = check_status_change(&tasks, 1, Status::Completed).unwrap_err();
        match err {
            EvtError::IncompleteChildren { id, blocking } => {
                assert_eq!(id, 1);
                assert_eq!(blocking, vec![2]);
            }
            other => panic!("unexpected error: {other}"),
        }

        tasks[1].status = Status::Completed;
        assert!(check_status_change(&tasks, 1, Status::Completed).is_ok());
    }

    #[test]
    fn other_targets_are_never_gated() {
        let tasks = tasks();
        for status in [Status::Pending, Status::InProgress, Status::Cancelled] {
            assert!(check_status_change(&tasks, 1, status).is_ok());
        }
    }

    #[test]
    fn childless_task_can_complete() {
        assert!(check_status_change(&tasks(), 4, Status::Completed).is_ok());
    }

    #[test]
    fn cancelled_children_still_block() {
        let tasks = vec![
            TaskRecord::new(1, "P"),
            TaskRecord::new(2, "c").with_parent(1).with_status(Status::Cancelled),
        ];
        assert!(check_status_change(&tasks, 1, Status::Completed).is_err());
    }

    #[test]
    fn string_parents_count_as_children() {
        let tasks = vec![
            TaskRecord::new(1, "P"),
            TaskRecord::new(2, "c").with_raw_parent("1"),
        ];
        assert_eq!(children_of(&tasks, 1).count(), 1);
        assert!(check_status_change(&tasks, 1, Status::Completed).is_err());
    }

    #[test]
    fn self_parent_does_not_block_itself() {
        let tasks = vec![TaskRecord::new(5, "me").with_parent(5)];
        assert!(check_status_change(&tasks, 5, Status::Completed).is_ok());
    }

    #[test]
    fn unknown_task_is_reported() {
        assert!(matches!(
            check_status_change(&tasks(), 42, Status::Pending),
            Err(EvtError::TaskNotFound { id: 42 })
        ));
    }
}
