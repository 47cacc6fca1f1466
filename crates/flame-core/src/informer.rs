//! Callbacks observing a task watch loop.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{FlameError, Task};

/// Observer of task updates delivered by a watch stream.
///
/// Both hooks default to no-ops, so implementors only override what they
/// need. `on_update` is called for every snapshot, in stream order, including
/// non-terminal ones. `on_error` is called once when the watch loop fails.
pub trait TaskInformer: Send {
    /// Called for every task snapshot.
    fn on_update(&mut self, _task: &Task) {}

    /// Called when watching fails.
    fn on_error(&mut self, _error: &FlameError) {}
}

/// Informer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInformer;

impl TaskInformer for NoopInformer {}

/// Shared informer, so concurrent watch loops can report into one sink.
impl<T> TaskInformer for Arc<Mutex<T>>
where
    T: TaskInformer + ?Sized,
{
    fn on_update(&mut self, task: &Task) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_update(task);
    }

    fn on_error(&mut self, error: &FlameError) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_error(error);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::TaskState;

    #[derive(Default)]
    struct Recorder {
        states: Vec<TaskState>,
        errors: usize,
    }

    impl TaskInformer for Recorder {
        fn on_update(&mut self, task: &Task) {
            self.states.push(task.state);
        }

        fn on_error(&mut self, _error: &FlameError) {
            self.errors += 1;
        }
    }

    fn task(state: TaskState) -> Task {
        Task {
            id: "1".to_string(),
            session_id: "s".to_string(),
            state,
            input: None,
            output: None,
            creation_time: Utc::now(),
            completion_time: None,
        }
    }

    #[test]
    fn test_noop_informer_accepts_everything() {
        let mut informer = NoopInformer;
        informer.on_update(&task(TaskState::Running));
        informer.on_error(&FlameError::Internal("boom".to_string()));
    }

    #[test]
    fn test_shared_informer_forwards_to_inner() {
        let shared = Arc::new(Mutex::new(Recorder::default()));
        let mut a = Arc::clone(&shared);
        let mut b = Arc::clone(&shared);

        a.on_update(&task(TaskState::Pending));
        b.on_update(&task(TaskState::Succeed));
        b.on_error(&FlameError::Internal("boom".to_string()));

        let recorder = shared.lock().unwrap();
        assert_eq!(recorder.states, vec![TaskState::Pending, TaskState::Succeed]);
        assert_eq!(recorder.errors, 1);
    }
}
