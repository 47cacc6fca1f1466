//! Forward-only cursor over one task's watch stream.

use std::fmt;

use flame_core::{FlameError, Result, SessionId, Task, TaskId, TaskState};
use flame_transport::TaskStream;
use futures::{Stream, StreamExt, future, stream};
use tokio::sync::watch;

/// Cursor over the snapshots of one task.
///
/// Each call to [`TaskWatcher::next`] yields the next snapshot, `None` once
/// the stream has ended, or an `Internal` error. The watcher is fused: after
/// the end or an error every further pull returns `Ok(None)`.
pub struct TaskWatcher {
    session_id: SessionId,
    task_id: TaskId,
    stream: TaskStream,
    closed: watch::Receiver<bool>,
    last: Option<TaskState>,
    done: bool,
}

impl fmt::Debug for TaskWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWatcher")
            .field("session_id", &self.session_id)
            .field("task_id", &self.task_id)
            .field("last", &self.last)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

async fn connection_closed(closed: &mut watch::Receiver<bool>) {
    let signalled = closed.wait_for(|closed| *closed).await.is_ok();
    if !signalled {
        // Connection dropped without closing; the stream ends on its own.
        future::pending::<()>().await;
    }
}

impl TaskWatcher {
    pub(crate) fn new(
        session_id: SessionId,
        task_id: TaskId,
        stream: TaskStream,
        closed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session_id,
            task_id,
            stream,
            closed,
            last: None,
            done: false,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// State of the last snapshot yielded, if any.
    #[must_use]
    pub const fn last_state(&self) -> Option<TaskState> {
        self.last
    }

    /// Whether a terminal snapshot has been yielded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.last.is_some_and(TaskState::is_terminal)
    }

    /// Pull the next snapshot.
    ///
    /// # Errors
    /// Returns `Internal` if the stream fails, delivers a malformed snapshot
    /// or a state regression, or the connection is closed while waiting.
    pub async fn next(&mut self) -> Result<Option<Task>> {
        if self.done {
            return Ok(None);
        }

        let item = tokio::select! {
            biased;
            () = connection_closed(&mut self.closed) => {
                return Err(self.fail("connection closed".to_string()));
            }
            item = self.stream.next() => item,
        };

        let Some(item) = item else {
            self.done = true;
            if !self.is_completed() {
                tracing::warn!(
                    "Watch stream of task <{}/{}> ended in state {:?}",
                    self.session_id,
                    self.task_id,
                    self.last
                );
            }
            return Ok(None);
        };

        let task = match item {
            Ok(task) => Task::try_from(task),
            Err(status) => Err(FlameError::Internal(format!(
                "failed to watch task: {} ({:?})",
                status.message(),
                status.code()
            ))),
        };
        let task = match task {
            Ok(task) => task,
            Err(err) => {
                self.done = true;
                return Err(err);
            }
        };

        if let Some(previous) = self.last {
            if !task.state.may_follow(previous) {
                tracing::warn!(
                    "Task <{}/{}> went from {previous:?} to {:?}",
                    self.session_id,
                    self.task_id,
                    task.state
                );
                return Err(self.fail(format!(
                    "task state regressed from {previous:?} to {:?}",
                    task.state
                )));
            }
        }

        tracing::trace!(
            "Task <{}/{}> is {:?}",
            self.session_id,
            self.task_id,
            task.state
        );
        self.last = Some(task.state);
        Ok(Some(task))
    }

    fn fail(&mut self, reason: String) -> FlameError {
        self.done = true;
        FlameError::Internal(format!(
            "watch of task <{}/{}> failed: {reason}",
            self.session_id, self.task_id
        ))
    }

    /// Adapt the cursor into a stream ending after the end or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Task>> + Send {
        stream::unfold(self, |mut watcher| async move {
            match watcher.next().await {
                Ok(Some(task)) => Some((Ok(task), watcher)),
                Ok(None) => None,
                Err(err) => Some((Err(err), watcher)),
            }
        })
    }
}
