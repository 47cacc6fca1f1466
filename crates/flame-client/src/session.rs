//! Session handle: task submission and supervised execution.

use flame_core::{
    FlameError, NoopInformer, Result, SessionInfo, SessionState, Task, TaskInformer, TaskInput,
};
use flame_transport::protocol::{CreateTaskRequest, GetTaskRequest, TaskSpec, WatchTaskRequest};

use crate::{
    connection::{Connection, rpc_error},
    watcher::TaskWatcher,
};

/// An execution context bound to an application and a slot allotment.
///
/// The held [`SessionInfo`] is the last snapshot returned by the service;
/// it changes only through [`Session::refresh`] and [`Session::close`].
#[derive(Debug, Clone)]
pub struct Session {
    connection: Connection,
    info: SessionInfo,
}

impl Session {
    pub(crate) const fn new(connection: Connection, info: SessionInfo) -> Self {
        Self { connection, info }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.info.state
    }

    /// Last known snapshot of the session.
    #[must_use]
    pub const fn info(&self) -> &SessionInfo {
        &self.info
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    fn ensure_open(&self) -> Result<()> {
        if self.info.is_closed() {
            return Err(FlameError::InvalidState(format!(
                "session <{}> is closed",
                self.info.id
            )));
        }
        Ok(())
    }

    /// Submit a task with `input`.
    ///
    /// # Errors
    /// Returns `InvalidState` if the session or its connection is closed,
    /// `InvalidArgument` if the input exceeds the message size limit, and
    /// `Internal` if the service fails.
    pub async fn create_task(&self, input: Option<TaskInput>) -> Result<Task> {
        self.ensure_open()?;
        if let Some(input) = &input {
            self.connection.check_payload("task input", input.len())?;
        }

        let task = self
            .connection
            .frontend()?
            .create_task(CreateTaskRequest {
                task: Some(TaskSpec {
                    session_id: self.info.id.clone(),
                    input,
                    output: None,
                }),
            })
            .await
            .map_err(rpc_error("create task"))?;
        let task = Task::try_from(task)?;

        tracing::debug!("Task <{}/{}> created", self.info.id, task.id);
        Ok(task)
    }

    /// Current snapshot of a task, including its output once terminal.
    ///
    /// # Errors
    /// Returns `Internal` if the service fails or the task is unknown.
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        let task = self
            .connection
            .frontend()?
            .get_task(GetTaskRequest {
                task_id: id.to_string(),
                session_id: self.info.id.clone(),
            })
            .await
            .map_err(rpc_error("get task"))?;
        Task::try_from(task)
    }

    /// Open a watch stream for one task.
    ///
    /// # Errors
    /// Returns `Internal` if the stream cannot be opened.
    pub async fn watch_task(&self, id: &str) -> Result<TaskWatcher> {
        let stream = self
            .connection
            .frontend()?
            .watch_task(WatchTaskRequest {
                task_id: id.to_string(),
                session_id: self.info.id.clone(),
            })
            .await
            .map_err(rpc_error("watch task"))?;

        Ok(TaskWatcher::new(
            self.info.id.clone(),
            id.to_string(),
            stream,
            self.connection.closed_signal(),
        ))
    }

    /// Create a task and watch it until it completes.
    ///
    /// Every snapshot is passed to `informer` in delivery order. Returns the
    /// first terminal snapshot without draining the rest of the stream. A
    /// stream that ends before completion is an `Internal` error. Errors from
    /// the watch loop are passed to `informer` once before being returned.
    ///
    /// # Errors
    /// Returns the errors of [`Session::create_task`], and `Internal` if the
    /// watch fails or ends early.
    pub async fn invoke(
        &self,
        input: Option<TaskInput>,
        informer: Option<&mut dyn TaskInformer>,
    ) -> Result<Task> {
        let task = self.create_task(input).await?;

        let mut noop = NoopInformer;
        let informer = informer.unwrap_or(&mut noop);

        match self.follow(&task.id, informer).await {
            Ok(task) => Ok(task),
            Err(err) => {
                informer.on_error(&err);
                Err(err)
            }
        }
    }

    /// Run a task to completion, reporting progress only through `informer`.
    ///
    /// # Errors
    /// See [`Session::invoke`].
    pub async fn run_task(
        &self,
        input: Option<TaskInput>,
        informer: &mut dyn TaskInformer,
    ) -> Result<()> {
        self.invoke(input, Some(informer)).await.map(|_| ())
    }

    async fn follow(&self, task_id: &str, informer: &mut dyn TaskInformer) -> Result<Task> {
        let mut watcher = self.watch_task(task_id).await?;

        while let Some(task) = watcher.next().await? {
            informer.on_update(&task);
            if task.is_completed() {
                return Ok(task);
            }
        }

        Err(FlameError::Internal(format!(
            "watch of task <{}/{task_id}> ended before completion",
            self.info.id
        )))
    }

    /// Re-read the session snapshot from the service.
    ///
    /// # Errors
    /// Returns `Internal` if the service fails.
    pub async fn refresh(&mut self) -> Result<&SessionInfo> {
        self.info = self.connection.session_info(&self.info.id).await?;
        Ok(&self.info)
    }

    /// Close the session, keeping the final snapshot.
    ///
    /// # Errors
    /// Returns `InvalidState` if the connection is closed and `Internal` if
    /// the service fails.
    pub async fn close(&mut self) -> Result<&SessionInfo> {
        self.info = self.connection.close_session(&self.info.id).await?;
        Ok(&self.info)
    }
}
