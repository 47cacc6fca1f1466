//! In-process frontend service.
//!
//! Useful for tests and local development. Keeps applications, sessions and
//! tasks in memory; data is lost when the last clone is dropped.
//!
//! Tasks stay `Pending` until either the installed [`TaskHandler`] runs them
//! or [`MemoryFrontend::update_task`] drives them.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use flame_core::{FlameError, TaskState};
use futures::{StreamExt, stream};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tonic::Status;
use uuid::Uuid;

use crate::{
    frontend::{Connector, Frontend, TaskStream},
    protocol as rpc,
};

/// Executes a task input, returning the output or a failure message.
pub type TaskHandler =
    Arc<dyn Fn(Option<Bytes>) -> Result<Option<Bytes>, String> + Send + Sync>;

struct TaskRecord {
    snapshot: Arc<watch::Sender<rpc::Task>>,
}

struct SessionRecord {
    spec: rpc::SessionSpec,
    state: rpc::SessionState,
    creation_time: i64,
    completion_time: Option<i64>,
    tasks: BTreeMap<u64, TaskRecord>,
}

struct ApplicationRecord {
    spec: rpc::ApplicationSpec,
    creation_time: i64,
}

#[derive(Default)]
struct State {
    applications: HashMap<String, ApplicationRecord>,
    sessions: HashMap<String, SessionRecord>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    handler: Option<TaskHandler>,
}

/// In-memory [`Frontend`] implementation.
#[derive(Clone, Default)]
pub struct MemoryFrontend {
    inner: Arc<Inner>,
}

impl MemoryFrontend {
    /// Create an empty service whose tasks are driven manually.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service that runs every task through `handler`.
    #[must_use]
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(Option<Bytes>) -> Result<Option<Bytes>, String> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                handler: Some(Arc::new(handler)),
            }),
        }
    }

    /// Service with a registered `echo` application whose tasks succeed
    /// with their input as output.
    #[must_use]
    pub fn echo() -> Self {
        let frontend = Self::with_handler(Ok);
        if let Ok(mut state) = frontend.lock() {
            state.applications.insert(
                "echo".to_string(),
                ApplicationRecord {
                    spec: rpc::ApplicationSpec {
                        shim: rpc::Shim::Log as i32,
                        ..rpc::ApplicationSpec::default()
                    },
                    creation_time: Utc::now().timestamp(),
                },
            );
        }
        frontend
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, Status> {
        self.inner
            .state
            .lock()
            .map_err(|e| Status::internal(e.to_string()))
    }

    /// Push a new state (and output) for a task to every watcher.
    ///
    /// # Errors
    /// Returns `NOT_FOUND` if the session or task does not exist.
    pub fn update_task(
        &self,
        session_id: &str,
        task_id: &str,
        state: TaskState,
        output: Option<Bytes>,
    ) -> Result<(), Status> {
        let sender = {
            let guard = self.lock()?;
            let record = find_task(&guard, session_id, task_id)?;
            Arc::clone(&record.snapshot)
        };
        publish(&sender, rpc::TaskState::from(state), output);
        Ok(())
    }
}

fn find_session<'a>(state: &'a State, id: &str) -> Result<&'a SessionRecord, Status> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| Status::not_found(format!("session <{id}> not found")))
}

fn find_task<'a>(
    state: &'a State,
    session_id: &str,
    task_id: &str,
) -> Result<&'a TaskRecord, Status> {
    let ssn = find_session(state, session_id)?;
    task_id
        .parse::<u64>()
        .ok()
        .and_then(|id| ssn.tasks.get(&id))
        .ok_or_else(|| Status::not_found(format!("task <{session_id}/{task_id}> not found")))
}

fn is_terminal(task: &rpc::Task) -> bool {
    task.status.as_ref().is_some_and(|status| {
        matches!(
            status.state(),
            rpc::TaskState::Succeed | rpc::TaskState::Failed
        )
    })
}

fn publish(sender: &watch::Sender<rpc::Task>, state: rpc::TaskState, output: Option<Bytes>) {
    sender.send_modify(|task| {
        if let Some(status) = task.status.as_mut() {
            status.state = state as i32;
            if matches!(state, rpc::TaskState::Succeed | rpc::TaskState::Failed) {
                status.completion_time = Some(Utc::now().timestamp());
            }
        }
        if output.is_some() {
            if let Some(spec) = task.spec.as_mut() {
                spec.output = output;
            }
        }
    });
}

fn session_message(id: &str, record: &SessionRecord) -> rpc::Session {
    let mut status = rpc::SessionStatus {
        state: record.state as i32,
        creation_time: record.creation_time,
        completion_time: record.completion_time,
        ..rpc::SessionStatus::default()
    };
    for task in record.tasks.values() {
        let state = task
            .snapshot
            .borrow()
            .status
            .as_ref()
            .map_or(rpc::TaskState::Pending, rpc::TaskStatus::state);
        match state {
            rpc::TaskState::Pending => status.pending += 1,
            rpc::TaskState::Running => status.running += 1,
            rpc::TaskState::Succeed => status.succeed += 1,
            rpc::TaskState::Failed => status.failed += 1,
        }
    }

    rpc::Session {
        metadata: Some(rpc::Metadata {
            id: id.to_string(),
            name: id.to_string(),
            owner: None,
        }),
        spec: Some(record.spec.clone()),
        status: Some(status),
    }
}

fn application_message(name: &str, record: &ApplicationRecord) -> rpc::Application {
    rpc::Application {
        metadata: Some(rpc::Metadata {
            id: name.to_string(),
            name: name.to_string(),
            owner: None,
        }),
        spec: Some(record.spec.clone()),
        status: Some(rpc::ApplicationStatus {
            state: rpc::ApplicationState::Enabled as i32,
            creation_time: record.creation_time,
        }),
    }
}

const fn ok() -> rpc::Result {
    rpc::Result {
        return_code: 0,
        message: None,
    }
}

fn rejected(message: String) -> rpc::Result {
    rpc::Result {
        return_code: -1,
        message: Some(message),
    }
}

#[async_trait]
impl Frontend for MemoryFrontend {
    async fn register_application(
        &self,
        req: rpc::RegisterApplicationRequest,
    ) -> Result<rpc::Result, Status> {
        let spec = req
            .application
            .ok_or_else(|| Status::invalid_argument("application spec is missing"))?;

        let mut state = self.lock()?;
        if state.applications.contains_key(&req.name) {
            return Ok(rejected(format!("application <{}> already exists", req.name)));
        }
        state.applications.insert(
            req.name,
            ApplicationRecord {
                spec,
                creation_time: Utc::now().timestamp(),
            },
        );
        Ok(ok())
    }

    async fn unregister_application(
        &self,
        req: rpc::UnregisterApplicationRequest,
    ) -> Result<rpc::Result, Status> {
        let mut state = self.lock()?;
        match state.applications.remove(&req.name) {
            Some(_) => Ok(ok()),
            None => Ok(rejected(format!("application <{}> not found", req.name))),
        }
    }

    async fn get_application(
        &self,
        req: rpc::GetApplicationRequest,
    ) -> Result<rpc::Application, Status> {
        let state = self.lock()?;
        state
            .applications
            .get(&req.name)
            .map(|record| application_message(&req.name, record))
            .ok_or_else(|| Status::not_found(format!("application <{}> not found", req.name)))
    }

    async fn list_application(
        &self,
        _req: rpc::ListApplicationRequest,
    ) -> Result<Vec<rpc::Application>, Status> {
        let state = self.lock()?;
        let mut apps: Vec<rpc::Application> = state
            .applications
            .iter()
            .map(|(name, record)| application_message(name, record))
            .collect();
        apps.sort_by(|a, b| {
            let name = |app: &rpc::Application| app.metadata.as_ref().map(|m| m.name.clone());
            name(a).cmp(&name(b))
        });
        Ok(apps)
    }

    async fn create_session(&self, req: rpc::CreateSessionRequest) -> Result<rpc::Session, Status> {
        let spec = req
            .session
            .ok_or_else(|| Status::invalid_argument("session spec is missing"))?;

        let mut state = self.lock()?;
        if !state.applications.contains_key(&spec.application) {
            return Err(Status::not_found(format!(
                "application <{}> not found",
                spec.application
            )));
        }

        let id = Uuid::new_v4().to_string();
        let record = SessionRecord {
            spec,
            state: rpc::SessionState::Open,
            creation_time: Utc::now().timestamp(),
            completion_time: None,
            tasks: BTreeMap::new(),
        };
        let message = session_message(&id, &record);
        state.sessions.insert(id, record);

        Ok(message)
    }

    async fn get_session(&self, req: rpc::GetSessionRequest) -> Result<rpc::Session, Status> {
        let state = self.lock()?;
        let record = find_session(&state, &req.session_id)?;
        Ok(session_message(&req.session_id, record))
    }

    async fn close_session(&self, req: rpc::CloseSessionRequest) -> Result<rpc::Session, Status> {
        let mut state = self.lock()?;
        let record = state
            .sessions
            .get_mut(&req.session_id)
            .ok_or_else(|| Status::not_found(format!("session <{}> not found", req.session_id)))?;

        // Closing twice keeps the first completion time.
        if record.state == rpc::SessionState::Open {
            record.state = rpc::SessionState::Closed;
            record.completion_time = Some(Utc::now().timestamp());
        }

        Ok(session_message(&req.session_id, record))
    }

    async fn list_session(
        &self,
        _req: rpc::ListSessionRequest,
    ) -> Result<Vec<rpc::Session>, Status> {
        let state = self.lock()?;
        let mut sessions: Vec<(i64, rpc::Session)> = state
            .sessions
            .iter()
            .map(|(id, record)| (record.creation_time, session_message(id, record)))
            .collect();
        sessions.sort_by_key(|(created, ssn)| {
            (*created, ssn.metadata.as_ref().map(|m| m.id.clone()))
        });
        Ok(sessions.into_iter().map(|(_, ssn)| ssn).collect())
    }

    async fn create_task(&self, req: rpc::CreateTaskRequest) -> Result<rpc::Task, Status> {
        let spec = req
            .task
            .ok_or_else(|| Status::invalid_argument("task spec is missing"))?;

        let (snapshot, sender) = {
            let mut state = self.lock()?;
            let record = state.sessions.get_mut(&spec.session_id).ok_or_else(|| {
                Status::not_found(format!("session <{}> not found", spec.session_id))
            })?;
            if record.state != rpc::SessionState::Open {
                return Err(Status::failed_precondition(format!(
                    "session <{}> is closed",
                    spec.session_id
                )));
            }

            let id = record.tasks.keys().next_back().map_or(1, |last| last + 1);
            let task = rpc::Task {
                metadata: Some(rpc::Metadata {
                    id: id.to_string(),
                    name: id.to_string(),
                    owner: Some(spec.session_id.clone()),
                }),
                spec: Some(rpc::TaskSpec {
                    session_id: spec.session_id.clone(),
                    input: spec.input,
                    output: None,
                }),
                status: Some(rpc::TaskStatus {
                    state: rpc::TaskState::Pending as i32,
                    creation_time: Utc::now().timestamp(),
                    completion_time: None,
                }),
            };
            let sender = Arc::new(watch::channel(task.clone()).0);
            record.tasks.insert(
                id,
                TaskRecord {
                    snapshot: Arc::clone(&sender),
                },
            );
            (task, sender)
        };

        if let Some(handler) = self.inner.handler.clone() {
            let input = snapshot.spec.as_ref().and_then(|spec| spec.input.clone());
            tokio::spawn(async move {
                publish(&sender, rpc::TaskState::Running, None);
                tokio::task::yield_now().await;
                match handler(input) {
                    Ok(output) => publish(&sender, rpc::TaskState::Succeed, output),
                    Err(message) => {
                        tracing::debug!("Task failed in memory frontend: {message}");
                        publish(&sender, rpc::TaskState::Failed, Some(Bytes::from(message)));
                    }
                }
            });
        }

        Ok(snapshot)
    }

    async fn get_task(&self, req: rpc::GetTaskRequest) -> Result<rpc::Task, Status> {
        let state = self.lock()?;
        let record = find_task(&state, &req.session_id, &req.task_id)?;
        let task = record.snapshot.borrow().clone();
        Ok(task)
    }

    async fn watch_task(&self, req: rpc::WatchTaskRequest) -> Result<TaskStream, Status> {
        let rx = {
            let state = self.lock()?;
            find_task(&state, &req.session_id, &req.task_id)?
                .snapshot
                .subscribe()
        };

        // Stop right after the terminal snapshot; the sender outlives it and
        // never publishes again.
        let updates = WatchStream::new(rx);
        let stream = stream::unfold((updates, false), |(mut updates, done)| async move {
            if done {
                return None;
            }
            let task = updates.next().await?;
            let terminal = is_terminal(&task);
            Some((Ok(task), (updates, terminal)))
        })
        .boxed();

        Ok(stream)
    }
}

#[async_trait]
impl Connector for MemoryFrontend {
    async fn connect(&self, _endpoint: &str) -> Result<Arc<dyn Frontend>, FlameError> {
        Ok(Arc::new(self.clone()))
    }
}
