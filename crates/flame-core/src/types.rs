//! Domain snapshots mirrored from the Flame service.
//!
//! Every value here is a read-only copy of server state. The client never
//! assigns session or task state locally.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session identifier (opaque, server assigned).
pub type SessionId = String;
/// Task identifier (opaque, unique within its session).
pub type TaskId = String;
/// Application identifier.
pub type ApplicationId = String;

/// Task input payload.
pub type TaskInput = Bytes;
/// Task output payload.
pub type TaskOutput = Bytes;
/// Payload shared by all tasks of a session.
pub type CommonData = Bytes;

/// Execution adapter used to run an application's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shim {
    #[default]
    Log,
    Stdio,
    Wasm,
    Shell,
    Grpc,
}

/// Application state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    #[default]
    Enabled,
    Disabled,
}

/// Session state. `Open -> Closed` happens exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Open,
    Closed,
}

/// Task state.
///
/// Transitions are monotonic: `Pending -> Running -> {Succeed | Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Succeed,
    Failed,
}

impl TaskState {
    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeed | Self::Failed)
    }

    /// Position in the lifecycle order; both terminal states share the last rank.
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeed | Self::Failed => 2,
        }
    }

    /// Whether `self` may be observed after `previous`.
    ///
    /// Repeats are allowed; going backwards or switching between terminal
    /// states is not.
    #[must_use]
    pub const fn may_follow(self, previous: Self) -> bool {
        if previous.is_terminal() {
            return self as u8 == previous as u8;
        }
        self.rank() >= previous.rank()
    }
}

/// Launch specification of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationAttributes {
    pub shim: Shim,
    pub url: Option<String>,
    pub command: Option<String>,
    pub arguments: Vec<String>,
    pub environments: HashMap<String, String>,
    pub working_directory: Option<String>,
}

impl ApplicationAttributes {
    /// Create attributes for the given shim with no launch details.
    #[must_use]
    pub fn new(shim: Shim) -> Self {
        Self {
            shim,
            ..Self::default()
        }
    }

    /// Set the launch command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the application URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append command arguments.
    #[must_use]
    pub fn with_arguments<I>(mut self, arguments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environments.insert(name.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// A registered application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: ApplicationId,
    pub attributes: ApplicationAttributes,
    pub state: ApplicationState,
    pub creation_time: DateTime<Utc>,
}

/// Attributes for creating a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAttributes {
    pub application: String,
    pub slots: i32,
    pub common_data: Option<CommonData>,
}

impl SessionAttributes {
    /// Create attributes with the required fields.
    #[must_use]
    pub fn new(application: impl Into<String>, slots: i32) -> Self {
        Self {
            application: application.into(),
            slots,
            common_data: None,
        }
    }

    /// Attach data shared by every task of the session.
    #[must_use]
    pub fn with_common_data(mut self, data: impl Into<CommonData>) -> Self {
        self.common_data = Some(data.into());
        self
    }
}

/// Snapshot of a session as last reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub application: String,
    pub slots: i32,
    pub state: SessionState,
    pub creation_time: DateTime<Utc>,
    /// Present only once `Closed`.
    pub completion_time: Option<DateTime<Utc>>,
    pub pending: i32,
    pub running: i32,
    pub succeed: i32,
    pub failed: i32,
}

impl SessionInfo {
    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Number of tasks ever created under the session.
    ///
    /// Counters come from the service unchecked, so the sum is widened.
    #[must_use]
    pub fn total_tasks(&self) -> i64 {
        [self.pending, self.running, self.succeed, self.failed]
            .into_iter()
            .map(i64::from)
            .sum()
    }
}

/// Snapshot of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub session_id: SessionId,
    pub state: TaskState,
    pub input: Option<TaskInput>,
    /// Present only after a terminal state.
    pub output: Option<TaskOutput>,
    pub creation_time: DateTime<Utc>,
    /// Present only once terminal.
    pub completion_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the task reached `Succeed` or `Failed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }
}
