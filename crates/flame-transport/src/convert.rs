//! Conversions between wire messages and domain snapshots.
//!
//! Incoming messages are validated: a missing section, an unknown enum value
//! or an out-of-range timestamp is an `Internal` error.

use chrono::{DateTime, Utc};
use flame_core::{
    Application, ApplicationAttributes, ApplicationState, FlameError, SessionAttributes,
    SessionInfo, SessionState, Shim, Task, TaskState,
};

use crate::protocol as rpc;

fn missing(what: &str) -> FlameError {
    FlameError::Internal(format!("{what} is missing in response"))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, FlameError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| FlameError::Internal(format!("invalid timestamp <{secs}>")))
}

fn enum_value<T, R>(value: i32, what: &str) -> Result<R, FlameError>
where
    T: TryFrom<i32>,
    R: From<T>,
{
    T::try_from(value)
        .map(R::from)
        .map_err(|_| FlameError::Internal(format!("unknown {what} <{value}>")))
}

impl From<rpc::Shim> for Shim {
    fn from(shim: rpc::Shim) -> Self {
        match shim {
            rpc::Shim::Log => Self::Log,
            rpc::Shim::Stdio => Self::Stdio,
            rpc::Shim::Wasm => Self::Wasm,
            rpc::Shim::Shell => Self::Shell,
            rpc::Shim::Grpc => Self::Grpc,
        }
    }
}

impl From<Shim> for rpc::Shim {
    fn from(shim: Shim) -> Self {
        match shim {
            Shim::Log => Self::Log,
            Shim::Stdio => Self::Stdio,
            Shim::Wasm => Self::Wasm,
            Shim::Shell => Self::Shell,
            Shim::Grpc => Self::Grpc,
        }
    }
}

impl From<rpc::ApplicationState> for ApplicationState {
    fn from(state: rpc::ApplicationState) -> Self {
        match state {
            rpc::ApplicationState::Enabled => Self::Enabled,
            rpc::ApplicationState::Disabled => Self::Disabled,
        }
    }
}

impl From<rpc::SessionState> for SessionState {
    fn from(state: rpc::SessionState) -> Self {
        match state {
            rpc::SessionState::Open => Self::Open,
            rpc::SessionState::Closed => Self::Closed,
        }
    }
}

impl From<SessionState> for rpc::SessionState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Open => Self::Open,
            SessionState::Closed => Self::Closed,
        }
    }
}

impl From<rpc::TaskState> for TaskState {
    fn from(state: rpc::TaskState) -> Self {
        match state {
            rpc::TaskState::Pending => Self::Pending,
            rpc::TaskState::Running => Self::Running,
            rpc::TaskState::Succeed => Self::Succeed,
            rpc::TaskState::Failed => Self::Failed,
        }
    }
}

impl From<TaskState> for rpc::TaskState {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Pending => Self::Pending,
            TaskState::Running => Self::Running,
            TaskState::Succeed => Self::Succeed,
            TaskState::Failed => Self::Failed,
        }
    }
}

impl From<&ApplicationAttributes> for rpc::ApplicationSpec {
    fn from(attrs: &ApplicationAttributes) -> Self {
        let mut environments: Vec<rpc::Environment> = attrs
            .environments
            .iter()
            .map(|(name, value)| rpc::Environment {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        environments.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            shim: rpc::Shim::from(attrs.shim) as i32,
            url: attrs.url.clone(),
            command: attrs.command.clone(),
            arguments: attrs.arguments.clone(),
            environments,
            working_directory: attrs.working_directory.clone(),
        }
    }
}

impl TryFrom<rpc::ApplicationSpec> for ApplicationAttributes {
    type Error = FlameError;

    fn try_from(spec: rpc::ApplicationSpec) -> Result<Self, Self::Error> {
        Ok(Self {
            shim: enum_value::<rpc::Shim, _>(spec.shim, "shim")?,
            url: spec.url,
            command: spec.command,
            arguments: spec.arguments,
            environments: spec
                .environments
                .into_iter()
                .map(|env| (env.name, env.value))
                .collect(),
            working_directory: spec.working_directory,
        })
    }
}

impl TryFrom<rpc::Application> for Application {
    type Error = FlameError;

    fn try_from(app: rpc::Application) -> Result<Self, Self::Error> {
        let metadata = app.metadata.ok_or_else(|| missing("application metadata"))?;
        let spec = app.spec.ok_or_else(|| missing("application spec"))?;
        let status = app.status.ok_or_else(|| missing("application status"))?;

        Ok(Self {
            name: metadata.name,
            attributes: ApplicationAttributes::try_from(spec)?,
            state: enum_value::<rpc::ApplicationState, _>(status.state, "application state")?,
            creation_time: timestamp(status.creation_time)?,
        })
    }
}

impl From<&SessionAttributes> for rpc::SessionSpec {
    fn from(attrs: &SessionAttributes) -> Self {
        Self {
            application: attrs.application.clone(),
            slots: attrs.slots,
            common_data: attrs.common_data.clone(),
        }
    }
}

impl TryFrom<rpc::Session> for SessionInfo {
    type Error = FlameError;

    fn try_from(ssn: rpc::Session) -> Result<Self, Self::Error> {
        let metadata = ssn.metadata.ok_or_else(|| missing("session metadata"))?;
        let spec = ssn.spec.ok_or_else(|| missing("session spec"))?;
        let status = ssn.status.ok_or_else(|| missing("session status"))?;

        Ok(Self {
            id: metadata.id,
            application: spec.application,
            slots: spec.slots,
            state: enum_value::<rpc::SessionState, _>(status.state, "session state")?,
            creation_time: timestamp(status.creation_time)?,
            completion_time: status.completion_time.map(timestamp).transpose()?,
            pending: status.pending,
            running: status.running,
            succeed: status.succeed,
            failed: status.failed,
        })
    }
}

impl TryFrom<rpc::Task> for Task {
    type Error = FlameError;

    fn try_from(task: rpc::Task) -> Result<Self, Self::Error> {
        let metadata = task.metadata.ok_or_else(|| missing("task metadata"))?;
        let spec = task.spec.ok_or_else(|| missing("task spec"))?;
        let status = task.status.ok_or_else(|| missing("task status"))?;

        Ok(Self {
            id: metadata.id,
            session_id: spec.session_id,
            state: enum_value::<rpc::TaskState, _>(status.state, "task state")?,
            input: spec.input,
            output: spec.output,
            creation_time: timestamp(status.creation_time)?,
            completion_time: status.completion_time.map(timestamp).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use flame_core::ErrorCode;

    use super::*;

    fn wire_task(state: i32) -> rpc::Task {
        rpc::Task {
            metadata: Some(rpc::Metadata {
                id: "3".to_string(),
                name: "3".to_string(),
                owner: None,
            }),
            spec: Some(rpc::TaskSpec {
                session_id: "ssn".to_string(),
                input: Some(Bytes::from_static(b"in")),
                output: Some(Bytes::from_static(b"out")),
            }),
            status: Some(rpc::TaskStatus {
                state,
                creation_time: 1_700_000_000,
                completion_time: Some(1_700_000_005),
            }),
        }
    }

    #[test]
    fn test_task_from_wire() {
        let task = Task::try_from(wire_task(rpc::TaskState::Succeed as i32)).unwrap();
        assert_eq!(task.id, "3");
        assert_eq!(task.session_id, "ssn");
        assert_eq!(task.state, TaskState::Succeed);
        assert_eq!(task.output.as_deref(), Some(&b"out"[..]));
        assert_eq!(task.creation_time.timestamp(), 1_700_000_000);
        assert_eq!(task.completion_time.map(|t| t.timestamp()), Some(1_700_000_005));
    }

    #[test]
    fn test_unknown_task_state_is_internal() {
        let err = Task::try_from(wire_task(42)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_missing_status_is_internal() {
        let mut task = wire_task(0);
        task.status = None;
        let err = Task::try_from(task).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(err.message().contains("task status"));
    }

    #[test]
    fn test_session_from_wire() {
        let ssn = rpc::Session {
            metadata: Some(rpc::Metadata {
                id: "ssn-1".to_string(),
                name: "ssn-1".to_string(),
                owner: None,
            }),
            spec: Some(rpc::SessionSpec {
                application: "echo".to_string(),
                slots: 2,
                common_data: None,
            }),
            status: Some(rpc::SessionStatus {
                state: rpc::SessionState::Closed as i32,
                creation_time: 100,
                completion_time: Some(200),
                pending: 0,
                running: 0,
                succeed: 3,
                failed: 1,
            }),
        };

        let info = SessionInfo::try_from(ssn).unwrap();
        assert_eq!(info.id, "ssn-1");
        assert_eq!(info.application, "echo");
        assert!(info.is_closed());
        assert_eq!(info.total_tasks(), 4);
        assert_eq!(info.completion_time.map(|t| t.timestamp()), Some(200));
    }

    #[test]
    fn test_application_spec_keeps_launch_details() {
        let attrs = ApplicationAttributes::new(Shim::Grpc)
            .with_command("/usr/local/flame/bin/flmping-service")
            .with_env("B", "2")
            .with_env("A", "1");

        let spec = rpc::ApplicationSpec::from(&attrs);
        assert_eq!(spec.shim, rpc::Shim::Grpc as i32);
        let names: Vec<_> = spec.environments.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);

        let back = ApplicationAttributes::try_from(spec).unwrap();
        assert_eq!(back, attrs);
    }
}
