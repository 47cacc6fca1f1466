//! Wire messages and client stub of the `flame.Frontend` service.
//!
//! Generated from `proto/frontend.proto` at build time.

#![allow(clippy::pedantic, clippy::nursery)]

tonic::include_proto!("flame");

pub use frontend_client::FrontendClient;

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use prost::Message;

    use super::*;

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(SessionState::Closed as i32, 1);
        assert_eq!(TaskState::Failed as i32, 3);
        assert_eq!(ApplicationState::Disabled as i32, 1);
        assert_eq!(Shim::Grpc as i32, 4);
        assert!(TaskState::try_from(4).is_err());
    }

    #[test]
    fn test_enum_names_follow_proto() {
        assert_eq!(TaskState::Succeed.as_str_name(), "Succeed");
        assert_eq!(SessionState::from_str_name("Closed"), Some(SessionState::Closed));
        assert_eq!(Shim::from_str_name("GRPC"), None);
    }

    #[test]
    fn test_task_survives_encoding() {
        let task = Task {
            metadata: Some(Metadata {
                id: "7".to_string(),
                name: "7".to_string(),
                owner: Some("ssn-1".to_string()),
            }),
            spec: Some(TaskSpec {
                session_id: "ssn-1".to_string(),
                input: Some(Bytes::from_static(b"hello")),
                output: None,
            }),
            status: Some(TaskStatus {
                state: TaskState::Running as i32,
                creation_time: 1_700_000_000,
                completion_time: None,
            }),
        };

        let decoded = Task::decode(task.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, task);
        assert_eq!(decoded.status.unwrap().state(), TaskState::Running);
    }

    #[test]
    fn test_absent_completion_time_stays_absent() {
        let status = SessionStatus {
            state: SessionState::Open as i32,
            creation_time: 10,
            completion_time: None,
            pending: 2,
            ..SessionStatus::default()
        };

        let decoded = SessionStatus::decode(status.encode_to_vec().as_slice()).unwrap();
        assert!(decoded.completion_time.is_none());
        assert_eq!(decoded.pending, 2);
    }
}
