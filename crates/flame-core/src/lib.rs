//! Core abstractions for the Flame session/task client.
//!
//! This crate provides the pieces shared by the transport and client crates:
//! - `FlameError` - The single error carrier crossing the API boundary
//! - Domain snapshots (`Application`, `SessionInfo`, `Task`) and their states
//! - `TaskInformer` - Callback pair observing watch updates and errors
//! - `FlameContext` - Endpoint and limit configuration

pub mod context;
pub mod error;
pub mod informer;
pub mod types;

pub use context::FlameContext;
pub use error::{ErrorCode, FlameError, Result};
pub use informer::{NoopInformer, TaskInformer};
pub use types::{
    Application, ApplicationAttributes, ApplicationId, ApplicationState, CommonData,
    SessionAttributes, SessionId, SessionInfo, SessionState, Shim, Task, TaskId, TaskInput,
    TaskOutput, TaskState,
};
