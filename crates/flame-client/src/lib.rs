//! Client for the Flame session/task service.
//!
//! Provides:
//! - `Connection` - Shared channel exposing application and session RPCs
//! - `Session` - Task submission, watching and `invoke`
//! - `TaskWatcher` - Forward-only cursor over one task's updates
//! - Process-wide shared connection (`instance`, `create_session`)
//!
//! ```no_run
//! # async fn run() -> flame_client::Result<()> {
//! let conn = flame_client::connect("http://127.0.0.1:8080").await?;
//! let mut ssn = conn
//!     .create_session(&flame_client::SessionAttributes::new("flmping", 1))
//!     .await?;
//! let task = ssn.invoke(Some("hello".into()), None).await?;
//! println!("{:?}", task.output);
//! ssn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod registry;
pub mod session;
pub mod watcher;

pub use connection::{Connection, connect};
pub use registry::{ConnectionRegistry, create_session, instance};
pub use session::Session;
pub use watcher::TaskWatcher;

pub use flame_core::{
    Application, ApplicationAttributes, ErrorCode, FlameContext, FlameError, NoopInformer, Result,
    SessionAttributes, SessionInfo, SessionState, Shim, Task, TaskInformer, TaskState,
};
