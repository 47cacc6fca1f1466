//! Wire protocol and transport for the Flame frontend service.
//!
//! Provides:
//! - Wire messages and `FrontendClient` of `flame.Frontend` (tonic-build)
//! - `Frontend` / `Connector` - Seams between client logic and the wire
//! - In-process stub service (feature: memory)

pub mod convert;
pub mod frontend;
pub mod protocol;

#[cfg(feature = "memory")]
pub mod memory;

pub use protocol::FrontendClient;
pub use frontend::{Connector, Frontend, GrpcConnector, GrpcFrontend, TaskStream};

#[cfg(feature = "memory")]
pub use memory::{MemoryFrontend, TaskHandler};
