//! Process-wide shared connection.
//!
//! [`instance`] hands every caller in the process the same [`Connection`],
//! built lazily on first use from the resolved endpoint. [`close`] tears it
//! down so the next `instance` call reconnects.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use flame_core::{FlameContext, Result, SessionAttributes, context::resolve_endpoint};
use flame_transport::{Connector, GrpcConnector};
use tokio::sync::Mutex;

use crate::{connection::Connection, session::Session};

/// Lazily built, shared connection slot.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    endpoint: Option<String>,
    slot: Mutex<Option<Connection>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(GrpcConnector::default()), None)
    }
}

impl ConnectionRegistry {
    /// Create a registry that connects through `connector`.
    ///
    /// With no explicit `endpoint` the address comes from `FLAME_ENDPOINT`
    /// or the built-in default, read when the connection is first built.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, endpoint: Option<String>) -> Self {
        Self {
            connector,
            endpoint,
            slot: Mutex::new(None),
        }
    }

    /// Create a registry for the endpoint and limits of `ctx`.
    #[must_use]
    pub fn from_context(ctx: &FlameContext) -> Self {
        Self::new(
            Arc::new(GrpcConnector::from(ctx)),
            Some(ctx.endpoint.clone()),
        )
    }

    /// The shared connection, built on first call.
    ///
    /// Concurrent first callers wait for a single construction and all
    /// receive the same connection. A closed connection is replaced.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the connection cannot be established; the
    /// next call tries again.
    pub async fn instance(&self) -> Result<Connection> {
        let mut slot = self.slot.lock().await;
        if let Some(conn) = slot.as_ref().filter(|conn| !conn.is_closed()) {
            return Ok(conn.clone());
        }

        let endpoint = resolve_endpoint(self.endpoint.as_deref());
        let conn = Connection::connect_with(&endpoint, self.connector.as_ref()).await?;
        tracing::debug!("Shared connection to <{}> created", conn.endpoint());

        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Close and forget the shared connection, if any.
    pub async fn close(&self) {
        if let Some(conn) = self.slot.lock().await.take() {
            conn.close();
        }
    }
}

static REGISTRY: OnceLock<ConnectionRegistry> = OnceLock::new();

fn registry() -> &'static ConnectionRegistry {
    REGISTRY.get_or_init(ConnectionRegistry::default)
}

/// The process-wide connection.
///
/// # Errors
/// See [`ConnectionRegistry::instance`].
pub async fn instance() -> Result<Connection> {
    registry().instance().await
}

/// Close the process-wide connection; the next [`instance`] reconnects.
pub async fn close() {
    registry().close().await;
}

/// Open a session on the process-wide connection.
///
/// # Errors
/// Returns the errors of [`instance`] and [`Connection::create_session`].
pub async fn create_session(
    application: &str,
    slots: i32,
    common_data: Option<flame_core::CommonData>,
) -> Result<Session> {
    let mut attrs = SessionAttributes::new(application, slots);
    attrs.common_data = common_data;
    instance().await?.create_session(&attrs).await
}
